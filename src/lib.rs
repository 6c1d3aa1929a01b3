//! Client-side helpers for a Solana test cluster: fund fresh accounts through
//! the faucet, move SOL between them and stake it.

pub mod cli;
pub mod cluster;
pub mod config;
pub mod demo;
pub mod display;
pub mod error;
pub mod mock_cluster;
pub mod provisioner;
pub mod stake;
pub mod submitter;

pub use {
    cluster::{Cluster, RawSendConfig},
    config::{BalanceCheck, ClusterConfig, RetryPolicy},
    error::{Error, Result},
    provisioner::{AccountProvisioner, PollReport, ProvisionReport},
    stake::StakeClient,
    submitter::{Checkpoint, SubmitMode, TransactionSubmitter},
};
