//! The network boundary.
//!
//! Everything the provisioner and the submitter need from a cluster goes
//! through [`Cluster`], implemented here for the nonblocking [`RpcClient`] and
//! in [`crate::mock_cluster`] for tests.

use {
    async_trait::async_trait,
    base64::{prelude::BASE64_STANDARD, Engine},
    serde_json::json,
    solana_client::{
        client_error::Result as ClientResult,
        nonblocking::rpc_client::RpcClient,
        rpc_request::{RpcError, RpcRequest},
    },
    solana_sdk::{
        commitment_config::{CommitmentConfig, CommitmentLevel},
        hash::Hash,
        pubkey::Pubkey,
        signature::Signature,
        transaction::Transaction,
    },
};

/// Options for a broadcast-only submission.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawSendConfig {
    pub skip_preflight: bool,
    /// Commitment the preflight simulation runs against; ignored when
    /// `skip_preflight` is set.
    pub preflight_commitment: CommitmentLevel,
}

impl Default for RawSendConfig {
    fn default() -> Self {
        Self {
            skip_preflight: false,
            preflight_commitment: CommitmentLevel::Confirmed,
        }
    }
}

#[async_trait]
pub trait Cluster: Send + Sync {
    /// Asks the faucet for `lamports`. The returned signature only acknowledges
    /// the request; it says nothing about the credit having landed.
    async fn request_airdrop(&self, pubkey: &Pubkey, lamports: u64) -> ClientResult<Signature>;

    async fn get_balance(&self, pubkey: &Pubkey) -> ClientResult<u64>;

    /// Latest blockhash together with the last block height at which
    /// transactions referencing it are accepted.
    async fn get_latest_blockhash(&self, commitment: CommitmentConfig)
        -> ClientResult<(Hash, u64)>;

    /// Broadcasts a signed transaction and waits for the cluster to confirm it.
    async fn send_and_confirm_transaction(
        &self,
        transaction: &Transaction,
    ) -> ClientResult<Signature>;

    /// Broadcasts an already serialized transaction. Returns as soon as the
    /// node accepts it.
    async fn send_wire_transaction(
        &self,
        wire_transaction: &[u8],
        config: &RawSendConfig,
    ) -> ClientResult<Signature>;
}

#[async_trait]
impl Cluster for RpcClient {
    async fn request_airdrop(&self, pubkey: &Pubkey, lamports: u64) -> ClientResult<Signature> {
        RpcClient::request_airdrop(self, pubkey, lamports).await
    }

    async fn get_balance(&self, pubkey: &Pubkey) -> ClientResult<u64> {
        RpcClient::get_balance(self, pubkey).await
    }

    async fn get_latest_blockhash(
        &self,
        commitment: CommitmentConfig,
    ) -> ClientResult<(Hash, u64)> {
        RpcClient::get_latest_blockhash_with_commitment(self, commitment).await
    }

    async fn send_and_confirm_transaction(
        &self,
        transaction: &Transaction,
    ) -> ClientResult<Signature> {
        RpcClient::send_and_confirm_transaction(self, transaction).await
    }

    async fn send_wire_transaction(
        &self,
        wire_transaction: &[u8],
        config: &RawSendConfig,
    ) -> ClientResult<Signature> {
        let encoded = BASE64_STANDARD.encode(wire_transaction);
        let signature: String = self
            .send(
                RpcRequest::SendTransaction,
                json!([encoded, {
                    "encoding": "base64",
                    "skipPreflight": config.skip_preflight,
                    "preflightCommitment": config.preflight_commitment,
                }]),
            )
            .await?;
        signature
            .parse::<Signature>()
            .map_err(|err| RpcError::ParseError(err.to_string()).into())
    }
}
