//! Stake account creation and delegation.

use {
    crate::{
        cluster::Cluster,
        config::ClusterConfig,
        error::Result,
        submitter::{SubmitMode, TransactionSubmitter},
    },
    log::*,
    solana_program::stake::{
        instruction as stake_instruction,
        state::{Authorized, Lockup},
    },
    solana_sdk::{
        pubkey::Pubkey,
        signature::{Keypair, Signature, Signer},
    },
};

/// A devnet validator vote account. `solana validators` lists others.
pub const DEFAULT_VOTE_ACCOUNT: &str = "5MMCR4NbTZqjthjLGywmeT66iwE9J9f7kjtxzJjwfUx2";

/// `funder` holds both stake and withdraw authority. The lockup is disabled
/// (zero timestamp and epoch) with `funder` as custodian.
fn authorities(funder: &Pubkey) -> (Authorized, Lockup) {
    (
        Authorized::auto(funder),
        Lockup {
            unix_timestamp: 0,
            epoch: 0,
            custodian: *funder,
        },
    )
}

pub struct StakeClient<'a, C: Cluster + ?Sized> {
    submitter: TransactionSubmitter<'a, C>,
}

impl<'a, C: Cluster + ?Sized> StakeClient<'a, C> {
    pub fn new(cluster: &'a C, config: &'a ClusterConfig) -> Self {
        Self {
            submitter: TransactionSubmitter::new(cluster, config),
        }
    }

    /// Creates and initializes a new stake account holding `lamports`, paid
    /// for by `funder`. The new account signs too, proving ownership of its
    /// address.
    pub async fn create_stake_account(
        &self,
        funder: &Keypair,
        lamports: u64,
        mode: SubmitMode,
    ) -> Result<(Keypair, Signature)> {
        let stake_account = Keypair::new();
        let (authorized, lockup) = authorities(&funder.pubkey());
        let instructions = stake_instruction::create_account(
            &funder.pubkey(),
            &stake_account.pubkey(),
            &authorized,
            &lockup,
            lamports,
        );
        let signature = self
            .submitter
            .submit(&instructions, funder, &[&stake_account], mode)
            .await?;
        info!(
            "Created stake account {} with {} lamports",
            stake_account.pubkey(),
            lamports
        );
        Ok((stake_account, signature))
    }

    pub async fn delegate_stake(
        &self,
        stake_account: &Pubkey,
        authority: &Keypair,
        vote_account: &Pubkey,
        mode: SubmitMode,
    ) -> Result<Signature> {
        let instruction =
            stake_instruction::delegate_stake(stake_account, &authority.pubkey(), vote_account);
        let signature = self
            .submitter
            .submit(&[instruction], authority, &[], mode)
            .await?;
        info!(
            "Delegated stake account {} to {}",
            stake_account, vote_account
        );
        Ok(signature)
    }

    /// Creates a stake account and delegates it to `vote_account` in a single
    /// transaction.
    pub async fn create_and_delegate(
        &self,
        funder: &Keypair,
        lamports: u64,
        vote_account: &Pubkey,
        mode: SubmitMode,
    ) -> Result<(Keypair, Signature)> {
        let stake_account = Keypair::new();
        let (authorized, lockup) = authorities(&funder.pubkey());
        let mut instructions = stake_instruction::create_account(
            &funder.pubkey(),
            &stake_account.pubkey(),
            &authorized,
            &lockup,
            lamports,
        );
        instructions.push(stake_instruction::delegate_stake(
            &stake_account.pubkey(),
            &funder.pubkey(),
            vote_account,
        ));
        let signature = self
            .submitter
            .submit(&instructions, funder, &[&stake_account], mode)
            .await?;
        info!(
            "Created stake account {} with {} lamports, delegated to {}",
            stake_account.pubkey(),
            lamports,
            vote_account
        );
        Ok((stake_account, signature))
    }
}
