//! Building, signing and sending transactions.

use {
    crate::{
        cluster::{Cluster, RawSendConfig},
        config::ClusterConfig,
        error::{Error, Result},
    },
    log::*,
    solana_client::{
        client_error::{ClientError, ClientErrorKind},
        rpc_request::RpcError,
    },
    solana_program::{instruction::Instruction, system_instruction},
    solana_sdk::{
        hash::Hash,
        pubkey::Pubkey,
        signature::{Keypair, Signature, Signer},
        transaction::Transaction,
    },
};

/// How a signed transaction reaches the cluster.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmitMode {
    /// Send and block until the cluster confirms the transaction at the
    /// configured commitment.
    Confirmed,
    /// Serialize locally and broadcast the raw bytes. The returned signature
    /// only means the node accepted the transaction: it may still expire or
    /// fail on-chain. In exchange the caller controls blockhash freshness and
    /// signer order. Observe the effects by polling.
    Raw(RawSendConfig),
}

/// A recent blockhash and the last block height at which it is accepted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Checkpoint {
    pub blockhash: Hash,
    pub last_valid_block_height: u64,
}

fn unique_signers<'s>(signers: Vec<&'s dyn Signer>) -> Vec<&'s dyn Signer> {
    let mut unique: Vec<&dyn Signer> = Vec::with_capacity(signers.len());
    for signer in signers {
        if !unique.iter().any(|s| s.pubkey() == signer.pubkey()) {
            unique.push(signer);
        }
    }
    unique
}

/// Signs a transaction with `payer` as fee payer and returns its wire
/// representation.
///
/// The fee payer is always the first required signature. Extra signers
/// sign first, the payer last. An extra signer the instructions require
/// but that is missing from `extra_signers` leaves an empty signature
/// slot; the cluster rejects such a transaction.
pub fn sign_and_serialize(
    instructions: &[Instruction],
    payer: &dyn Signer,
    extra_signers: &[&dyn Signer],
    checkpoint: &Checkpoint,
) -> Result<Vec<u8>> {
    let mut transaction = Transaction::new_with_payer(instructions, Some(&payer.pubkey()));
    let extra_signers: Vec<&dyn Signer> = extra_signers
        .iter()
        .copied()
        .filter(|signer| signer.pubkey() != payer.pubkey())
        .collect();
    transaction
        .try_partial_sign(&extra_signers, checkpoint.blockhash)
        .map_err(|err| Error::submission(ClientErrorKind::SigningError(err)))?;
    transaction
        .try_partial_sign(&vec![payer], checkpoint.blockhash)
        .map_err(|err| Error::submission(ClientErrorKind::SigningError(err)))?;

    bincode::serialize(&transaction).map_err(|err| {
        Error::submission(ClientErrorKind::Custom(format!(
            "failed to serialize transaction: {err}"
        )))
    })
}

pub struct TransactionSubmitter<'a, C: Cluster + ?Sized> {
    cluster: &'a C,
    config: &'a ClusterConfig,
}

impl<'a, C: Cluster + ?Sized> TransactionSubmitter<'a, C> {
    pub fn new(cluster: &'a C, config: &'a ClusterConfig) -> Self {
        Self { cluster, config }
    }

    /// Moves `lamports` from `from` to `to`; `from` also pays the fee.
    pub async fn transfer(
        &self,
        from: &Keypair,
        to: &Pubkey,
        lamports: u64,
        mode: SubmitMode,
    ) -> Result<Signature> {
        let instruction = system_instruction::transfer(&from.pubkey(), to, lamports);
        let signature = self.submit(&[instruction], from, &[], mode).await?;
        info!(
            "Transferred {} lamports from {} to {}: {}",
            lamports,
            from.pubkey(),
            to,
            signature
        );
        Ok(signature)
    }

    /// Submits `instructions` in one transaction paid for by `payer`.
    /// `extra_signers` are the other keys the instructions require, such as a
    /// new account being created.
    pub async fn submit(
        &self,
        instructions: &[Instruction],
        payer: &dyn Signer,
        extra_signers: &[&dyn Signer],
        mode: SubmitMode,
    ) -> Result<Signature> {
        match mode {
            SubmitMode::Confirmed => {
                self.submit_and_confirm(instructions, payer, extra_signers)
                    .await
            }
            SubmitMode::Raw(send_config) => {
                let checkpoint = self.fetch_checkpoint().await?;
                let wire_transaction =
                    sign_and_serialize(instructions, payer, extra_signers, &checkpoint)?;
                self.broadcast(&wire_transaction, &send_config).await
            }
        }
    }

    async fn submit_and_confirm(
        &self,
        instructions: &[Instruction],
        payer: &dyn Signer,
        extra_signers: &[&dyn Signer],
    ) -> Result<Signature> {
        let checkpoint = self.fetch_checkpoint().await?;
        let mut signers = vec![payer];
        signers.extend_from_slice(extra_signers);
        let signers = unique_signers(signers);

        let mut transaction = Transaction::new_with_payer(instructions, Some(&payer.pubkey()));
        transaction
            .try_sign(&signers, checkpoint.blockhash)
            .map_err(|err| Error::submission(ClientErrorKind::SigningError(err)))?;

        debug!(
            "Sending {} and waiting for confirmation",
            transaction.signatures[0]
        );
        self.cluster
            .send_and_confirm_transaction(&transaction)
            .await
            .map_err(Error::submission)
    }

    pub async fn fetch_checkpoint(&self) -> Result<Checkpoint> {
        let (blockhash, last_valid_block_height) = self
            .cluster
            .get_latest_blockhash(self.config.commitment)
            .await
            .map_err(Error::submission)?;
        debug!(
            "Latest blockhash {} valid through block height {}",
            blockhash, last_valid_block_height
        );
        Ok(Checkpoint {
            blockhash,
            last_valid_block_height,
        })
    }

    /// Broadcasts a serialized transaction without waiting for confirmation.
    pub async fn broadcast(
        &self,
        wire_transaction: &[u8],
        send_config: &RawSendConfig,
    ) -> Result<Signature> {
        let expected: Option<Signature> = bincode::deserialize::<Transaction>(wire_transaction)
            .ok()
            .and_then(|transaction| transaction.signatures.first().copied());
        let signature = self
            .cluster
            .send_wire_transaction(wire_transaction, send_config)
            .await
            .map_err(Error::submission)?;
        // A mismatching signature means the node is misbehaving; the
        // transaction may or may not have been forwarded.
        if let Some(expected) = expected {
            if signature != expected {
                return Err(Error::submission(ClientError::from(
                    RpcError::RpcRequestError(format!(
                        "RPC node returned mismatched signature {signature:?}, expected {expected:?}"
                    )),
                )));
            }
        }
        debug!(
            "Broadcast {} (skip_preflight: {})",
            signature, send_config.skip_preflight
        );
        Ok(signature)
    }
}
