//! An in-memory [`Cluster`] used for unit testing the provisioner and the
//! submitter.
//!
//! Test support only: nothing in the binary's run path constructs it. It is
//! public so integration tests and downstream crates can drive the client
//! without a network.
//!
//! The ledger only knows what the demo needs: native balances, system
//! transfers and account creation, stake account initialization and
//! delegation. Every transaction pays `lamports_per_signature` per signature,
//! charged to the fee payer.
//!
//! Airdrops land according to the [`AirdropBehavior`] given at construction.
//! Transactions broadcast through
//! [`send_wire_transaction`](Cluster::send_wire_transaction) land after a
//! configurable number of balance queries, so callers observe them only by
//! polling, as they would on a real cluster.

use {
    crate::{
        cluster::{Cluster, RawSendConfig},
        config::DEFAULT_LAMPORTS_PER_SIGNATURE,
    },
    async_trait::async_trait,
    solana_client::client_error::{ClientErrorKind, Result as ClientResult},
    solana_program::{
        instruction::InstructionError,
        sanitize::Sanitize,
        stake::{
            self,
            instruction::StakeInstruction,
            state::{Authorized, Lockup},
        },
        system_instruction::SystemInstruction,
        system_program,
    },
    solana_sdk::{
        commitment_config::CommitmentConfig,
        hash::Hash,
        pubkey::Pubkey,
        signature::Signature,
        transaction::{Transaction, TransactionError},
    },
    std::{collections::HashMap, sync::Mutex},
};

pub const MOCK_LAMPORTS_PER_SIGNATURE: u64 = DEFAULT_LAMPORTS_PER_SIGNATURE;

/// Number of blocks a blockhash stays usable after it was handed out.
pub const MOCK_BLOCKHASH_VALIDITY: u64 = 150;

/// Default number of balance queries after which a raw broadcast lands.
pub const MOCK_RAW_LANDING_DELAY: usize = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AirdropBehavior {
    /// Credits the requested amount at the n-th balance query of the address.
    CreditAfter(usize),
    /// Credits only the given amount, at the first balance query.
    Partial(u64),
    /// Credits the requested amount plus the given surplus, at the first
    /// balance query.
    Surplus(u64),
    /// Acknowledges the request but never credits anything.
    Never,
    /// Never answers the request.
    Hang,
    /// Answers the request with an error.
    Reject,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StakeRecord {
    pub authorized: Authorized,
    pub lockup: Lockup,
    pub voter: Option<Pubkey>,
}

#[derive(Clone, Default)]
struct Accounts {
    balances: HashMap<Pubkey, u64>,
    owners: HashMap<Pubkey, Pubkey>,
    stakes: HashMap<Pubkey, StakeRecord>,
}

struct PendingAirdrop {
    lamports: u64,
    queries_left: usize,
}

struct PendingTransaction {
    transaction: Transaction,
    queries_left: usize,
}

#[derive(Default)]
struct Ledger {
    accounts: Accounts,
    pending_airdrops: HashMap<Pubkey, Vec<PendingAirdrop>>,
    pending_transactions: Vec<PendingTransaction>,
    blockhashes: HashMap<Hash, u64>,
    block_height: u64,
    balance_queries: HashMap<Pubkey, usize>,
    airdrop_requests: usize,
    landed: Vec<Signature>,
    dropped: Vec<(Signature, TransactionError)>,
    raw_sends: Vec<RawSendConfig>,
}

impl Ledger {
    fn check_transaction(&self, transaction: &Transaction) -> Result<(), TransactionError> {
        transaction
            .sanitize()
            .map_err(|_| TransactionError::SanitizeFailure)?;
        match self.blockhashes.get(&transaction.message.recent_blockhash) {
            Some(last_valid_block_height) if *last_valid_block_height >= self.block_height => {}
            _ => return Err(TransactionError::BlockhashNotFound),
        }
        transaction.verify()
    }

    fn land(
        &mut self,
        transaction: &Transaction,
        lamports_per_signature: u64,
    ) -> Result<(), TransactionError> {
        self.check_transaction(transaction)?;
        self.accounts = execute(&self.accounts, transaction, lamports_per_signature)?;
        self.landed.push(transaction.signatures[0]);
        Ok(())
    }
}

fn debit(accounts: &mut Accounts, pubkey: &Pubkey, lamports: u64) -> Result<(), InstructionError> {
    let balance = accounts.balances.entry(*pubkey).or_default();
    *balance = balance
        .checked_sub(lamports)
        .ok_or(InstructionError::InsufficientFunds)?;
    Ok(())
}

fn credit(accounts: &mut Accounts, pubkey: &Pubkey, lamports: u64) {
    *accounts.balances.entry(*pubkey).or_default() += lamports;
}

/// Runs every instruction of `transaction` against a copy of `accounts`.
/// Either all of them apply or none does.
fn execute(
    accounts: &Accounts,
    transaction: &Transaction,
    lamports_per_signature: u64,
) -> Result<Accounts, TransactionError> {
    let mut accounts = accounts.clone();
    let message = &transaction.message;

    let fee = lamports_per_signature * transaction.signatures.len() as u64;
    let fee_payer = message.account_keys[0];
    debit(&mut accounts, &fee_payer, fee)
        .map_err(|_| TransactionError::InsufficientFundsForFee)?;

    for (index, instruction) in message.instructions.iter().enumerate() {
        let account = |position: usize| -> Result<(Pubkey, bool), InstructionError> {
            let key_index = *instruction
                .accounts
                .get(position)
                .ok_or(InstructionError::NotEnoughAccountKeys)? as usize;
            Ok((message.account_keys[key_index], message.is_signer(key_index)))
        };
        let program_id = instruction.program_id(&message.account_keys);

        let result = if system_program::check_id(program_id) {
            execute_system(&mut accounts, &instruction.data, account)
        } else if stake::program::check_id(program_id) {
            execute_stake(&mut accounts, &instruction.data, account)
        } else {
            Err(InstructionError::UnsupportedProgramId)
        };
        result.map_err(|err| TransactionError::InstructionError(index as u8, err))?;
    }
    Ok(accounts)
}

fn execute_system(
    accounts: &mut Accounts,
    data: &[u8],
    account: impl Fn(usize) -> Result<(Pubkey, bool), InstructionError>,
) -> Result<(), InstructionError> {
    let instruction: SystemInstruction =
        bincode::deserialize(data).map_err(|_| InstructionError::InvalidInstructionData)?;
    match instruction {
        SystemInstruction::Transfer { lamports } => {
            let (from, from_signed) = account(0)?;
            let (to, _) = account(1)?;
            if !from_signed {
                return Err(InstructionError::MissingRequiredSignature);
            }
            debit(accounts, &from, lamports)?;
            credit(accounts, &to, lamports);
        }
        SystemInstruction::CreateAccount {
            lamports, owner, ..
        } => {
            let (from, from_signed) = account(0)?;
            let (to, to_signed) = account(1)?;
            if !from_signed || !to_signed {
                return Err(InstructionError::MissingRequiredSignature);
            }
            if accounts.owners.contains_key(&to)
                || accounts.balances.get(&to).copied().unwrap_or_default() > 0
            {
                // SystemError::AccountAlreadyInUse
                return Err(InstructionError::Custom(0));
            }
            debit(accounts, &from, lamports)?;
            credit(accounts, &to, lamports);
            accounts.owners.insert(to, owner);
        }
        _ => return Err(InstructionError::InvalidInstructionData),
    }
    Ok(())
}

fn execute_stake(
    accounts: &mut Accounts,
    data: &[u8],
    account: impl Fn(usize) -> Result<(Pubkey, bool), InstructionError>,
) -> Result<(), InstructionError> {
    let instruction: StakeInstruction =
        bincode::deserialize(data).map_err(|_| InstructionError::InvalidInstructionData)?;
    match instruction {
        StakeInstruction::Initialize(authorized, lockup) => {
            let (stake_address, _) = account(0)?;
            if accounts.owners.get(&stake_address) != Some(&stake::program::id()) {
                return Err(InstructionError::InvalidAccountOwner);
            }
            if accounts.stakes.contains_key(&stake_address) {
                return Err(InstructionError::AccountAlreadyInitialized);
            }
            accounts.stakes.insert(
                stake_address,
                StakeRecord {
                    authorized,
                    lockup,
                    voter: None,
                },
            );
        }
        StakeInstruction::DelegateStake => {
            let (stake_address, _) = account(0)?;
            let (vote_address, _) = account(1)?;
            let (authority, authority_signed) = account(5)?;
            let record = accounts
                .stakes
                .get_mut(&stake_address)
                .ok_or(InstructionError::InvalidAccountData)?;
            if record.authorized.staker != authority || !authority_signed {
                return Err(InstructionError::MissingRequiredSignature);
            }
            record.voter = Some(vote_address);
        }
        _ => return Err(InstructionError::InvalidInstructionData),
    }
    Ok(())
}

pub struct MockCluster {
    ledger: Mutex<Ledger>,
    airdrop_behavior: AirdropBehavior,
    lamports_per_signature: u64,
    raw_landing_delay: usize,
}

impl MockCluster {
    pub fn new(airdrop_behavior: AirdropBehavior) -> Self {
        Self {
            ledger: Mutex::default(),
            airdrop_behavior,
            lamports_per_signature: MOCK_LAMPORTS_PER_SIGNATURE,
            raw_landing_delay: MOCK_RAW_LANDING_DELAY,
        }
    }

    pub fn with_lamports_per_signature(mut self, lamports_per_signature: u64) -> Self {
        self.lamports_per_signature = lamports_per_signature;
        self
    }

    pub fn with_raw_landing_delay(mut self, balance_queries: usize) -> Self {
        self.raw_landing_delay = balance_queries.max(1);
        self
    }

    pub fn lamports_per_signature(&self) -> u64 {
        self.lamports_per_signature
    }

    /// Credits `pubkey` directly, bypassing the faucet.
    pub fn fund(&self, pubkey: &Pubkey, lamports: u64) {
        credit(&mut self.ledger.lock().unwrap().accounts, pubkey, lamports);
    }

    /// Current ledger balance, without counting as a query or landing
    /// anything.
    pub fn balance(&self, pubkey: &Pubkey) -> u64 {
        self.ledger
            .lock()
            .unwrap()
            .accounts
            .balances
            .get(pubkey)
            .copied()
            .unwrap_or_default()
    }

    pub fn owner(&self, pubkey: &Pubkey) -> Option<Pubkey> {
        self.ledger
            .lock()
            .unwrap()
            .accounts
            .owners
            .get(pubkey)
            .copied()
    }

    pub fn stake_account(&self, pubkey: &Pubkey) -> Option<StakeRecord> {
        self.ledger
            .lock()
            .unwrap()
            .accounts
            .stakes
            .get(pubkey)
            .cloned()
    }

    pub fn balance_queries(&self, pubkey: &Pubkey) -> usize {
        self.ledger
            .lock()
            .unwrap()
            .balance_queries
            .get(pubkey)
            .copied()
            .unwrap_or_default()
    }

    pub fn total_balance_queries(&self) -> usize {
        self.ledger.lock().unwrap().balance_queries.values().sum()
    }

    pub fn airdrop_requests(&self) -> usize {
        self.ledger.lock().unwrap().airdrop_requests
    }

    /// Signatures of the transactions applied to the ledger, in order.
    pub fn landed_signatures(&self) -> Vec<Signature> {
        self.ledger.lock().unwrap().landed.clone()
    }

    /// Broadcast transactions that skipped preflight and failed on landing.
    pub fn dropped_transactions(&self) -> Vec<(Signature, TransactionError)> {
        self.ledger.lock().unwrap().dropped.clone()
    }

    pub fn pending_transactions(&self) -> usize {
        self.ledger.lock().unwrap().pending_transactions.len()
    }

    pub fn raw_sends(&self) -> Vec<RawSendConfig> {
        self.ledger.lock().unwrap().raw_sends.clone()
    }

    /// Moves the chain forward, expiring blockhashes that fall out of their
    /// validity window.
    pub fn advance_block_height(&self, blocks: u64) {
        self.ledger.lock().unwrap().block_height += blocks;
    }
}

#[async_trait]
impl Cluster for MockCluster {
    async fn request_airdrop(&self, pubkey: &Pubkey, lamports: u64) -> ClientResult<Signature> {
        if self.airdrop_behavior == AirdropBehavior::Hang {
            return std::future::pending().await;
        }
        let mut ledger = self.ledger.lock().unwrap();
        ledger.airdrop_requests += 1;
        let pending = match self.airdrop_behavior {
            AirdropBehavior::CreditAfter(queries) => PendingAirdrop {
                lamports,
                queries_left: queries.max(1),
            },
            AirdropBehavior::Partial(partial) => PendingAirdrop {
                lamports: partial,
                queries_left: 1,
            },
            AirdropBehavior::Surplus(surplus) => PendingAirdrop {
                lamports: lamports + surplus,
                queries_left: 1,
            },
            AirdropBehavior::Never | AirdropBehavior::Hang => return Ok(Signature::new_unique()),
            AirdropBehavior::Reject => {
                return Err(ClientErrorKind::Custom(
                    "airdrop request failed: rate limit reached".to_string(),
                )
                .into())
            }
        };
        ledger
            .pending_airdrops
            .entry(*pubkey)
            .or_default()
            .push(pending);
        Ok(Signature::new_unique())
    }

    async fn get_balance(&self, pubkey: &Pubkey) -> ClientResult<u64> {
        let mut ledger = self.ledger.lock().unwrap();
        *ledger.balance_queries.entry(*pubkey).or_default() += 1;

        let mut credited = 0;
        if let Some(airdrops) = ledger.pending_airdrops.get_mut(pubkey) {
            airdrops.retain_mut(|airdrop| {
                airdrop.queries_left -= 1;
                if airdrop.queries_left == 0 {
                    credited += airdrop.lamports;
                    false
                } else {
                    true
                }
            });
        }
        credit(&mut ledger.accounts, pubkey, credited);

        let mut ready = vec![];
        ledger.pending_transactions.retain_mut(|pending| {
            pending.queries_left -= 1;
            if pending.queries_left == 0 {
                ready.push(pending.transaction.clone());
                false
            } else {
                true
            }
        });
        for transaction in ready {
            if let Err(err) = ledger.land(&transaction, self.lamports_per_signature) {
                ledger.dropped.push((transaction.signatures[0], err));
            }
        }

        Ok(ledger
            .accounts
            .balances
            .get(pubkey)
            .copied()
            .unwrap_or_default())
    }

    async fn get_latest_blockhash(
        &self,
        _commitment: CommitmentConfig,
    ) -> ClientResult<(Hash, u64)> {
        let mut ledger = self.ledger.lock().unwrap();
        let blockhash = Hash::new_unique();
        let last_valid_block_height = ledger.block_height + MOCK_BLOCKHASH_VALIDITY;
        ledger.blockhashes.insert(blockhash, last_valid_block_height);
        Ok((blockhash, last_valid_block_height))
    }

    async fn send_and_confirm_transaction(
        &self,
        transaction: &Transaction,
    ) -> ClientResult<Signature> {
        let mut ledger = self.ledger.lock().unwrap();
        ledger
            .land(transaction, self.lamports_per_signature)
            .map_err(ClientErrorKind::TransactionError)?;
        Ok(transaction.signatures[0])
    }

    async fn send_wire_transaction(
        &self,
        wire_transaction: &[u8],
        config: &RawSendConfig,
    ) -> ClientResult<Signature> {
        let transaction: Transaction = bincode::deserialize(wire_transaction).map_err(|err| {
            ClientErrorKind::Custom(format!("failed to deserialize transaction: {err}"))
        })?;
        let mut ledger = self.ledger.lock().unwrap();
        ledger.raw_sends.push(*config);
        if !config.skip_preflight {
            ledger
                .check_transaction(&transaction)
                .and_then(|_| {
                    execute(&ledger.accounts, &transaction, self.lamports_per_signature)
                })
                .map_err(ClientErrorKind::TransactionError)?;
        }
        let signature = transaction.signatures[0];
        ledger.pending_transactions.push(PendingTransaction {
            transaction,
            queries_left: self.raw_landing_delay,
        });
        Ok(signature)
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        solana_program::system_instruction,
        solana_sdk::signature::{Keypair, Signer},
    };

    async fn signed_transfer(
        cluster: &MockCluster,
        from: &Keypair,
        to: &Pubkey,
        lamports: u64,
    ) -> Transaction {
        let (blockhash, _) = cluster
            .get_latest_blockhash(CommitmentConfig::default())
            .await
            .unwrap();
        Transaction::new_signed_with_payer(
            &[system_instruction::transfer(&from.pubkey(), to, lamports)],
            Some(&from.pubkey()),
            &[from],
            blockhash,
        )
    }

    #[tokio::test]
    async fn test_transfer_charges_fee() {
        let cluster = MockCluster::new(AirdropBehavior::Never);
        let alice = Keypair::new();
        let bob = Pubkey::new_unique();
        cluster.fund(&alice.pubkey(), 10_000_000);

        let transaction = signed_transfer(&cluster, &alice, &bob, 1_000_000).await;
        cluster
            .send_and_confirm_transaction(&transaction)
            .await
            .unwrap();
        assert_eq!(
            cluster.balance(&alice.pubkey()),
            10_000_000 - 1_000_000 - MOCK_LAMPORTS_PER_SIGNATURE
        );
        assert_eq!(cluster.balance(&bob), 1_000_000);
        assert_eq!(cluster.landed_signatures(), vec![transaction.signatures[0]]);
    }

    #[tokio::test]
    async fn test_failed_transaction_is_atomic() {
        let cluster = MockCluster::new(AirdropBehavior::Never);
        let alice = Keypair::new();
        let bob = Pubkey::new_unique();
        cluster.fund(&alice.pubkey(), 100_000);

        let transaction = signed_transfer(&cluster, &alice, &bob, 1_000_000).await;
        let err = cluster
            .send_and_confirm_transaction(&transaction)
            .await
            .unwrap_err();
        assert_eq!(
            err.get_transaction_error(),
            Some(TransactionError::InstructionError(
                0,
                InstructionError::InsufficientFunds
            ))
        );
        assert_eq!(cluster.balance(&alice.pubkey()), 100_000);
        assert_eq!(cluster.balance(&bob), 0);
        assert!(cluster.landed_signatures().is_empty());
    }

    #[tokio::test]
    async fn test_expired_blockhash() {
        let cluster = MockCluster::new(AirdropBehavior::Never);
        let alice = Keypair::new();
        cluster.fund(&alice.pubkey(), 10_000_000);

        let transaction = signed_transfer(&cluster, &alice, &Pubkey::new_unique(), 1).await;
        cluster.advance_block_height(MOCK_BLOCKHASH_VALIDITY + 1);
        let err = cluster
            .send_and_confirm_transaction(&transaction)
            .await
            .unwrap_err();
        assert_eq!(
            err.get_transaction_error(),
            Some(TransactionError::BlockhashNotFound)
        );
    }

    #[tokio::test]
    async fn test_raw_broadcast_lands_after_queries() {
        let cluster = MockCluster::new(AirdropBehavior::Never).with_raw_landing_delay(3);
        let alice = Keypair::new();
        let bob = Pubkey::new_unique();
        cluster.fund(&alice.pubkey(), 10_000_000);

        let transaction = signed_transfer(&cluster, &alice, &bob, 1_000).await;
        let wire = bincode::serialize(&transaction).unwrap();
        let signature = cluster
            .send_wire_transaction(&wire, &RawSendConfig::default())
            .await
            .unwrap();
        assert_eq!(signature, transaction.signatures[0]);
        assert_eq!(cluster.pending_transactions(), 1);

        assert_eq!(cluster.get_balance(&bob).await.unwrap(), 0);
        assert_eq!(cluster.get_balance(&bob).await.unwrap(), 0);
        assert_eq!(cluster.get_balance(&bob).await.unwrap(), 1_000);
        assert_eq!(cluster.pending_transactions(), 0);
    }

    #[tokio::test]
    async fn test_airdrop_credit_after() {
        let cluster = MockCluster::new(AirdropBehavior::CreditAfter(2));
        let pubkey = Pubkey::new_unique();
        cluster.request_airdrop(&pubkey, 42).await.unwrap();
        assert_eq!(cluster.get_balance(&pubkey).await.unwrap(), 0);
        assert_eq!(cluster.get_balance(&pubkey).await.unwrap(), 42);
        assert_eq!(cluster.get_balance(&pubkey).await.unwrap(), 42);
        assert_eq!(cluster.balance_queries(&pubkey), 3);
    }
}
