//! Connection and retry settings shared by the provisioner and the submitter.

use {
    solana_client::nonblocking::rpc_client::RpcClient,
    solana_sdk::commitment_config::CommitmentConfig,
    std::time::Duration,
};

pub const DEFAULT_JSON_RPC_URL: &str = "https://api.devnet.solana.com";

/// Delay between two balance checks while waiting for an airdrop to land.
/// Devnet faucet latency varies a lot, so this is a setting rather than a literal.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Number of balance checks allowed after the first one before giving up.
pub const DEFAULT_RETRY_BUDGET: usize = 10;

/// Upper bound on the `requestAirdrop` call itself. The faucet has been seen
/// to hang without answering.
pub const DEFAULT_AIRDROP_TIMEOUT: Duration = Duration::from_secs(30);

/// Fee the cluster charges per transaction signature.
pub const DEFAULT_LAMPORTS_PER_SIGNATURE: u64 = 5_000;

/// How an observed balance is compared against the requested airdrop amount.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BalanceCheck {
    /// The balance must equal the requested amount. Any unrelated credit or
    /// debit on the address makes provisioning fail.
    #[default]
    Exact,
    /// The balance must be at least the requested amount.
    AtLeast,
}

impl BalanceCheck {
    pub fn is_satisfied(&self, balance: u64, target: u64) -> bool {
        match self {
            Self::Exact => balance == target,
            Self::AtLeast => balance >= target,
        }
    }
}

/// Fixed-interval polling: no backoff, no jitter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub poll_interval: Duration,
    /// Retries after the first balance check. A budget of 0 checks exactly once.
    pub retry_budget: usize,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            retry_budget: DEFAULT_RETRY_BUDGET,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterConfig {
    pub json_rpc_url: String,
    pub commitment: CommitmentConfig,
    pub retry: RetryPolicy,
    pub airdrop_timeout: Duration,
    pub balance_check: BalanceCheck,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            json_rpc_url: DEFAULT_JSON_RPC_URL.to_string(),
            commitment: CommitmentConfig::confirmed(),
            retry: RetryPolicy::default(),
            airdrop_timeout: DEFAULT_AIRDROP_TIMEOUT,
            balance_check: BalanceCheck::default(),
        }
    }
}

impl ClusterConfig {
    pub fn rpc_client(&self) -> RpcClient {
        RpcClient::new_with_commitment(self.json_rpc_url.clone(), self.commitment)
    }
}
