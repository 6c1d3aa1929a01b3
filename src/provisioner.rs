//! Airdrop-funded account provisioning.

use {
    crate::{
        cluster::Cluster,
        config::{BalanceCheck, ClusterConfig, RetryPolicy},
        error::{Error, Result},
    },
    log::*,
    solana_client::client_error::Result as ClientResult,
    solana_sdk::{
        pubkey::Pubkey,
        signature::{Keypair, Signature, Signer},
    },
    std::{
        fmt,
        time::{Duration, Instant},
    },
    tokio::time::{sleep, timeout},
};

/// State of a balance poll loop once it stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollReport {
    /// Number of balance queries issued.
    pub attempts: usize,
    pub elapsed: Duration,
    pub last_balance: u64,
}

impl fmt::Display for PollReport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} balance checks in {:?}, last balance {}",
            self.attempts, self.elapsed, self.last_balance
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollOutcome {
    pub satisfied: bool,
    pub report: PollReport,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProvisionReport {
    pub airdrop_signature: Signature,
    pub poll: PollReport,
}

/// Polls the balance of `pubkey` every `policy.poll_interval` until `check`
/// accepts it against `target`, or until the retry budget is used up.
///
/// The first query happens after one interval. A never-satisfied check issues
/// exactly `policy.retry_budget + 1` queries.
pub async fn await_balance<C: Cluster + ?Sized>(
    cluster: &C,
    pubkey: &Pubkey,
    target: u64,
    check: BalanceCheck,
    policy: &RetryPolicy,
) -> ClientResult<PollOutcome> {
    let start = Instant::now();
    let mut attempts = 0;
    loop {
        sleep(policy.poll_interval).await;
        let balance = cluster.get_balance(pubkey).await?;
        attempts += 1;
        let report = PollReport {
            attempts,
            elapsed: start.elapsed(),
            last_balance: balance,
        };
        if check.is_satisfied(balance, target) {
            return Ok(PollOutcome {
                satisfied: true,
                report,
            });
        }
        if attempts > policy.retry_budget {
            return Ok(PollOutcome {
                satisfied: false,
                report,
            });
        }
        info!("Airdrop retry {} for {}: balance {}", attempts, pubkey, balance);
    }
}

pub struct AccountProvisioner<'a, C: Cluster + ?Sized> {
    cluster: &'a C,
    config: &'a ClusterConfig,
}

impl<'a, C: Cluster + ?Sized> AccountProvisioner<'a, C> {
    pub fn new(cluster: &'a C, config: &'a ClusterConfig) -> Self {
        Self { cluster, config }
    }

    /// Generates a new keypair and funds it with exactly `lamports` through
    /// the faucet.
    pub async fn provision(&self, lamports: u64) -> Result<Keypair> {
        self.provision_with_report(lamports)
            .await
            .map(|(keypair, _)| keypair)
    }

    pub async fn provision_with_report(&self, lamports: u64) -> Result<(Keypair, ProvisionReport)> {
        let keypair = Keypair::new();
        let pubkey = keypair.pubkey();
        debug!("Requesting airdrop of {} lamports for {}", lamports, pubkey);

        // The request itself is sent once; only the balance check is retried.
        let airdrop_signature = timeout(
            self.config.airdrop_timeout,
            self.cluster.request_airdrop(&pubkey, lamports),
        )
        .await
        .map_err(|_| Error::AirdropTimedOut {
            lamports,
            timeout: self.config.airdrop_timeout,
        })??;

        let outcome = await_balance(
            self.cluster,
            &pubkey,
            lamports,
            self.config.balance_check,
            &self.config.retry,
        )
        .await?;
        if !outcome.satisfied {
            warn!(
                "Airdrop of {} lamports to {} failed: {}",
                lamports, pubkey, outcome.report
            );
            return Err(Error::ProvisioningFailed {
                lamports,
                report: outcome.report,
            });
        }

        info!(
            "Provisioned {} with {} lamports ({})",
            pubkey, lamports, outcome.report
        );
        Ok((
            keypair,
            ProvisionReport {
                airdrop_signature,
                poll: outcome.report,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::mock_cluster::{AirdropBehavior, MockCluster},
        solana_sdk::native_token::LAMPORTS_PER_SOL,
    };

    fn test_config(retry_budget: usize) -> ClusterConfig {
        ClusterConfig {
            retry: RetryPolicy {
                poll_interval: Duration::from_millis(1),
                retry_budget,
            },
            airdrop_timeout: Duration::from_millis(200),
            ..ClusterConfig::default()
        }
    }

    #[tokio::test]
    async fn test_provision_after_k_polls() {
        let config = test_config(10);
        for k in [1, 2, 5, 11] {
            let cluster = MockCluster::new(AirdropBehavior::CreditAfter(k));
            let provisioner = AccountProvisioner::new(&cluster, &config);
            let (keypair, report) = provisioner
                .provision_with_report(2 * LAMPORTS_PER_SOL)
                .await
                .unwrap();
            assert_eq!(report.poll.attempts, k);
            assert_eq!(report.poll.last_balance, 2 * LAMPORTS_PER_SOL);
            assert_eq!(cluster.balance_queries(&keypair.pubkey()), k);
            assert_eq!(cluster.balance(&keypair.pubkey()), 2 * LAMPORTS_PER_SOL);
        }
    }

    #[tokio::test]
    async fn test_provision_exhausts_budget() {
        let config = test_config(10);
        let cluster = MockCluster::new(AirdropBehavior::Never);
        let provisioner = AccountProvisioner::new(&cluster, &config);
        match provisioner.provision(LAMPORTS_PER_SOL).await {
            Err(Error::ProvisioningFailed { lamports, report }) => {
                assert_eq!(lamports, LAMPORTS_PER_SOL);
                assert_eq!(report.attempts, 11);
                assert_eq!(report.last_balance, 0);
            }
            other => panic!("unexpected result {other:?}"),
        }
        assert_eq!(cluster.total_balance_queries(), 11);
    }

    #[tokio::test]
    async fn test_provision_credit_one_poll_too_late() {
        let config = test_config(3);
        let cluster = MockCluster::new(AirdropBehavior::CreditAfter(5));
        let provisioner = AccountProvisioner::new(&cluster, &config);
        assert!(matches!(
            provisioner.provision(LAMPORTS_PER_SOL).await,
            Err(Error::ProvisioningFailed { .. })
        ));
        assert_eq!(cluster.total_balance_queries(), 4);
    }

    #[tokio::test]
    async fn test_provision_zero_budget_polls_once() {
        let config = test_config(0);
        let cluster = MockCluster::new(AirdropBehavior::CreditAfter(2));
        let provisioner = AccountProvisioner::new(&cluster, &config);
        match provisioner.provision(LAMPORTS_PER_SOL).await {
            Err(Error::ProvisioningFailed { report, .. }) => assert_eq!(report.attempts, 1),
            other => panic!("unexpected result {other:?}"),
        }
        assert_eq!(cluster.total_balance_queries(), 1);

        let cluster = MockCluster::new(AirdropBehavior::CreditAfter(1));
        let provisioner = AccountProvisioner::new(&cluster, &config);
        assert!(provisioner.provision(LAMPORTS_PER_SOL).await.is_ok());
    }

    #[tokio::test]
    async fn test_provision_rejects_partial_credit() {
        let config = test_config(2);
        let cluster = MockCluster::new(AirdropBehavior::Partial(LAMPORTS_PER_SOL / 2));
        let provisioner = AccountProvisioner::new(&cluster, &config);
        match provisioner.provision(LAMPORTS_PER_SOL).await {
            Err(Error::ProvisioningFailed { report, .. }) => {
                assert_eq!(report.attempts, 3);
                assert_eq!(report.last_balance, LAMPORTS_PER_SOL / 2);
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_provision_surplus() {
        let mut config = test_config(2);
        let cluster = MockCluster::new(AirdropBehavior::Surplus(1));
        {
            let provisioner = AccountProvisioner::new(&cluster, &config);
            assert!(matches!(
                provisioner.provision(LAMPORTS_PER_SOL).await,
                Err(Error::ProvisioningFailed { .. })
            ));
        }

        config.balance_check = BalanceCheck::AtLeast;
        let provisioner = AccountProvisioner::new(&cluster, &config);
        let (keypair, report) = provisioner
            .provision_with_report(LAMPORTS_PER_SOL)
            .await
            .unwrap();
        assert_eq!(report.poll.attempts, 1);
        assert_eq!(cluster.balance(&keypair.pubkey()), LAMPORTS_PER_SOL + 1);
    }

    #[tokio::test]
    async fn test_provision_twice_yields_independent_accounts() {
        let config = test_config(10);
        let cluster = MockCluster::new(AirdropBehavior::CreditAfter(1));
        let provisioner = AccountProvisioner::new(&cluster, &config);
        let first = provisioner.provision(LAMPORTS_PER_SOL).await.unwrap();
        let second = provisioner.provision(3 * LAMPORTS_PER_SOL).await.unwrap();
        assert_ne!(first.pubkey(), second.pubkey());
        assert_eq!(cluster.balance(&first.pubkey()), LAMPORTS_PER_SOL);
        assert_eq!(cluster.balance(&second.pubkey()), 3 * LAMPORTS_PER_SOL);
        assert_eq!(cluster.airdrop_requests(), 2);
    }

    #[tokio::test]
    async fn test_provision_concurrently() {
        let config = test_config(10);
        let cluster = MockCluster::new(AirdropBehavior::CreditAfter(3));
        let provisioner = AccountProvisioner::new(&cluster, &config);
        let (first, second) = tokio::try_join!(
            provisioner.provision(LAMPORTS_PER_SOL),
            provisioner.provision(LAMPORTS_PER_SOL)
        )
        .unwrap();
        assert_ne!(first.pubkey(), second.pubkey());
        assert_eq!(cluster.balance_queries(&first.pubkey()), 3);
        assert_eq!(cluster.balance_queries(&second.pubkey()), 3);
    }

    #[tokio::test]
    async fn test_provision_request_timeout() {
        let config = test_config(10);
        let cluster = MockCluster::new(AirdropBehavior::Hang);
        let provisioner = AccountProvisioner::new(&cluster, &config);
        match provisioner.provision(LAMPORTS_PER_SOL).await {
            Err(Error::AirdropTimedOut { lamports, timeout }) => {
                assert_eq!(lamports, LAMPORTS_PER_SOL);
                assert_eq!(timeout, Duration::from_millis(200));
            }
            other => panic!("unexpected result {other:?}"),
        }
        assert_eq!(cluster.total_balance_queries(), 0);
    }

    #[tokio::test]
    async fn test_provision_request_error_is_not_retried() {
        let config = test_config(10);
        let cluster = MockCluster::new(AirdropBehavior::Reject);
        let provisioner = AccountProvisioner::new(&cluster, &config);
        assert!(matches!(
            provisioner.provision(LAMPORTS_PER_SOL).await,
            Err(Error::Rpc(_))
        ));
        assert_eq!(cluster.airdrop_requests(), 1);
        assert_eq!(cluster.total_balance_queries(), 0);
    }
}
