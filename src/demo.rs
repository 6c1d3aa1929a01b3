//! The end-to-end run: fund two accounts, move SOL between them, stake part
//! of the rest.

use {
    crate::{
        cli::Config,
        cluster::Cluster,
        config::BalanceCheck,
        display::{explorer_url, Sol},
        error::Result,
        provisioner::{await_balance, AccountProvisioner, PollOutcome},
        stake::StakeClient,
        submitter::{SubmitMode, TransactionSubmitter},
    },
    log::*,
    solana_sdk::{
        pubkey::Pubkey,
        signature::{Keypair, Signature, Signer},
    },
};

#[derive(Debug, PartialEq, Eq)]
pub struct DemoReport {
    pub sender: Pubkey,
    pub receiver: Pubkey,
    pub transfer_signature: Signature,
    /// How waiting for a raw transfer to land went. `None` when the transfer
    /// was confirmed by the cluster.
    pub transfer_observed: Option<PollOutcome>,
    pub stake_account: Option<Pubkey>,
    /// Same as `transfer_observed`, for the stake account funding.
    pub stake_observed: Option<PollOutcome>,
}

impl DemoReport {
    /// False if a raw broadcast was never seen taking effect. Its signature
    /// may belong to a transaction the cluster dropped.
    pub fn is_settled(&self) -> bool {
        [self.transfer_observed, self.stake_observed]
            .iter()
            .flatten()
            .all(|outcome| outcome.satisfied)
    }
}

/// With raw broadcasts nothing has landed when the signature comes back.
/// Waits until `pubkey` holds at least `expected`, warning if it never does.
async fn observe_balance<C: Cluster + ?Sized>(
    cluster: &C,
    config: &Config,
    pubkey: &Pubkey,
    expected: u64,
) -> Result<Option<PollOutcome>> {
    if config.submit_mode == SubmitMode::Confirmed {
        return Ok(None);
    }
    let outcome = await_balance(
        cluster,
        pubkey,
        expected,
        BalanceCheck::AtLeast,
        &config.cluster.retry,
    )
    .await?;
    if !outcome.satisfied {
        warn!(
            "Broadcast transaction not observed on {} yet: {}",
            pubkey, outcome.report
        );
    }
    Ok(Some(outcome))
}

async fn print_balances<C: Cluster + ?Sized>(
    cluster: &C,
    when: &str,
    accounts: &[&Keypair],
) -> Result<()> {
    for account in accounts {
        let balance = cluster.get_balance(&account.pubkey()).await?;
        println!(
            "Balance {} transfer is {} for account {}",
            when,
            Sol(balance),
            account.pubkey()
        );
    }
    Ok(())
}

pub async fn run<C: Cluster + ?Sized>(cluster: &C, config: &Config) -> Result<DemoReport> {
    let provisioner = AccountProvisioner::new(cluster, &config.cluster);
    let (sender, receiver) = if config.concurrent_airdrops {
        tokio::try_join!(
            provisioner.provision(config.airdrop_lamports),
            provisioner.provision(config.airdrop_lamports)
        )?
    } else {
        let sender = provisioner.provision(config.airdrop_lamports).await?;
        let receiver = provisioner.provision(config.airdrop_lamports).await?;
        (sender, receiver)
    };
    print_balances(cluster, "before", &[&sender, &receiver]).await?;

    let submitter = TransactionSubmitter::new(cluster, &config.cluster);
    let receiver_before = cluster.get_balance(&receiver.pubkey()).await?;
    let transfer_signature = submitter
        .transfer(
            &sender,
            &receiver.pubkey(),
            config.transfer_lamports,
            config.submit_mode,
        )
        .await?;
    println!(
        "Transferred {} from {} to {}. Signature: {}",
        Sol(config.transfer_lamports),
        sender.pubkey(),
        receiver.pubkey(),
        transfer_signature
    );
    println!(
        "Receipt: {}",
        explorer_url(&transfer_signature, &config.cluster.json_rpc_url)
    );
    let transfer_observed = observe_balance(
        cluster,
        config,
        &receiver.pubkey(),
        receiver_before + config.transfer_lamports,
    )
    .await?;
    print_balances(cluster, "after", &[&sender, &receiver]).await?;

    let (stake_account, stake_observed) = if config.stake {
        let (stake_account, observed) = stake(cluster, config, &receiver).await?;
        (Some(stake_account), observed)
    } else {
        (None, None)
    };

    Ok(DemoReport {
        sender: sender.pubkey(),
        receiver: receiver.pubkey(),
        transfer_signature,
        transfer_observed,
        stake_account,
        stake_observed,
    })
}

async fn stake<C: Cluster + ?Sized>(
    cluster: &C,
    config: &Config,
    funder: &Keypair,
) -> Result<(Pubkey, Option<PollOutcome>)> {
    let stake_client = StakeClient::new(cluster, &config.cluster);
    println!("Creating and delegating a stake account...");
    let (stake_account, observed) = if config.separate_delegation {
        let (stake_account, signature) = stake_client
            .create_stake_account(funder, config.stake_lamports, config.submit_mode)
            .await?;
        println!(
            "Receipt: {}",
            explorer_url(&signature, &config.cluster.json_rpc_url)
        );
        let observed = observe_balance(
            cluster,
            config,
            &stake_account.pubkey(),
            config.stake_lamports,
        )
        .await?;
        let balance = cluster.get_balance(&stake_account.pubkey()).await?;
        println!(
            "Created stake account with pubkey: {}. Its balance is: {}",
            stake_account.pubkey(),
            Sol(balance)
        );

        println!("Validator vote account: {}", config.vote_account);
        let signature = stake_client
            .delegate_stake(
                &stake_account.pubkey(),
                funder,
                &config.vote_account,
                config.submit_mode,
            )
            .await?;
        println!(
            "Delegated stake account {} to the validator {}",
            stake_account.pubkey(),
            config.vote_account
        );
        println!(
            "Receipt: {}",
            explorer_url(&signature, &config.cluster.json_rpc_url)
        );
        (stake_account, observed)
    } else {
        let (stake_account, signature) = stake_client
            .create_and_delegate(
                funder,
                config.stake_lamports,
                &config.vote_account,
                config.submit_mode,
            )
            .await?;
        println!(
            "Created stake account {} and delegated it to the validator {}",
            stake_account.pubkey(),
            config.vote_account
        );
        println!(
            "Receipt: {}",
            explorer_url(&signature, &config.cluster.json_rpc_url)
        );
        let observed = observe_balance(
            cluster,
            config,
            &stake_account.pubkey(),
            config.stake_lamports,
        )
        .await?;
        (stake_account, observed)
    };
    Ok((stake_account.pubkey(), observed))
}
