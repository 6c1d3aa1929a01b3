use {
    crate::{
        cluster::RawSendConfig,
        config::{
            BalanceCheck, ClusterConfig, RetryPolicy, DEFAULT_AIRDROP_TIMEOUT,
            DEFAULT_JSON_RPC_URL, DEFAULT_LAMPORTS_PER_SIGNATURE, DEFAULT_POLL_INTERVAL,
            DEFAULT_RETRY_BUDGET,
        },
        stake::DEFAULT_VOTE_ACCOUNT,
        submitter::SubmitMode,
    },
    clap::{crate_description, crate_name, App, Arg, ArgMatches},
    solana_clap_utils::{
        input_parsers::{commitment_of, lamports_of_sol, pubkey_of, value_of},
        input_validators::{is_amount, is_parsable, is_pubkey, is_url_or_moniker},
    },
    solana_cli_config::{ConfigInput, CONFIG_FILE},
    solana_sdk::{native_token::sol_to_lamports, pubkey::Pubkey},
    std::{str::FromStr, time::Duration},
};

const COMMITMENT_LEVELS: &[&str] = &["processed", "confirmed", "finalized"];

/// Holds the configuration for a single run of the demo
#[derive(Debug, PartialEq, Eq)]
pub struct Config {
    pub cluster: ClusterConfig,
    pub airdrop_lamports: u64,
    pub transfer_lamports: u64,
    pub stake_lamports: u64,
    pub submit_mode: SubmitMode,
    pub vote_account: Pubkey,
    pub stake: bool,
    pub separate_delegation: bool,
    pub concurrent_airdrops: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cluster: ClusterConfig::default(),
            airdrop_lamports: sol_to_lamports(2.0),
            transfer_lamports: sol_to_lamports(1.0),
            stake_lamports: sol_to_lamports(1.0),
            submit_mode: SubmitMode::Confirmed,
            vote_account: Pubkey::from_str(DEFAULT_VOTE_ACCOUNT).unwrap_or_default(),
            stake: true,
            separate_delegation: false,
            concurrent_airdrops: true,
        }
    }
}

/// Defines and builds the CLI args for a run of the demo
pub fn build_args<'a, 'b>(version: &'b str) -> App<'a, 'b> {
    App::new(crate_name!())
        .about(crate_description!())
        .version(version)
        .arg({
            let arg = Arg::with_name("config_file")
                .short("C")
                .long("config")
                .value_name("FILEPATH")
                .takes_value(true)
                .help("Configuration file to use");
            if let Some(ref config_file) = *CONFIG_FILE {
                arg.default_value(config_file)
            } else {
                arg
            }
        })
        .arg(
            Arg::with_name("json_rpc_url")
                .short("u")
                .long("url")
                .value_name("URL_OR_MONIKER")
                .takes_value(true)
                .validator(is_url_or_moniker)
                .help(
                    "URL for Solana's JSON RPC or moniker (or their first letter): \
                       [mainnet-beta, testnet, devnet, localhost]. \
                       Airdrops are only available on devnet, testnet and localhost",
                ),
        )
        .arg(
            Arg::with_name("commitment")
                .long("commitment")
                .value_name("COMMITMENT_LEVEL")
                .takes_value(true)
                .possible_values(COMMITMENT_LEVELS)
                .default_value("confirmed")
                .help("Commitment for balance queries and transaction confirmation"),
        )
        .arg(
            Arg::with_name("airdrop")
                .long("airdrop")
                .value_name("SOL")
                .takes_value(true)
                .validator(is_amount)
                .default_value("2")
                .help("Amount of SOL to airdrop to each new account"),
        )
        .arg(
            Arg::with_name("transfer")
                .long("transfer")
                .value_name("SOL")
                .takes_value(true)
                .validator(is_amount)
                .default_value("1")
                .help("Amount of SOL to transfer from the first account to the second"),
        )
        .arg(
            Arg::with_name("stake")
                .long("stake")
                .value_name("SOL")
                .takes_value(true)
                .validator(is_amount)
                .default_value("1")
                .help("Amount of SOL to put in the new stake account"),
        )
        .arg(
            Arg::with_name("poll_interval_ms")
                .long("poll-interval-ms")
                .value_name("MILLISECONDS")
                .takes_value(true)
                .validator(is_parsable::<u64>)
                .help("Delay between two balance checks while waiting for an airdrop [default: 500]"),
        )
        .arg(
            Arg::with_name("retry_budget")
                .long("retry-budget")
                .value_name("NUM")
                .takes_value(true)
                .validator(is_parsable::<usize>)
                .help("Balance checks allowed after the first one before an airdrop counts as failed [default: 10]"),
        )
        .arg(
            Arg::with_name("airdrop_timeout")
                .long("airdrop-timeout")
                .value_name("SECS")
                .takes_value(true)
                .validator(is_parsable::<u64>)
                .help("Give up on an airdrop request the faucet does not answer within this time [default: 30]"),
        )
        .arg(
            Arg::with_name("allow_surplus")
                .long("allow-surplus")
                .takes_value(false)
                .help("Accept an airdropped balance above the requested amount instead of requiring an exact match"),
        )
        .arg(
            Arg::with_name("raw")
                .long("raw")
                .takes_value(false)
                .help(
                    "Sign and serialize transactions locally and broadcast them without \
                     waiting for confirmation",
                ),
        )
        .arg(
            Arg::with_name("skip_preflight")
                .long("skip-preflight")
                .takes_value(false)
                .requires("raw")
                .help("Skip the preflight simulation of raw broadcasts"),
        )
        .arg(
            Arg::with_name("preflight_commitment")
                .long("preflight-commitment")
                .value_name("COMMITMENT_LEVEL")
                .takes_value(true)
                .possible_values(COMMITMENT_LEVELS)
                .requires("raw")
                .help("Commitment the preflight simulation runs against [default: --commitment]"),
        )
        .arg(
            Arg::with_name("vote_account")
                .long("vote-account")
                .value_name("PUBKEY")
                .takes_value(true)
                .validator(is_pubkey)
                .default_value(DEFAULT_VOTE_ACCOUNT)
                .help("Vote account to delegate the new stake account to"),
        )
        .arg(
            Arg::with_name("no_stake")
                .long("no-stake")
                .takes_value(false)
                .help("Skip creating and delegating a stake account"),
        )
        .arg(
            Arg::with_name("separate_delegation")
                .long("separate-delegation")
                .takes_value(false)
                .conflicts_with("no_stake")
                .help("Create the stake account and delegate it in two transactions instead of one"),
        )
        .arg(
            Arg::with_name("sequential_airdrops")
                .long("sequential-airdrops")
                .takes_value(false)
                .help("Fund the two accounts one after the other instead of concurrently"),
        )
}

pub fn parse_args(matches: &ArgMatches) -> Result<Config, String> {
    let mut args = Config::default();

    let config_json_rpc_url = matches
        .value_of("config_file")
        .and_then(|config_file| solana_cli_config::Config::load(config_file).ok())
        .map(|config| config.json_rpc_url)
        .unwrap_or_else(|| DEFAULT_JSON_RPC_URL.to_string());
    let (_, json_rpc_url) = ConfigInput::compute_json_rpc_url_setting(
        matches.value_of("json_rpc_url").unwrap_or(""),
        &config_json_rpc_url,
    );
    args.cluster.json_rpc_url = json_rpc_url;

    if let Some(commitment) = commitment_of(matches, "commitment") {
        args.cluster.commitment = commitment;
    }

    args.cluster.retry = RetryPolicy {
        poll_interval: value_of(matches, "poll_interval_ms")
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_POLL_INTERVAL),
        retry_budget: value_of(matches, "retry_budget").unwrap_or(DEFAULT_RETRY_BUDGET),
    };
    args.cluster.airdrop_timeout = value_of(matches, "airdrop_timeout")
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_AIRDROP_TIMEOUT);
    if matches.is_present("allow_surplus") {
        args.cluster.balance_check = BalanceCheck::AtLeast;
    }

    args.airdrop_lamports =
        lamports_of_sol(matches, "airdrop").ok_or("could not parse airdrop amount")?;
    args.transfer_lamports =
        lamports_of_sol(matches, "transfer").ok_or("could not parse transfer amount")?;
    args.stake_lamports = lamports_of_sol(matches, "stake").ok_or("could not parse stake amount")?;
    // The sender pays one signature fee on top of the transfer.
    if args
        .transfer_lamports
        .saturating_add(DEFAULT_LAMPORTS_PER_SIGNATURE)
        > args.airdrop_lamports
    {
        return Err(format!(
            "transfer amount plus a {} lamport fee must not exceed the airdrop amount ({} lamports)",
            DEFAULT_LAMPORTS_PER_SIGNATURE, args.airdrop_lamports
        ));
    }

    if matches.is_present("raw") {
        let preflight_commitment = commitment_of(matches, "preflight_commitment")
            .unwrap_or(args.cluster.commitment)
            .commitment;
        args.submit_mode = SubmitMode::Raw(RawSendConfig {
            skip_preflight: matches.is_present("skip_preflight"),
            preflight_commitment,
        });
    }

    args.vote_account = pubkey_of(matches, "vote_account").ok_or("could not parse vote account")?;
    args.stake = !matches.is_present("no_stake");
    args.separate_delegation = matches.is_present("separate_delegation");
    args.concurrent_airdrops = !matches.is_present("sequential_airdrops");

    Ok(args)
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        solana_sdk::commitment_config::{CommitmentConfig, CommitmentLevel},
        std::io::Write,
        tempfile::NamedTempFile,
    };

    fn parse(argv: &[&str]) -> Result<Config, String> {
        let mut full = vec!["verta_devnet_client", "-C", "/nonexistent/config.yml"];
        full.extend_from_slice(argv);
        let matches = build_args("1.0.0").get_matches_from(full);
        parse_args(&matches)
    }

    #[test]
    fn test_cli_parse_defaults() {
        assert_eq!(parse(&[]).unwrap(), Config::default());
    }

    #[test]
    fn test_cli_parse_url_moniker() {
        let config = parse(&["-u", "localhost"]).unwrap();
        assert_eq!(config.cluster.json_rpc_url, "http://localhost:8899");

        let config = parse(&["-u", "http://123.4.5.6:8899"]).unwrap();
        assert_eq!(config.cluster.json_rpc_url, "http://123.4.5.6:8899");
    }

    #[test]
    fn test_cli_parse_config_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "---").unwrap();
        writeln!(file, "json_rpc_url: \"https://api.testnet.solana.com\"").unwrap();
        writeln!(file, "websocket_url: \"\"").unwrap();
        writeln!(file, "keypair_path: /tmp/id.json").unwrap();
        writeln!(file, "address_labels: {{}}").unwrap();
        writeln!(file, "commitment: confirmed").unwrap();
        let config_file = file.path().to_str().unwrap().to_string();

        let matches =
            build_args("1.0.0").get_matches_from(vec!["verta_devnet_client", "-C", &config_file]);
        let config = parse_args(&matches).unwrap();
        assert_eq!(config.cluster.json_rpc_url, "https://api.testnet.solana.com");

        // The command line wins over the config file.
        let matches = build_args("1.0.0").get_matches_from(vec![
            "verta_devnet_client",
            "-C",
            &config_file,
            "-u",
            "devnet",
        ]);
        let config = parse_args(&matches).unwrap();
        assert_eq!(config.cluster.json_rpc_url, DEFAULT_JSON_RPC_URL);
    }

    #[test]
    fn test_cli_parse_retry_settings() {
        let config = parse(&[
            "--poll-interval-ms",
            "250",
            "--retry-budget",
            "0",
            "--airdrop-timeout",
            "5",
            "--allow-surplus",
            "--commitment",
            "finalized",
        ])
        .unwrap();
        assert_eq!(
            config.cluster,
            ClusterConfig {
                commitment: CommitmentConfig::finalized(),
                retry: RetryPolicy {
                    poll_interval: Duration::from_millis(250),
                    retry_budget: 0,
                },
                airdrop_timeout: Duration::from_secs(5),
                balance_check: BalanceCheck::AtLeast,
                ..ClusterConfig::default()
            }
        );
    }

    #[test]
    fn test_cli_parse_amounts() {
        let config = parse(&["--airdrop", "1.5", "--transfer", "0.5", "--stake", "0.25"]).unwrap();
        assert_eq!(config.airdrop_lamports, 1_500_000_000);
        assert_eq!(config.transfer_lamports, 500_000_000);
        assert_eq!(config.stake_lamports, 250_000_000);

        assert!(parse(&["--airdrop", "1", "--transfer", "1"]).is_err());
    }

    #[test]
    fn test_cli_parse_transfer_leaves_room_for_fee() {
        assert!(parse(&["--airdrop", "2", "--transfer", "1.999999999"]).is_err());

        let config = parse(&["--airdrop", "2", "--transfer", "1.99999"]).unwrap();
        assert!(
            config.transfer_lamports + DEFAULT_LAMPORTS_PER_SIGNATURE <= config.airdrop_lamports
        );
    }

    #[test]
    fn test_cli_parse_raw_mode() {
        let config = parse(&["--raw"]).unwrap();
        assert_eq!(
            config.submit_mode,
            SubmitMode::Raw(RawSendConfig {
                skip_preflight: false,
                preflight_commitment: CommitmentLevel::Confirmed,
            })
        );

        let config = parse(&[
            "--raw",
            "--skip-preflight",
            "--preflight-commitment",
            "processed",
        ])
        .unwrap();
        assert_eq!(
            config.submit_mode,
            SubmitMode::Raw(RawSendConfig {
                skip_preflight: true,
                preflight_commitment: CommitmentLevel::Processed,
            })
        );

        let matches = build_args("1.0.0").get_matches_from_safe(vec![
            "verta_devnet_client",
            "--skip-preflight",
        ]);
        assert!(matches.is_err());
    }

    #[test]
    fn test_cli_parse_stake_options() {
        let vote_account = Pubkey::new_unique();
        let config = parse(&[
            "--vote-account",
            &vote_account.to_string(),
            "--no-stake",
            "--sequential-airdrops",
        ])
        .unwrap();
        assert_eq!(config.vote_account, vote_account);
        assert!(!config.stake);
        assert!(!config.concurrent_airdrops);

        let config = parse(&["--separate-delegation"]).unwrap();
        assert!(config.stake);
        assert!(config.separate_delegation);
    }
}
