use {
    clap::crate_version,
    log::*,
    std::process::exit,
    verta_devnet_client::{cli, demo},
};

#[tokio::main]
async fn main() {
    solana_logger::setup_with_default("solana=info,verta_devnet_client=info");

    let matches = cli::build_args(crate_version!()).get_matches();
    let config = cli::parse_args(&matches).unwrap_or_else(|err| {
        eprintln!("Error: {err}");
        exit(1);
    });
    info!(
        "Using {} at {:?} commitment",
        config.cluster.json_rpc_url, config.cluster.commitment.commitment
    );

    let rpc_client = config.cluster.rpc_client();
    match demo::run(&rpc_client, &config).await {
        Ok(report) if !report.is_settled() => {
            eprintln!(
                "Error: broadcast transaction {} or the stake funding was not observed on the cluster",
                report.transfer_signature
            );
            exit(1);
        }
        Ok(_) => {}
        Err(err) => {
            error!("{}", err);
            if err.is_retryable() {
                eprintln!("Error: {err} (the cluster may just be slow, try again)");
            } else {
                eprintln!("Error: {err}");
            }
            exit(1);
        }
    }
}
