use {
    solana_sdk::{native_token::lamports_to_sol, signature::Signature},
    std::fmt,
    url::form_urlencoded,
};

/// Lamports rendered as SOL, e.g. `1.5 SOL`.
pub struct Sol(pub u64);

impl fmt::Display for Sol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} SOL", lamports_to_sol(self.0))
    }
}

/// The `cluster` query parameter the Solana explorer expects for
/// `json_rpc_url`. Custom URLs are percent-encoded.
pub fn explorer_cluster_param(json_rpc_url: &str) -> String {
    let url = json_rpc_url.trim_end_matches('/');
    if url.contains("devnet") {
        "devnet".to_string()
    } else if url.contains("testnet") {
        "testnet".to_string()
    } else if url.contains("mainnet-beta") {
        "mainnet-beta".to_string()
    } else {
        let encoded: String = form_urlencoded::byte_serialize(url.as_bytes()).collect();
        format!("custom&customUrl={encoded}")
    }
}

pub fn explorer_url(signature: &Signature, json_rpc_url: &str) -> String {
    format!(
        "https://explorer.solana.com/tx/{}?cluster={}",
        signature,
        explorer_cluster_param(json_rpc_url)
    )
}
