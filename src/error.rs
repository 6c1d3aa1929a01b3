use {
    crate::provisioner::PollReport,
    solana_client::client_error::ClientError,
    solana_sdk::transaction::TransactionError,
    std::time::Duration,
};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Airdrop of {lamports} lamports failed: {report}")]
    ProvisioningFailed { lamports: u64, report: PollReport },

    #[error("Airdrop request of {lamports} lamports got no answer within {timeout:?}")]
    AirdropTimedOut { lamports: u64, timeout: Duration },

    #[error("Transaction submission failed: {cause}")]
    SubmissionFailed {
        #[source]
        cause: ClientError,
    },

    #[error("RPC error: {0}")]
    Rpc(#[from] ClientError),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn submission(cause: impl Into<ClientError>) -> Self {
        Self::SubmissionFailed {
            cause: cause.into(),
        }
    }

    /// Whether running the same operation again, from scratch, can succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ProvisioningFailed { .. } | Self::AirdropTimedOut { .. } => true,
            Self::SubmissionFailed { cause } => matches!(
                cause.get_transaction_error(),
                Some(TransactionError::BlockhashNotFound)
            ),
            Self::Rpc(_) => false,
        }
    }
}
