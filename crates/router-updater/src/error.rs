use alloy_primitives::{Address, B256};
use router_core::{ApplyError, ConfigError, DerivationError, DiffError};
use thiserror::Error;

/// Everything that can stop a deployment or synchronization run
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Derivation(#[from] DerivationError),

    #[error(transparent)]
    Diff(#[from] DiffError),

    #[error("Salt search unavailable: {0}")]
    DerivationUnavailable(#[source] anyhow::Error),

    #[error("Router {router} unreachable: {source}")]
    RouterUnreachable {
        router: Address,
        #[source]
        source: anyhow::Error,
    },

    #[error("No code at {address} after deployment tx {tx} was confirmed")]
    DeploymentVerificationFailed { address: Address, tx: B256 },

    #[error("Batch rejected against the router snapshot: {0}")]
    WouldRevert(#[from] ApplyError),

    #[error("Submission failed (tx {tx:?}): {reason}")]
    Submission { tx: Option<B256>, reason: String },

    #[error("RPC error: {0}")]
    Rpc(#[source] anyhow::Error),
}

impl PipelineError {
    /// Whether re-running the whole pipeline is safe and may succeed.
    ///
    /// Everything before submission is read-only, so transport failures and
    /// reverted batches can be retried; bad inputs cannot.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::DerivationUnavailable(_)
                | Self::RouterUnreachable { .. }
                | Self::Submission { .. }
                | Self::Rpc(_)
        )
    }
}
