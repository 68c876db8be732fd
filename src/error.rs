//! Error types for the selection/backoff/health core.

use thiserror::Error;

/// Errors the `Selector` surfaces across its public API.
///
/// Cache failures never appear here: they are swallowed inside the
/// `Selector` and degrade to a cache miss. Probe failures never appear
/// here either: they are confined to the health loop and logged, not
/// propagated.
#[derive(Error, Debug)]
pub enum SelectorError {
    /// An empty URL was passed to `get_next`, `mark_success`, or
    /// `mark_failure`.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// `get_best`/`get_next` exhausted every eligible tier for this chain.
    #[error("no healthy endpoint available for chain {chain}")]
    NoHealthyEndpoint {
        /// The chain id that had no eligible endpoint.
        chain: u64,
    },

    /// The endpoint store failed. Unlike cache failures, store failures
    /// propagate to the caller as-is.
    #[error("endpoint store error: {0}")]
    Store(String),

    /// The operation's `CancellationToken` fired before completion.
    #[error("operation cancelled")]
    Cancelled,
}

/// Errors a [`crate::prober::BlockNumberProber`] implementation may return.
///
/// These are confined to the health loop; they never cross into
/// [`SelectorError`].
#[derive(Error, Debug)]
pub enum ProbeError {
    /// Network-level failure reaching the endpoint.
    #[error("transport error: {0}")]
    Transport(String),

    /// The probe did not complete within its timeout.
    #[error("probe timed out")]
    Timeout,

    /// The endpoint responded but not with a valid block number.
    #[error("protocol error: {0}")]
    Protocol(String),
}
