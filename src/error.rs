// src/error.rs
use thiserror::Error;

/// Failure kinds the engine distinguishes. The caller-visible contract is
/// still success vs. failure plus whether the queue mutated; these kinds
/// exist so the CLI and logs can tell a failed load from a failed save.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A store query failed while building the candidate pool. The
    /// previous queue is left untouched and the same filters can be
    /// retried.
    #[error("candidate load failed: {0}")]
    LoadFailure(#[source] anyhow::Error),

    /// The primary record write failed. The queue does not advance and
    /// the operator's edited fields remain available for retry.
    #[error("commit of record {record_id} failed: {source}")]
    CommitFailure {
        record_id: String,
        #[source]
        source: anyhow::Error,
    },
}
