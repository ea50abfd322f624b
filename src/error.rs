//! Error types exposed by this crate.

/// Errors returned by the checkpoint wait API.
///
/// A deadline that elapses while waiting is not an error: the request resolves
/// normally with `timed_out: true` and the best-known checkpoints.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum CheckpointsError {
    /// The index does not exist, was deleted mid-wait, or was still absent when
    /// a readiness wait reached its deadline.
    #[error("index not found: {index}")]
    IndexNotFound { index: String },

    /// Malformed parameter combination, detected before any waiting starts.
    #[error("invalid request: {reason}")]
    IllegalArgument { reason: String },

    /// Checkpoint polling is only defined for single-shard indices.
    #[error("wait_for_advance with explicit checkpoints is only supported for single-shard indices; index {index} has {shards} shards")]
    Unsupported { index: String, shards: usize },

    /// A programming-invariant violation. Never returned for caller mistakes.
    #[error("invariant violated: {reason}")]
    Fatal { reason: String },
}
