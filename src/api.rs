//! Request and response types for the global checkpoints query.

use std::fmt;
use std::time::Duration;

use crate::seq_no::SeqNo;

/// Timeout applied when a request does not specify one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A long-poll query for an index's global checkpoints.
///
/// With the defaults the query returns immediately with the current checkpoint
/// of every shard. Setting `wait_for_advance` and supplying one baseline per
/// shard in `checkpoints` suspends the caller until every shard's global
/// checkpoint exceeds its baseline, or until `timeout`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct GlobalCheckpointsRequest {
    /// Name of the index to query. Must resolve to exactly one concrete index.
    pub index: String,

    /// Suspend until the global checkpoints exceed `checkpoints`.
    pub wait_for_advance: bool,

    /// Before checkpoint-waiting, wait for the index to exist with all primary
    /// shards active. Only meaningful together with `wait_for_advance`.
    pub wait_for_index: bool,

    /// Baseline checkpoints, one per shard, ordered by shard number. Empty
    /// means "return the current values immediately".
    pub checkpoints: Vec<SeqNo>,

    /// Budget shared by the readiness wait and the checkpoint wait.
    pub timeout: Duration,
}

impl GlobalCheckpointsRequest {
    /// An immediate (non-waiting) query with the default timeout.
    pub fn new(index: impl ToString) -> Self {
        Self {
            index: index.to_string(),
            wait_for_advance: false,
            wait_for_index: false,
            checkpoints: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// The resolved result of a [`GlobalCheckpointsRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct GlobalCheckpointsResponse {
    /// Current global checkpoint of every shard, ordered by shard number,
    /// freshly read at resolution time.
    pub global_checkpoints: Vec<SeqNo>,

    /// Whether the deadline elapsed before the wait condition was satisfied.
    pub timed_out: bool,
}

impl fmt::Display for GlobalCheckpointsResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{global_checkpoints: {:?}, timed_out: {}}}",
            self.global_checkpoints, self.timed_out
        )
    }
}
