//! Sequence number primitives.

/// A sequence number assigned to a write operation within a shard.
pub type SeqNo = i64;

/// Sentinel for "no operation acknowledged yet".
///
/// A copy that has not confirmed any write reports this value, and a shard with
/// an empty in-sync set publishes it as its global checkpoint.
pub const UNASSIGNED_SEQ_NO: SeqNo = -1;
