use std::fmt;

/// Identifies one shard of one index.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct ShardId {
    /// The index the shard belongs to.
    pub index: String,

    /// Shard number within the index, `0..shard_count`.
    pub shard: u32,
}

impl ShardId {
    pub fn new(index: impl ToString, shard: u32) -> Self {
        Self {
            index: index.to_string(),
            shard,
        }
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}][{}]", self.index, self.shard)
    }
}
