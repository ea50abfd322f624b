//! Per-shard checkpoint aggregation.

mod local;
mod shard;


pub use shard::ShardCheckpoints;
