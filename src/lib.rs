#![doc = include_str!("../README.md")]
#![deny(unused_qualifications)]

mod seq_no;
mod shard_id;

pub mod api;
pub mod checkpoint;
pub mod error;
pub mod registry;
pub mod wait;

pub use crate::api::GlobalCheckpointsRequest;
pub use crate::api::GlobalCheckpointsResponse;
pub use crate::api::DEFAULT_TIMEOUT;
pub use crate::checkpoint::ShardCheckpoints;
pub use crate::error::CheckpointsError;
pub use crate::registry::IndexShards;
pub use crate::registry::ShardRegistry;
pub use crate::seq_no::SeqNo;
pub use crate::seq_no::UNASSIGNED_SEQ_NO;
pub use crate::shard_id::ShardId;
pub use crate::wait::wait_for_checkpoints;
