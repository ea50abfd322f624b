//! Registry of indices and their per-shard checkpoint aggregators.
//!
//! The registry exclusively owns every [`ShardCheckpoints`]; waiters hold only
//! non-owning `Arc` clones. Index create/delete and primary-activation events
//! from the topology collaborator flow through here, and every such change
//! bumps a topology watch counter that readiness waiters subscribe to.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;

use tokio::sync::watch;
use tokio::time::sleep_until;
use tokio::time::Instant;

use crate::checkpoint::ShardCheckpoints;
use crate::error::CheckpointsError;
use crate::seq_no::SeqNo;
use crate::shard_id::ShardId;


/// One incarnation of an index: its shards, in shard-number order.
///
/// Deleting and recreating an index under the same name produces a new
/// incarnation; waits bound to the old one resolve with `IndexNotFound`
/// rather than silently rebinding to a different physical index.
pub struct IndexShards {
    name: String,
    incarnation: u64,
    shards: Vec<Arc<ShardCheckpoints>>,
    all_primaries_active: AtomicBool,
}

impl IndexShards {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn incarnation(&self) -> u64 {
        self.incarnation
    }

    /// Shard aggregators ordered by shard number.
    pub fn shards(&self) -> &[Arc<ShardCheckpoints>] {
        &self.shards
    }

    pub fn all_primaries_active(&self) -> bool {
        self.all_primaries_active.load(Ordering::SeqCst)
    }

    /// Fresh read of every shard's global checkpoint, by shard number.
    pub fn current_checkpoints(&self) -> Vec<SeqNo> {
        self.shards.iter().map(|s| s.current()).collect()
    }
}

impl fmt::Debug for IndexShards {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexShards")
            .field("name", &self.name)
            .field("incarnation", &self.incarnation)
            .field("shards", &self.shards.len())
            .field("all_primaries_active", &self.all_primaries_active())
            .finish()
    }
}

#[derive(Default)]
struct Indices {
    by_name: BTreeMap<String, Arc<IndexShards>>,
    next_incarnation: u64,
}

/// Maps index names to their shard checkpoint aggregators and tracks index
/// readiness.
pub struct ShardRegistry {
    indices: Mutex<Indices>,

    /// Bumped on every index create/delete/activation change. Readiness
    /// waiters loop on this instead of polling.
    topology: watch::Sender<u64>,
}

impl Default for ShardRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ShardRegistry {
    pub fn new() -> Self {
        let (topology, _rx) = watch::channel(0);
        Self {
            indices: Mutex::new(Indices::default()),
            topology,
        }
    }

    /// Register an index with `shard_count` shards, all primaries inactive.
    ///
    /// Recreating an existing name replaces it with a new incarnation.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn create_index(&self, name: &str, shard_count: u32) -> Result<Arc<IndexShards>, CheckpointsError> {
        if shard_count == 0 {
            return Err(CheckpointsError::IllegalArgument {
                reason: format!("index {} must have at least one shard", name),
            });
        }

        let index = {
            let mut indices = self.indices.lock().unwrap();
            indices.next_incarnation += 1;

            let shards = (0..shard_count)
                .map(|n| Arc::new(ShardCheckpoints::new(ShardId::new(name, n))))
                .collect();

            let index = Arc::new(IndexShards {
                name: name.to_string(),
                incarnation: indices.next_incarnation,
                shards,
                all_primaries_active: AtomicBool::new(false),
            });

            let prev = indices.by_name.insert(name.to_string(), index.clone());
            if let Some(prev) = prev {
                tracing::info!(
                    "index {} recreated: incarnation {} replaces {}",
                    name,
                    index.incarnation,
                    prev.incarnation
                );
            } else {
                tracing::info!("index {} created with {} shards", name, shard_count);
            }
            index
        };

        self.bump_topology();
        Ok(index)
    }

    /// Remove an index. Waits bound to the removed incarnation resolve with
    /// `IndexNotFound`. Returns whether the index existed.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn delete_index(&self, name: &str) -> bool {
        let removed = {
            let mut indices = self.indices.lock().unwrap();
            indices.by_name.remove(name)
        };

        match removed {
            Some(index) => {
                tracing::info!("index {} deleted (incarnation {})", name, index.incarnation);
                self.bump_topology();
                true
            }
            None => false,
        }
    }

    /// Record whether all of the index's primary shards are active.
    pub fn set_all_primaries_active(&self, name: &str, active: bool) -> Result<(), CheckpointsError> {
        let index = self.resolve(name)?;
        let prev = index.all_primaries_active.swap(active, Ordering::SeqCst);
        if prev != active {
            tracing::debug!("index {}: all_primaries_active -> {}", name, active);
            self.bump_topology();
        }
        Ok(())
    }

    /// Look up an index by name.
    pub fn resolve(&self, name: &str) -> Result<Arc<IndexShards>, CheckpointsError> {
        let indices = self.indices.lock().unwrap();
        indices.by_name.get(name).cloned().ok_or_else(|| CheckpointsError::IndexNotFound {
            index: name.to_string(),
        })
    }

    /// Names of all registered indices.
    pub fn indices(&self) -> Vec<String> {
        let indices = self.indices.lock().unwrap();
        indices.by_name.keys().cloned().collect()
    }

    /// Route a durability acknowledgement from the replication collaborator.
    ///
    /// Returns whether the shard's global checkpoint advanced. Unknown index
    /// or shard is ignored: acknowledgements legitimately race deletion.
    pub fn report_persisted(&self, shard_id: &ShardId, copy_id: &str, value: SeqNo) -> bool {
        match self.shard(shard_id) {
            Some(shard) => shard.report_persisted(copy_id, value),
            None => {
                tracing::debug!("persisted seq_no {} for unknown shard {}; ignored", value, shard_id);
                false
            }
        }
    }

    /// Route an in-sync membership addition from the topology collaborator.
    pub fn add_in_sync_copy(&self, shard_id: &ShardId, copy_id: &str, initial: SeqNo) {
        match self.shard(shard_id) {
            Some(shard) => shard.add_in_sync_copy(copy_id, initial),
            None => tracing::warn!("add of copy {} to unknown shard {}; ignored", copy_id, shard_id),
        }
    }

    /// Route an in-sync membership removal from the topology collaborator.
    pub fn remove_copy(&self, shard_id: &ShardId, copy_id: &str) {
        match self.shard(shard_id) {
            Some(shard) => shard.remove_copy(copy_id),
            None => tracing::debug!("remove of copy {} from unknown shard {}; ignored", copy_id, shard_id),
        }
    }

    /// Subscribe to topology changes.
    pub fn topology_watch(&self) -> watch::Receiver<u64> {
        self.topology.subscribe()
    }

    /// Wait until `name` exists with all primaries active, or `deadline`.
    ///
    /// `None` means the deadline elapsed first; the caller decides whether
    /// that is an error (index still absent) or a timed-out response (index
    /// present but not fully active).
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn wait_ready(&self, name: &str, deadline: Instant) -> Option<Arc<IndexShards>> {
        let mut rx = self.topology.subscribe();
        loop {
            // Mark the current topology version seen before checking, so a
            // change between the check and the await wakes us immediately.
            rx.borrow_and_update();

            if let Ok(index) = self.resolve(name) {
                if index.all_primaries_active() {
                    tracing::debug!("index {} ready (incarnation {})", name, index.incarnation);
                    return Some(index);
                }
            }

            if Instant::now() >= deadline {
                tracing::debug!("deadline elapsed waiting for index {} to become ready", name);
                return None;
            }

            tokio::select! {
                _ = sleep_until(deadline) => return None,
                changed = rx.changed() => {
                    if changed.is_err() {
                        // Registry dropped while waiting.
                        return None;
                    }
                }
            }
        }
    }

    fn shard(&self, shard_id: &ShardId) -> Option<Arc<ShardCheckpoints>> {
        let indices = self.indices.lock().unwrap();
        let index = indices.by_name.get(&shard_id.index)?;
        index.shards.get(shard_id.shard as usize).cloned()
    }

    fn bump_topology(&self) {
        self.topology.send_modify(|version| *version += 1);
    }
}
