use std::collections::BTreeMap;
use std::error::Error;
use std::sync::Mutex;

use tokio::sync::watch;
use tokio::time::sleep_until;
use tokio::time::Instant;
use validit::Valid;
use validit::Validate;

use crate::checkpoint::local::LocalCheckpoint;
use crate::seq_no::SeqNo;
use crate::seq_no::UNASSIGNED_SEQ_NO;
use crate::shard_id::ShardId;

/// The in-sync copies of a shard and their persisted checkpoints.
#[derive(Debug, Default)]
pub(crate) struct InSyncSet {
    copies: BTreeMap<String, LocalCheckpoint>,
}

impl InSyncSet {
    /// The global checkpoint: minimum persisted checkpoint over the set,
    /// `UNASSIGNED_SEQ_NO` when the set is empty.
    fn min_persisted(&self) -> SeqNo {
        self.copies.values().map(|c| c.persisted()).min().unwrap_or(UNASSIGNED_SEQ_NO)
    }
}

impl Validate for InSyncSet {
    fn validate(&self) -> Result<(), Box<dyn Error>> {
        for copy in self.copies.values() {
            copy.validate()?;
        }
        Ok(())
    }
}

/// Aggregates per-copy persisted checkpoints for one shard.
///
/// The global checkpoint is the minimum persisted checkpoint across the
/// current in-sync copies. The latest value is published through a watch
/// channel; watchers are woken only when the value actually changes, so
/// duplicate or out-of-order acknowledgements never cause notification storms.
///
/// Membership changes are surfaced truthfully: adding a copy can lower the
/// published value, and removing the copy that held the minimum can raise it.
/// Waiters re-check their own threshold on every wake, so a lowered value
/// never falsely satisfies them.
pub struct ShardCheckpoints {
    shard_id: ShardId,

    /// Guards membership and the recompute+publish step, so the published
    /// value always equals the minimum of the final state regardless of how
    /// concurrent updates interleave.
    in_sync: Mutex<Valid<InSyncSet>>,

    /// Publishes the global checkpoint. Wakes from this channel never run
    /// under the `in_sync` lock; waiters are separate tasks.
    tx: watch::Sender<SeqNo>,
}

impl ShardCheckpoints {
    pub fn new(shard_id: ShardId) -> Self {
        let (tx, _rx) = watch::channel(UNASSIGNED_SEQ_NO);
        Self {
            shard_id,
            in_sync: Mutex::new(Valid::new(InSyncSet::default())),
            tx,
        }
    }

    pub fn shard_id(&self) -> &ShardId {
        &self.shard_id
    }

    /// The current global checkpoint, without blocking.
    pub fn current(&self) -> SeqNo {
        *self.tx.borrow()
    }

    /// Subscribe to global checkpoint changes.
    pub fn watch(&self) -> watch::Receiver<SeqNo> {
        self.tx.subscribe()
    }

    /// Record that `copy_id` durably persisted up to `value`.
    ///
    /// Returns whether the shard's global checkpoint advanced as a result.
    /// Reports from copies that are not in-sync are ignored.
    pub fn report_persisted(&self, copy_id: &str, value: SeqNo) -> bool {
        let mut in_sync = self.in_sync.lock().unwrap();

        let Some(copy) = in_sync.copies.get_mut(copy_id) else {
            tracing::debug!(
                "{}: persisted seq_no {} reported by unknown copy {}; ignored",
                self.shard_id,
                value,
                copy_id
            );
            return false;
        };

        if !copy.advance(value) {
            return false;
        }

        self.publish(&in_sync)
    }

    /// Add `copy_id` to the in-sync set, starting at `initial`.
    ///
    /// Recomputes the global checkpoint immediately: a new copy can only lower
    /// or hold it. Re-adding an existing copy replaces its tracker.
    pub fn add_in_sync_copy(&self, copy_id: impl ToString, initial: SeqNo) {
        let copy_id = copy_id.to_string();
        let mut in_sync = self.in_sync.lock().unwrap();

        let prev = in_sync.copies.insert(copy_id.clone(), LocalCheckpoint::new(initial));
        match prev {
            Some(old) => tracing::info!(
                "{}: copy {} rejoined in-sync set at {} (was {})",
                self.shard_id,
                copy_id,
                initial,
                old.persisted()
            ),
            None => tracing::debug!("{}: copy {} joined in-sync set at {}", self.shard_id, copy_id, initial),
        }

        self.publish(&in_sync);
    }

    /// Remove `copy_id` from the in-sync set.
    ///
    /// Recomputes the global checkpoint: removing the copy that held the
    /// minimum can raise it, and the raise wakes watchers like any advance.
    pub fn remove_copy(&self, copy_id: &str) {
        let mut in_sync = self.in_sync.lock().unwrap();

        if in_sync.copies.remove(copy_id).is_none() {
            tracing::debug!("{}: remove of unknown copy {}; ignored", self.shard_id, copy_id);
            return;
        }
        tracing::debug!("{}: copy {} left in-sync set", self.shard_id, copy_id);

        self.publish(&in_sync);
    }

    /// Copy ids currently counting toward the global checkpoint.
    pub fn in_sync_copies(&self) -> Vec<String> {
        let in_sync = self.in_sync.lock().unwrap();
        in_sync.copies.keys().cloned().collect()
    }

    /// Per-copy persisted checkpoints, for diagnostics.
    pub fn known_checkpoints(&self) -> BTreeMap<String, SeqNo> {
        let in_sync = self.in_sync.lock().unwrap();
        in_sync.copies.iter().map(|(id, c)| (id.clone(), c.persisted())).collect()
    }

    /// Wait until the global checkpoint exceeds `baseline`, or `deadline`.
    ///
    /// Returns `true` when the checkpoint advanced past `baseline` (at once if
    /// it already has), `false` when the deadline elapsed first. Dropping the
    /// returned future releases the subscription; no thread is parked.
    #[tracing::instrument(level = "debug", skip(self), fields(shard = %self.shard_id))]
    pub async fn wait_for_advance(&self, baseline: SeqNo, deadline: Instant) -> bool {
        let mut rx = self.tx.subscribe();
        loop {
            let current = *rx.borrow_and_update();
            if current > baseline {
                tracing::debug!(
                    "{}: global checkpoint {} exceeds baseline {}",
                    self.shard_id,
                    current,
                    baseline
                );
                return true;
            }

            if Instant::now() >= deadline {
                return false;
            }

            tokio::select! {
                _ = sleep_until(deadline) => {
                    tracing::debug!(
                        "{}: deadline elapsed waiting for global checkpoint > {}, still at {}",
                        self.shard_id,
                        baseline,
                        current
                    );
                    return false;
                }
                changed = rx.changed() => {
                    if changed.is_err() {
                        // Sender dropped: the shard was closed, no advance can come.
                        return false;
                    }
                }
            }
        }
    }

    /// Recompute the minimum and publish it if it changed.
    ///
    /// Must run under the `in_sync` lock so that recompute and publish are one
    /// atomic step; two concurrent updates can then never publish a stale
    /// minimum out of order.
    fn publish(&self, in_sync: &InSyncSet) -> bool {
        let min = in_sync.min_persisted();
        let mut advanced = false;
        self.tx.send_if_modified(|current| {
            if *current == min {
                return false;
            }
            advanced = min > *current;
            tracing::debug!("{}: global checkpoint {} -> {}", self.shard_id, current, min);
            *current = min;
            true
        });
        advanced
    }
}
