//! The long-poll coordinator: one call per client query.
//!
//! A request moves through validation, an optional index-readiness wait, and a
//! checkpoint wait, all sharing one absolute deadline computed at entry. The
//! response always carries checkpoints freshly read at resolution time, so the
//! reported values are consistent with the returned `timed_out` flag.

use futures::future::join_all;
use tokio::time::Instant;

use crate::api::GlobalCheckpointsRequest;
use crate::api::GlobalCheckpointsResponse;
use crate::error::CheckpointsError;
use crate::registry::IndexShards;
use crate::registry::ShardRegistry;

#[cfg(test)]
mod wait_test;

/// Resolve a global-checkpoints query, waiting if the request asks for it.
///
/// Suspends the calling task only; outstanding polls consume no threads, and
/// dropping the returned future cancels every subscription it holds.
///
/// A deadline that elapses mid-wait is not an error: the response resolves
/// with `timed_out: true` and the checkpoints observed at that instant. Errors
/// are reserved for invalid requests and for indices that are absent (or were
/// deleted, or deleted and recreated, while the wait was outstanding).
#[tracing::instrument(level = "debug", skip(registry, req), fields(index = %req.index))]
pub async fn wait_for_checkpoints(
    registry: &ShardRegistry,
    req: GlobalCheckpointsRequest,
) -> Result<GlobalCheckpointsResponse, CheckpointsError> {
    let deadline = Instant::now() + req.timeout;

    if req.wait_for_index && !req.wait_for_advance {
        return Err(CheckpointsError::IllegalArgument {
            reason: "wait_for_index requires wait_for_advance".to_string(),
        });
    }
    if !req.wait_for_advance && !req.checkpoints.is_empty() {
        return Err(CheckpointsError::IllegalArgument {
            reason: "checkpoints may only be supplied with wait_for_advance".to_string(),
        });
    }

    // Validation is synchronous: a malformed request fails here and never
    // enters a wait, no matter which waits it asked for.
    let resolved = registry.resolve(&req.index);
    if let Ok(index) = &resolved {
        validate_baselines(&req, index)?;
    }

    // An index that already resolves with an empty baseline is the trivial
    // immediate case, even when readiness-waiting was requested. Readiness is
    // waited for only when the index is absent, or when a real checkpoint
    // wait is about to start against inactive primaries.
    let needs_ready_wait = match &resolved {
        Ok(index) => req.wait_for_index && !req.checkpoints.is_empty() && !index.all_primaries_active(),
        Err(_) => req.wait_for_index,
    };

    let index = if needs_ready_wait {
        match registry.wait_ready(&req.index, deadline).await {
            Some(index) => {
                // The index may only have come into existence mid-wait.
                validate_baselines(&req, &index)?;
                index
            }
            None => {
                // Still absent at the deadline: not found. Present but not
                // fully active: answer with the best-known checkpoints.
                let index = registry.resolve(&req.index)?;
                validate_baselines(&req, &index)?;
                return Ok(GlobalCheckpointsResponse {
                    global_checkpoints: index.current_checkpoints(),
                    timed_out: true,
                });
            }
        }
    } else {
        resolved?
    };

    let timed_out = if req.checkpoints.is_empty() {
        false
    } else {
        let waits = index
            .shards()
            .iter()
            .zip(req.checkpoints.iter())
            .map(|(shard, baseline)| shard.wait_for_advance(*baseline, deadline));
        join_all(waits).await.into_iter().any(|advanced| !advanced)
    };

    // Fresh read at resolution, and never answer for a different incarnation
    // of the index than the one the wait was bound to.
    let resolved = registry.resolve(&req.index)?;
    if resolved.incarnation() != index.incarnation() {
        tracing::debug!(
            "index {} recreated mid-wait ({} -> {})",
            req.index,
            index.incarnation(),
            resolved.incarnation()
        );
        return Err(CheckpointsError::IndexNotFound { index: req.index });
    }

    Ok(GlobalCheckpointsResponse {
        global_checkpoints: resolved.current_checkpoints(),
        timed_out,
    })
}

fn validate_baselines(req: &GlobalCheckpointsRequest, index: &IndexShards) -> Result<(), CheckpointsError> {
    let shards = index.shards().len();
    if shards == 0 {
        return Err(CheckpointsError::Fatal {
            reason: format!("index {} resolved with zero shards", req.index),
        });
    }

    if req.checkpoints.is_empty() {
        return Ok(());
    }

    if shards > 1 {
        return Err(CheckpointsError::Unsupported {
            index: req.index.clone(),
            shards,
        });
    }
    if req.checkpoints.len() != shards {
        return Err(CheckpointsError::IllegalArgument {
            reason: format!(
                "expected {} checkpoints for index {}, got {}",
                shards,
                req.index,
                req.checkpoints.len()
            ),
        });
    }
    Ok(())
}
