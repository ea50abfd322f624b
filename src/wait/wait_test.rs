use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use pretty_assertions::assert_eq;
use tokio::time::sleep;
use tokio::time::Instant;

use crate::api::GlobalCheckpointsRequest;
use crate::error::CheckpointsError;
use crate::registry::ShardRegistry;
use crate::seq_no::UNASSIGNED_SEQ_NO;
use crate::shard_id::ShardId;
use crate::wait::wait_for_checkpoints;

fn poll_request(index: &str, checkpoints: Vec<i64>, timeout: Duration) -> GlobalCheckpointsRequest {
    GlobalCheckpointsRequest {
        index: index.to_string(),
        wait_for_advance: true,
        wait_for_index: false,
        checkpoints,
        timeout,
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_wait_for_index_requires_wait_for_advance() {
    let r = ShardRegistry::new();
    let req = GlobalCheckpointsRequest {
        wait_for_index: true,
        ..GlobalCheckpointsRequest::new("logs")
    };

    let err = wait_for_checkpoints(&r, req).await.unwrap_err();
    assert!(matches!(err, CheckpointsError::IllegalArgument { .. }));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_checkpoints_require_wait_for_advance() {
    let r = ShardRegistry::new();
    let req = GlobalCheckpointsRequest {
        checkpoints: vec![5],
        ..GlobalCheckpointsRequest::new("logs")
    };

    let err = wait_for_checkpoints(&r, req).await.unwrap_err();
    assert!(matches!(err, CheckpointsError::IllegalArgument { .. }));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unknown_index_fails_without_waiting() {
    let r = ShardRegistry::new();

    let start = Instant::now();
    let err = wait_for_checkpoints(&r, GlobalCheckpointsRequest::new("missing")).await.unwrap_err();

    assert_eq!(
        CheckpointsError::IndexNotFound {
            index: "missing".to_string()
        },
        err
    );
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_baseline_length_mismatch_fails_before_waiting() -> Result<()> {
    let r = ShardRegistry::new();
    r.create_index("logs", 1)?;

    let start = Instant::now();
    let err = wait_for_checkpoints(&r, poll_request("logs", vec![1, 2], Duration::from_secs(30)))
        .await
        .unwrap_err();

    assert!(matches!(err, CheckpointsError::IllegalArgument { .. }));
    assert!(start.elapsed() < Duration::from_secs(1));

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_baselines_unsupported_for_multi_shard_index() -> Result<()> {
    let r = ShardRegistry::new();
    r.create_index("logs", 2)?;

    let start = Instant::now();
    let err = wait_for_checkpoints(&r, poll_request("logs", vec![1, 2], Duration::from_secs(30)))
        .await
        .unwrap_err();

    assert_eq!(
        CheckpointsError::Unsupported {
            index: "logs".to_string(),
            shards: 2
        },
        err
    );
    assert!(start.elapsed() < Duration::from_secs(1));

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_empty_baseline_resolves_immediately() -> Result<()> {
    let r = ShardRegistry::new();
    r.create_index("logs", 2)?;
    r.add_in_sync_copy(&ShardId::new("logs", 0), "copy-a", UNASSIGNED_SEQ_NO);
    r.report_persisted(&ShardId::new("logs", 0), "copy-a", 12);

    // wait_for_advance with no baselines is the trivial immediate case.
    let resp = wait_for_checkpoints(&r, poll_request("logs", vec![], Duration::from_secs(30))).await?;

    assert_eq!(vec![12, UNASSIGNED_SEQ_NO], resp.global_checkpoints);
    assert!(!resp.timed_out);

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_index_deleted_mid_wait() -> Result<()> {
    let r = Arc::new(ShardRegistry::new());
    r.create_index("logs", 1)?;
    r.add_in_sync_copy(&ShardId::new("logs", 0), "copy-a", 5);

    let r2 = r.clone();
    let h = tokio::spawn(async move {
        sleep(Duration::from_millis(50)).await;
        r2.delete_index("logs");
    });

    let err = wait_for_checkpoints(&r, poll_request("logs", vec![5], Duration::from_millis(300)))
        .await
        .unwrap_err();
    h.await?;

    assert_eq!(
        CheckpointsError::IndexNotFound {
            index: "logs".to_string()
        },
        err
    );

    Ok(())
}

/// A delete+recreate under the same name must not rebind the wait to the new
/// physical index, even when the new incarnation's checkpoint satisfies the
/// baseline.
#[tokio::test(flavor = "multi_thread")]
async fn test_index_recreated_mid_wait() -> Result<()> {
    let r = Arc::new(ShardRegistry::new());
    r.create_index("logs", 1)?;
    r.add_in_sync_copy(&ShardId::new("logs", 0), "copy-a", 5);

    let r2 = r.clone();
    let h = tokio::spawn(async move {
        sleep(Duration::from_millis(50)).await;
        r2.delete_index("logs");
        r2.create_index("logs", 1)?;
        r2.add_in_sync_copy(&ShardId::new("logs", 0), "copy-b", 100);
        Ok::<_, CheckpointsError>(())
    });

    let err = wait_for_checkpoints(&r, poll_request("logs", vec![5], Duration::from_millis(300)))
        .await
        .unwrap_err();
    h.await??;

    assert_eq!(
        CheckpointsError::IndexNotFound {
            index: "logs".to_string()
        },
        err
    );

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_ready_wait_times_out_with_inactive_primaries() -> Result<()> {
    let r = ShardRegistry::new();
    r.create_index("logs", 1)?;
    r.add_in_sync_copy(&ShardId::new("logs", 0), "copy-a", 3);

    // A real checkpoint wait against an index whose primaries never activate:
    // a timed-out response with the best-known checkpoints, not an error.
    let req = GlobalCheckpointsRequest {
        wait_for_advance: true,
        wait_for_index: true,
        checkpoints: vec![5],
        timeout: Duration::from_millis(200),
        ..GlobalCheckpointsRequest::new("logs")
    };

    let start = Instant::now();
    let resp = wait_for_checkpoints(&r, req).await?;

    assert!(resp.timed_out);
    assert_eq!(vec![3], resp.global_checkpoints);
    assert!(start.elapsed() >= Duration::from_millis(200));

    Ok(())
}

/// An empty baseline on an index that resolves is the trivial immediate case
/// even when readiness was requested and the primaries are not active yet.
#[tokio::test(flavor = "multi_thread")]
async fn test_empty_baseline_skips_ready_wait_for_existing_index() -> Result<()> {
    let r = ShardRegistry::new();
    r.create_index("logs", 1)?;
    r.add_in_sync_copy(&ShardId::new("logs", 0), "copy-a", 3);

    let req = GlobalCheckpointsRequest {
        wait_for_advance: true,
        wait_for_index: true,
        timeout: Duration::from_secs(30),
        ..GlobalCheckpointsRequest::new("logs")
    };

    let start = Instant::now();
    let resp = wait_for_checkpoints(&r, req).await?;

    assert!(!resp.timed_out);
    assert_eq!(vec![3], resp.global_checkpoints);
    assert!(start.elapsed() < Duration::from_secs(1));

    Ok(())
}

/// A malformed baseline fails synchronously even when readiness-waiting was
/// requested and the primaries are inactive; it never enters READY_WAIT.
#[tokio::test(flavor = "multi_thread")]
async fn test_invalid_baseline_fails_before_ready_wait() -> Result<()> {
    let r = ShardRegistry::new();
    r.create_index("logs", 1)?;

    let req = GlobalCheckpointsRequest {
        wait_for_advance: true,
        wait_for_index: true,
        checkpoints: vec![1, 2],
        timeout: Duration::from_secs(30),
        ..GlobalCheckpointsRequest::new("logs")
    };

    let start = Instant::now();
    let err = wait_for_checkpoints(&r, req).await.unwrap_err();

    assert!(matches!(err, CheckpointsError::IllegalArgument { .. }));
    assert!(start.elapsed() < Duration::from_secs(1));

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_ready_wait_deadline_on_absent_index_is_not_found() {
    let r = ShardRegistry::new();

    let req = GlobalCheckpointsRequest {
        wait_for_advance: true,
        wait_for_index: true,
        timeout: Duration::from_millis(200),
        ..GlobalCheckpointsRequest::new("missing")
    };

    let err = wait_for_checkpoints(&r, req).await.unwrap_err();
    assert_eq!(
        CheckpointsError::IndexNotFound {
            index: "missing".to_string()
        },
        err
    );
}
