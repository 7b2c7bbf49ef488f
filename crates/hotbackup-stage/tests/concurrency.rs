//! Cross-session behavior of the backup slot.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::{wait_for_slot_waiters, Harness};
use hotbackup_core::effects::CancellationSource;
use hotbackup_core::BackupStageName::*;
use hotbackup_core::{BackupConfig, BackupError, Stage};

#[tokio::test]
async fn test_second_start_waits_for_end() {
    let h = Harness::new();
    let mut a = h.session();
    h.service.advance_backup_stage(&mut a, Start).await.unwrap();

    let b = tokio::spawn({
        let service = h.service.clone();
        let mut session = h.session();
        async move {
            let result = service.advance_backup_stage(&mut session, Start).await;
            (session, result)
        }
    });
    wait_for_slot_waiters(&h, 1).await;

    // A keeps going while B waits.
    h.service.advance_backup_stage(&mut a, BlockCommit).await.unwrap();
    assert!(!b.is_finished());
    assert_eq!(h.service.coordinator().owner(), Some(a.id()));

    h.service.advance_backup_stage(&mut a, End).await.unwrap();
    let (mut b, result) = b.await.unwrap();
    result.unwrap();
    assert_eq!(b.current_stage(), Stage::Start);
    assert_eq!(h.service.coordinator().owner(), Some(b.id()));

    h.service.end_backup(&mut b).await;
    let stats = h.service.coordinator().statistics();
    assert_eq!(stats.backups_started, 2);
    assert_eq!(stats.backups_ended, 2);
}

#[tokio::test]
async fn test_concurrent_starts_run_one_at_a_time() {
    const SESSIONS: usize = 8;
    let h = Harness::new();
    let active = Arc::new(AtomicUsize::new(0));
    let max_active = Arc::new(AtomicUsize::new(0));

    let tasks: Vec<_> = (0..SESSIONS)
        .map(|_| {
            let service = h.service.clone();
            let active = active.clone();
            let max_active = max_active.clone();
            let mut session = h.session();
            tokio::spawn(async move {
                service.advance_backup_stage(&mut session, Start).await?;
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                max_active.fetch_max(now, Ordering::SeqCst);
                assert_eq!(service.coordinator().owner(), Some(session.id()));

                service.advance_backup_stage(&mut session, BlockDdl).await?;
                for _ in 0..3 {
                    tokio::task::yield_now().await;
                }

                active.fetch_sub(1, Ordering::SeqCst);
                service.advance_backup_stage(&mut session, End).await?;
                Ok::<_, BackupError>(())
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(max_active.load(Ordering::SeqCst), 1);
    assert!(!h.service.coordinator().is_running());
    assert_eq!(h.service.coordinator().statistics().backups_ended, SESSIONS as u64);
    assert_eq!(h.locks.granted_count(), 0);
    assert!(h.locks.double_releases().is_empty());
}

#[tokio::test]
async fn test_cancelled_waiter_hands_over_to_next() {
    let h = Harness::new();
    let mut a = h.session();
    h.service.advance_backup_stage(&mut a, Start).await.unwrap();

    let kill_b = CancellationSource::new();
    let b = tokio::spawn({
        let service = h.service.clone();
        let mut session = h.session().with_cancellation(kill_b.token());
        async move {
            let result = service.advance_backup_stage(&mut session, Start).await;
            (session, result)
        }
    });
    wait_for_slot_waiters(&h, 1).await;
    let c = tokio::spawn({
        let service = h.service.clone();
        let mut session = h.session();
        async move {
            let result = service.advance_backup_stage(&mut session, Start).await;
            (session, result)
        }
    });
    wait_for_slot_waiters(&h, 2).await;

    kill_b.cancel();
    let (b, result) = b.await.unwrap();
    assert_eq!(
        result.unwrap_err(),
        BackupError::stage_failed(Stage::Start, BackupError::Cancelled)
    );
    assert_eq!(b.current_stage(), Stage::Finished);
    assert_eq!(h.service.coordinator().owner(), Some(a.id()));

    wait_for_slot_waiters(&h, 1).await;
    h.service.end_backup(&mut a).await;

    let (mut c, result) = c.await.unwrap();
    result.unwrap();
    assert_eq!(h.service.coordinator().owner(), Some(c.id()));
    assert_eq!(h.service.coordinator().statistics().cancelled_waits, 1);
    h.service.end_backup(&mut c).await;
}

#[tokio::test]
async fn test_kill_racing_end_still_hands_slot_on() {
    let h = Harness::new();
    let mut a = h.session();
    h.service.advance_backup_stage(&mut a, Start).await.unwrap();

    let kill_b = CancellationSource::new();
    let b = tokio::spawn({
        let service = h.service.clone();
        let mut session = h.session().with_cancellation(kill_b.token());
        async move { service.advance_backup_stage(&mut session, Start).await }
    });
    wait_for_slot_waiters(&h, 1).await;
    let c = tokio::spawn({
        let service = h.service.clone();
        let mut session = h.session();
        async move {
            let result = service.advance_backup_stage(&mut session, Start).await;
            (session, result)
        }
    });
    wait_for_slot_waiters(&h, 2).await;

    // B is first in line and is killed as the slot frees up.
    h.service.end_backup(&mut a).await;
    kill_b.cancel();

    assert!(b.await.unwrap().unwrap_err().is_interruption());
    let (mut c, result) = c.await.unwrap();
    result.unwrap();
    assert_eq!(h.service.coordinator().owner(), Some(c.id()));
    h.service.end_backup(&mut c).await;
}

#[tokio::test(start_paused = true)]
async fn test_start_wait_limit() {
    let h = Harness::new();
    let mut a = h.session();
    h.service.advance_backup_stage(&mut a, Start).await.unwrap();

    let mut b = h.session();
    let err = h
        .service
        .advance_backup_stage(&mut b, Start)
        .await
        .unwrap_err();
    assert_eq!(
        err.root_cause(),
        &BackupError::StartWaitTimedOut { timeout_ms: 5000 }
    );
    assert_eq!(b.current_stage(), Stage::Finished);
    assert_eq!(h.service.coordinator().owner(), Some(a.id()));
    assert_eq!(h.service.coordinator().statistics().timed_out_waits, 1);

    h.service.end_backup(&mut a).await;
}

#[tokio::test]
async fn test_unbounded_start_wait_limit_from_config() {
    let config =
        BackupConfig::from_toml_str("start_wait_timeout_secs = 9223372036854775807").unwrap();
    config.validate().unwrap();
    let h = Harness::with_config(config);

    let mut a = h.session();
    h.service.advance_backup_stage(&mut a, Start).await.unwrap();
    assert_eq!(h.service.coordinator().owner(), Some(a.id()));
    h.service.end_backup(&mut a).await;
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_start_leaves_no_backup() {
    let h = Harness::new();
    let mut a = h.session();
    h.service.advance_backup_stage(&mut a, Start).await.unwrap();

    let mut b = h.session();
    let abandoned = tokio::time::timeout(
        Duration::from_millis(20),
        h.service.advance_backup_stage(&mut b, Start),
    )
    .await;
    assert!(abandoned.is_err());
    assert_eq!(b.current_stage(), Stage::Finished);
    assert_eq!(h.service.coordinator().waiting(), 0);

    let err = h
        .service
        .advance_backup_stage(&mut b, Flush)
        .await
        .unwrap_err();
    assert_eq!(err, BackupError::NotRunning);
    assert!(b.backup_ticket_mode().is_none());
    assert_eq!(h.service.coordinator().owner(), Some(a.id()));

    h.service.end_backup(&mut b).await;
    assert_eq!(h.engine.prepare_calls(), 1);
    assert_eq!(h.engine.end_calls(), 0);

    h.service.end_backup(&mut a).await;
    h.service.advance_backup_stage(&mut b, Start).await.unwrap();
    assert_eq!(h.service.coordinator().owner(), Some(b.id()));
    h.service.end_backup(&mut b).await;
    assert_eq!(h.locks.granted_count(), 0);
}

#[tokio::test]
async fn test_shutdown_fails_waiters_but_lets_owner_end() {
    let h = Harness::new();
    let mut a = h.session();
    h.service.advance_backup_stage(&mut a, Start).await.unwrap();
    h.service.advance_backup_stage(&mut a, Flush).await.unwrap();

    let b = tokio::spawn({
        let service = h.service.clone();
        let mut session = h.session();
        async move { service.advance_backup_stage(&mut session, Start).await }
    });
    wait_for_slot_waiters(&h, 1).await;

    h.service.coordinator().shutdown();
    assert_eq!(
        b.await.unwrap().unwrap_err().root_cause(),
        &BackupError::ShuttingDown
    );

    h.service.end_backup(&mut a).await;
    assert!(!h.service.coordinator().is_running());
    assert_eq!(h.locks.granted_count(), 0);
}
