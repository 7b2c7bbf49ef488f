//! Backup coordinator - the process-wide "backup running" slot.
//!
//! At most one session holds the slot between its START and its END. Other
//! sessions asking for START queue on a [`Notify`] and re-check the slot each
//! time they are woken. Each `end` wakes one waiter; `Notify` queues waiters
//! in arrival order, so the slot is handed out FIFO.
//!
//! The coordinator never owns the backup ticket. The session does; the
//! coordinator only remembers its id between FLUSH and END so diagnostics can
//! report it, and releases it when the session hands it back.

use std::time::Duration;

use hotbackup_core::effects::{CancellationToken, LockManagerEffects};
use hotbackup_core::{BackupError, LockTicket, SessionId, TicketId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::time::Instant;

/// Outcome of waiting for the backup slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotWait {
    /// The slot is now held by the caller.
    Ready,
    /// The caller was killed while waiting.
    Cancelled,
    /// The wait limit expired.
    TimedOut,
    /// The coordinator is shutting down.
    ShutDown,
}

/// Counters kept by the coordinator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorStatistics {
    /// Sessions that acquired the slot.
    pub backups_started: u64,
    /// Sessions that released the slot.
    pub backups_ended: u64,
    /// Slot waits abandoned because the session was killed.
    pub cancelled_waits: u64,
    /// Slot waits abandoned because the wait limit expired.
    pub timed_out_waits: u64,
}

#[derive(Debug, Default)]
struct CoordinatorState {
    running: bool,
    owner: Option<SessionId>,
    flush_ticket: Option<TicketId>,
    shutdown: bool,
    waiting: usize,
    stats: CoordinatorStatistics,
}

/// Decrements the waiter count however the wait ends, including when the
/// waiting future is dropped.
struct WaitingGuard<'a> {
    state: &'a Mutex<CoordinatorState>,
}

impl Drop for WaitingGuard<'_> {
    fn drop(&mut self) {
        self.state.lock().waiting -= 1;
    }
}

/// Serializes backups: one running backup per coordinator.
#[derive(Debug, Default)]
pub struct BackupCoordinator {
    state: Mutex<CoordinatorState>,
    slot_released: Notify,
}

impl BackupCoordinator {
    /// Fresh coordinator: no backup running, no ticket registered.
    pub fn init() -> Self {
        Self::default()
    }

    /// Whether some session holds the slot.
    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    /// Session holding the slot.
    pub fn owner(&self) -> Option<SessionId> {
        self.state.lock().owner
    }

    /// Id of the running backup's ticket, once FLUSH has acquired it.
    pub fn flush_ticket(&self) -> Option<TicketId> {
        self.state.lock().flush_ticket
    }

    /// Snapshot of the coordinator counters.
    pub fn statistics(&self) -> CoordinatorStatistics {
        self.state.lock().stats
    }

    /// Sessions currently blocked waiting for the slot.
    ///
    /// A snapshot: a waiter that was just woken is still counted until it
    /// re-checks the slot.
    pub fn waiting(&self) -> usize {
        self.state.lock().waiting
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_shut_down(&self) -> bool {
        self.state.lock().shutdown
    }

    /// Wait until the slot is free and take it for `session`.
    ///
    /// Cancellation is checked before every wait. On any exit other than
    /// [`SlotWait::Ready`] one other waiter is woken, so a waiter that gives up
    /// never strands the queue.
    pub async fn wait_for_slot(
        &self,
        session: SessionId,
        cancel: &dyn CancellationToken,
        wait_timeout: Option<Duration>,
    ) -> SlotWait {
        // A limit too large to represent is no limit.
        let deadline = wait_timeout.and_then(|timeout| Instant::now().checked_add(timeout));

        loop {
            let notified = self.slot_released.notified();
            tokio::pin!(notified);
            // Register before checking, so an `end` between the check and the
            // await below is not lost.
            notified.as_mut().enable();

            {
                let mut state = self.state.lock();
                if state.shutdown {
                    return SlotWait::ShutDown;
                }
                if cancel.is_cancelled() {
                    state.stats.cancelled_waits += 1;
                    drop(state);
                    self.slot_released.notify_one();
                    return SlotWait::Cancelled;
                }
                if !state.running {
                    state.running = true;
                    state.owner = Some(session);
                    state.flush_ticket = None;
                    state.stats.backups_started += 1;
                    return SlotWait::Ready;
                }
                state.waiting += 1;
                tracing::debug!(
                    session = %session,
                    owner = ?state.owner,
                    "waiting for running backup to finish"
                );
            }
            let waiting = WaitingGuard { state: &self.state };

            let expired = async {
                match deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => futures::future::pending::<()>().await,
                }
            };

            let outcome = tokio::select! {
                _ = &mut notified => None,
                _ = cancel.cancelled() => Some(SlotWait::Cancelled),
                _ = expired => Some(SlotWait::TimedOut),
            };

            drop(waiting);
            let Some(outcome) = outcome else {
                continue;
            };
            let mut state = self.state.lock();
            if outcome == SlotWait::TimedOut {
                state.stats.timed_out_waits += 1;
            } else {
                state.stats.cancelled_waits += 1;
            }
            drop(state);
            self.slot_released.notify_one();
            return outcome;
        }
    }

    /// Take the slot for `session`, waiting for a running backup to end.
    pub async fn try_begin(
        &self,
        session: SessionId,
        cancel: &dyn CancellationToken,
        wait_timeout: Option<Duration>,
    ) -> Result<(), BackupError> {
        match self.wait_for_slot(session, cancel, wait_timeout).await {
            SlotWait::Ready => {
                tracing::info!(session = %session, "backup started");
                Ok(())
            }
            SlotWait::Cancelled => {
                tracing::info!(session = %session, "killed while waiting for backup slot");
                Err(BackupError::Cancelled)
            }
            SlotWait::TimedOut => {
                let timeout_ms = wait_timeout
                    .map(|t| u64::try_from(t.as_millis()).unwrap_or(u64::MAX))
                    .unwrap_or_default();
                tracing::warn!(session = %session, timeout_ms, "timed out waiting for backup slot");
                Err(BackupError::StartWaitTimedOut { timeout_ms })
            }
            SlotWait::ShutDown => Err(BackupError::ShuttingDown),
        }
    }

    /// Remember the running backup's ticket.
    pub fn register_flush_ticket(&self, session: SessionId, ticket: TicketId) {
        let mut state = self.state.lock();
        if state.owner == Some(session) {
            state.flush_ticket = Some(ticket);
        } else {
            tracing::warn!(
                session = %session,
                ticket = %ticket,
                owner = ?state.owner,
                "ticket registered by a session that does not hold the backup slot"
            );
        }
    }

    /// Release the running backup's ticket on behalf of `session`.
    pub fn release_flush_ticket(
        &self,
        session: SessionId,
        ticket: LockTicket,
        locks: &dyn LockManagerEffects,
    ) {
        {
            let mut state = self.state.lock();
            if state.owner == Some(session) && state.flush_ticket == Some(ticket.id()) {
                state.flush_ticket = None;
            }
        }
        tracing::debug!(session = %session, ticket = %ticket.id(), "releasing backup ticket");
        locks.release(ticket);
    }

    /// Finish `session`'s backup: release `ticket` if given, free the slot and
    /// wake one waiter.
    ///
    /// Idempotent, and a no-op for the slot when `session` does not hold it.
    pub fn end(
        &self,
        session: SessionId,
        ticket: Option<LockTicket>,
        locks: &dyn LockManagerEffects,
    ) {
        if let Some(ticket) = ticket {
            self.release_flush_ticket(session, ticket, locks);
        }

        let released = {
            let mut state = self.state.lock();
            if state.running && state.owner == Some(session) {
                state.running = false;
                state.owner = None;
                state.flush_ticket = None;
                state.stats.backups_ended += 1;
                true
            } else {
                false
            }
        };

        if released {
            tracing::info!(session = %session, "backup ended");
            self.slot_released.notify_one();
        }
    }

    /// Refuse new backups and wake every waiter.
    ///
    /// A backup that is already running can still END.
    pub fn shutdown(&self) {
        self.state.lock().shutdown = true;
        self.slot_released.notify_waiters();
        tracing::info!("backup coordinator shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hotbackup_core::effects::{CancellationSource, NeverCancel};
    use hotbackup_testkit::InMemoryLockManager;
    use std::sync::Arc;

    fn session(n: u128) -> SessionId {
        SessionId::from_u128(n)
    }

    #[tokio::test]
    async fn test_slot_is_free_initially() {
        let coordinator = BackupCoordinator::init();
        assert!(!coordinator.is_running());
        assert_eq!(coordinator.flush_ticket(), None);

        let outcome = coordinator
            .wait_for_slot(session(1), &NeverCancel, None)
            .await;
        assert_eq!(outcome, SlotWait::Ready);
        assert_eq!(coordinator.owner(), Some(session(1)));
        assert_eq!(coordinator.statistics().backups_started, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out_while_held() {
        let coordinator = BackupCoordinator::init();
        coordinator
            .try_begin(session(1), &NeverCancel, None)
            .await
            .unwrap();

        let err = coordinator
            .try_begin(session(2), &NeverCancel, Some(Duration::from_millis(250)))
            .await
            .unwrap_err();
        assert_eq!(err, BackupError::StartWaitTimedOut { timeout_ms: 250 });
        assert_eq!(coordinator.owner(), Some(session(1)));
        assert_eq!(coordinator.statistics().timed_out_waits, 1);
    }

    #[tokio::test]
    async fn test_already_cancelled_session_never_takes_free_slot() {
        let coordinator = BackupCoordinator::init();
        let source = CancellationSource::new();
        source.cancel();

        let outcome = coordinator
            .wait_for_slot(session(1), source.token().as_ref(), None)
            .await;
        assert_eq!(outcome, SlotWait::Cancelled);
        assert!(!coordinator.is_running());
    }

    #[tokio::test]
    async fn test_unrepresentable_wait_limit_means_no_limit() {
        let coordinator = Arc::new(BackupCoordinator::init());
        let locks = InMemoryLockManager::new();
        let huge = Some(Duration::from_secs(u64::MAX));

        let outcome = coordinator.wait_for_slot(session(1), &NeverCancel, huge).await;
        assert_eq!(outcome, SlotWait::Ready);

        let waiter = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { coordinator.wait_for_slot(session(2), &NeverCancel, huge).await }
        });
        while coordinator.waiting() == 0 {
            tokio::task::yield_now().await;
        }
        coordinator.end(session(1), None, &locks);
        assert_eq!(waiter.await.unwrap(), SlotWait::Ready);
        assert_eq!(coordinator.owner(), Some(session(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_wait_is_not_counted() {
        let coordinator = BackupCoordinator::init();
        coordinator
            .try_begin(session(1), &NeverCancel, None)
            .await
            .unwrap();

        let outcome = tokio::time::timeout(
            Duration::from_millis(20),
            coordinator.wait_for_slot(session(2), &NeverCancel, None),
        )
        .await;
        assert!(outcome.is_err());
        assert_eq!(coordinator.waiting(), 0);
        assert_eq!(coordinator.owner(), Some(session(1)));
    }

    #[tokio::test]
    async fn test_end_by_non_owner_keeps_slot() {
        let coordinator = BackupCoordinator::init();
        let locks = InMemoryLockManager::new();
        coordinator
            .try_begin(session(1), &NeverCancel, None)
            .await
            .unwrap();

        coordinator.end(session(2), None, &locks);
        assert!(coordinator.is_running());

        coordinator.end(session(1), None, &locks);
        coordinator.end(session(1), None, &locks);
        assert!(!coordinator.is_running());
        assert_eq!(coordinator.statistics().backups_ended, 1);
    }

    #[tokio::test]
    async fn test_shutdown_wakes_waiters() {
        let coordinator = Arc::new(BackupCoordinator::init());
        coordinator
            .try_begin(session(1), &NeverCancel, None)
            .await
            .unwrap();

        let waiter = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { coordinator.try_begin(session(2), &NeverCancel, None).await }
        });
        tokio::task::yield_now().await;

        coordinator.shutdown();
        let result = waiter.await.unwrap();
        assert_eq!(result, Err(BackupError::ShuttingDown));
        assert!(coordinator.is_shut_down());
    }
}
