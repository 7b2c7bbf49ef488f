//! In-memory lock manager for testing
//!
//! Grants every request immediately unless the requested mode has been
//! blocked with [`InMemoryLockManager::block_mode`], in which case the request
//! waits until the mode is unblocked, the timeout expires or the caller is
//! cancelled. Every call is recorded so tests can assert on exact lock
//! traffic, and releases are counted per ticket.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hotbackup_core::effects::{CancellationToken, LockManagerEffects};
use hotbackup_core::{LockError, LockMode, LockRequest, LockTicket, TicketId};
use parking_lot::Mutex;
use tokio::sync::Notify;

/// One recorded lock manager call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockEvent {
    /// A new ticket was granted.
    Acquired {
        /// Granted ticket
        ticket: TicketId,
        /// Granted mode
        mode: LockMode,
    },
    /// A ticket moved to a stronger mode.
    Upgraded {
        /// Upgraded ticket
        ticket: TicketId,
        /// Mode before
        from: LockMode,
        /// Mode after
        to: LockMode,
    },
    /// A ticket moved to a weaker mode.
    Downgraded {
        /// Downgraded ticket
        ticket: TicketId,
        /// Mode before
        from: LockMode,
        /// Mode after
        to: LockMode,
    },
    /// A ticket was released.
    Released {
        /// Released ticket
        ticket: TicketId,
        /// Mode it held
        mode: LockMode,
    },
    /// A request failed.
    Failed {
        /// Requested mode
        mode: LockMode,
        /// Why
        error: LockError,
    },
}

#[derive(Debug, Default)]
struct LockState {
    next_ticket: u64,
    granted: HashMap<TicketId, LockMode>,
    releases: HashMap<TicketId, u32>,
    blocked: HashSet<LockMode>,
    injected: HashMap<LockMode, VecDeque<LockError>>,
    waiting: usize,
    events: Vec<LockEvent>,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<LockState>,
    unblocked: Notify,
}

/// In-memory lock manager handler for testing
#[derive(Debug, Clone, Default)]
pub struct InMemoryLockManager {
    shared: Arc<Shared>,
}

impl InMemoryLockManager {
    /// Create a lock manager that grants everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make requests for `mode` wait until [`unblock_mode`](Self::unblock_mode).
    pub fn block_mode(&self, mode: LockMode) {
        self.shared.state.lock().blocked.insert(mode);
    }

    /// Let waiting and future requests for `mode` through.
    pub fn unblock_mode(&self, mode: LockMode) {
        self.shared.state.lock().blocked.remove(&mode);
        self.shared.unblocked.notify_waiters();
    }

    /// Fail the next request for `mode` with `error`, without waiting.
    pub fn fail_next(&self, mode: LockMode, error: LockError) {
        self.shared
            .state
            .lock()
            .injected
            .entry(mode)
            .or_default()
            .push_back(error);
    }

    /// Mode currently held by `ticket`, `None` once released.
    pub fn mode_of(&self, ticket: TicketId) -> Option<LockMode> {
        self.shared.state.lock().granted.get(&ticket).copied()
    }

    /// How many times `ticket` was released.
    pub fn release_count(&self, ticket: TicketId) -> u32 {
        self.shared
            .state
            .lock()
            .releases
            .get(&ticket)
            .copied()
            .unwrap_or(0)
    }

    /// Tickets released more than once.
    pub fn double_releases(&self) -> Vec<TicketId> {
        let state = self.shared.state.lock();
        let mut tickets: Vec<_> = state
            .releases
            .iter()
            .filter(|(_, count)| **count > 1)
            .map(|(ticket, _)| *ticket)
            .collect();
        tickets.sort();
        tickets
    }

    /// Number of tickets currently granted.
    pub fn granted_count(&self) -> usize {
        self.shared.state.lock().granted.len()
    }

    /// Number of requests currently waiting on a blocked mode.
    pub fn waiting_count(&self) -> usize {
        self.shared.state.lock().waiting
    }

    /// Yield until at least `n` requests are waiting.
    pub async fn wait_for_waiters(&self, n: usize) {
        while self.waiting_count() < n {
            tokio::task::yield_now().await;
        }
    }

    /// Every call recorded so far, in order.
    pub fn events(&self) -> Vec<LockEvent> {
        self.shared.state.lock().events.clone()
    }

    /// Modes granted to `ticket` over its lifetime, in order.
    pub fn mode_history(&self, ticket: TicketId) -> Vec<LockMode> {
        self.shared
            .state
            .lock()
            .events
            .iter()
            .filter_map(|event| match event {
                LockEvent::Acquired { ticket: t, mode } if *t == ticket => Some(*mode),
                LockEvent::Upgraded { ticket: t, to, .. }
                | LockEvent::Downgraded { ticket: t, to, .. }
                    if *t == ticket =>
                {
                    Some(*to)
                }
                _ => None,
            })
            .collect()
    }

    /// Grant a ticket directly, as another subsystem of the server would.
    pub fn grant(&self, mode: LockMode) -> LockTicket {
        let mut state = self.shared.state.lock();
        state.next_ticket += 1;
        let id = TicketId(state.next_ticket);
        state.granted.insert(id, mode);
        state.events.push(LockEvent::Acquired { ticket: id, mode });
        LockTicket::granted(id, mode)
    }

    fn fail(&self, mode: LockMode, error: LockError) -> LockError {
        self.shared.state.lock().events.push(LockEvent::Failed {
            mode,
            error: error.clone(),
        });
        error
    }

    async fn wait_until_grantable(
        &self,
        mode: LockMode,
        timeout: Duration,
        cancel: &dyn CancellationToken,
    ) -> Result<(), LockError> {
        let injected = self
            .shared
            .state
            .lock()
            .injected
            .get_mut(&mode)
            .and_then(VecDeque::pop_front);
        if let Some(error) = injected {
            return Err(self.fail(mode, error));
        }

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.shared.unblocked.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.shared.state.lock();
                if !state.blocked.contains(&mode) {
                    return Ok(());
                }
                state.waiting += 1;
            }
            tracing::debug!(mode = %mode, "lock request waiting");

            let outcome = tokio::select! {
                _ = &mut notified => None,
                _ = cancel.cancelled() => Some(LockError::Interrupted { mode }),
                _ = tokio::time::sleep_until(deadline) => Some(LockError::Timeout {
                    mode,
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                }),
            };
            self.shared.state.lock().waiting -= 1;

            if let Some(error) = outcome {
                return Err(self.fail(mode, error));
            }
        }
    }
}

#[async_trait]
impl LockManagerEffects for InMemoryLockManager {
    async fn acquire(
        &self,
        request: LockRequest,
        timeout: Duration,
        cancel: &dyn CancellationToken,
    ) -> Result<LockTicket, LockError> {
        self.wait_until_grantable(request.mode, timeout, cancel)
            .await?;
        Ok(self.grant(request.mode))
    }

    async fn upgrade(
        &self,
        ticket: &mut LockTicket,
        mode: LockMode,
        timeout: Duration,
        cancel: &dyn CancellationToken,
    ) -> Result<(), LockError> {
        if self.mode_of(ticket.id()).is_none() {
            return Err(self.fail(mode, LockError::Invalidated { ticket: ticket.id() }));
        }
        self.wait_until_grantable(mode, timeout, cancel).await?;

        let from = ticket.mode();
        let mut state = self.shared.state.lock();
        state.granted.insert(ticket.id(), mode);
        state.events.push(LockEvent::Upgraded {
            ticket: ticket.id(),
            from,
            to: mode,
        });
        ticket.set_granted_mode(mode);
        Ok(())
    }

    fn downgrade(&self, ticket: &mut LockTicket, mode: LockMode) {
        let from = ticket.mode();
        let mut state = self.shared.state.lock();
        state.granted.insert(ticket.id(), mode);
        state.events.push(LockEvent::Downgraded {
            ticket: ticket.id(),
            from,
            to: mode,
        });
        ticket.set_granted_mode(mode);
    }

    fn release(&self, ticket: LockTicket) {
        let mut state = self.shared.state.lock();
        state.granted.remove(&ticket.id());
        *state.releases.entry(ticket.id()).or_insert(0) += 1;
        state.events.push(LockEvent::Released {
            ticket: ticket.id(),
            mode: ticket.mode(),
        });
    }
}
