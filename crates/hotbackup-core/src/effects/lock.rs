//! Lock manager effect.
//!
//! The lock manager owns its own concurrency discipline across every session,
//! not just backup participants. The backup protocol only chooses which mode
//! transitions to request and in which order.

use std::time::Duration;

use async_trait::async_trait;

use super::cancel::CancellationToken;
use crate::errors::LockError;
use crate::lock::{LockMode, LockRequest, LockTicket};

/// Lock manager operations used by the backup protocol.
#[async_trait]
pub trait LockManagerEffects: Send + Sync {
    /// Acquire a new ticket, waiting at most `timeout`.
    ///
    /// Must return [`LockError::Interrupted`] promptly once `cancel` fires.
    async fn acquire(
        &self,
        request: LockRequest,
        timeout: Duration,
        cancel: &dyn CancellationToken,
    ) -> Result<LockTicket, LockError>;

    /// Upgrade `ticket` to `mode`, waiting at most `timeout`.
    ///
    /// On success the ticket's granted mode is `mode`; on failure it is
    /// unchanged.
    async fn upgrade(
        &self,
        ticket: &mut LockTicket,
        mode: LockMode,
        timeout: Duration,
        cancel: &dyn CancellationToken,
    ) -> Result<(), LockError>;

    /// Move `ticket` to a weaker mode. Never blocks.
    fn downgrade(&self, ticket: &mut LockTicket, mode: LockMode);

    /// Release `ticket`.
    fn release(&self, ticket: LockTicket);
}

#[async_trait]
impl<T: LockManagerEffects + ?Sized> LockManagerEffects for std::sync::Arc<T> {
    async fn acquire(
        &self,
        request: LockRequest,
        timeout: Duration,
        cancel: &dyn CancellationToken,
    ) -> Result<LockTicket, LockError> {
        (**self).acquire(request, timeout, cancel).await
    }

    async fn upgrade(
        &self,
        ticket: &mut LockTicket,
        mode: LockMode,
        timeout: Duration,
        cancel: &dyn CancellationToken,
    ) -> Result<(), LockError> {
        (**self).upgrade(ticket, mode, timeout, cancel).await
    }

    fn downgrade(&self, ticket: &mut LockTicket, mode: LockMode) {
        (**self).downgrade(ticket, mode);
    }

    fn release(&self, ticket: LockTicket) {
        (**self).release(ticket);
    }
}
