//! Lock relaxation for ALTER TABLE copy phases.
//!
//! An ALTER that copies rows holds a backup-namespace ticket at `WAIT_DDL`.
//! While a backup blocks DDL, that ticket would also block the copy itself.
//! The schema-change code calls [`relax_for_copy`](AlterCopyLockAdapter::relax_for_copy)
//! before copying, which moves the ticket sideways to `ALTER_COPY`, and
//! [`restore_after_copy`](AlterCopyLockAdapter::restore_after_copy) afterwards.

use std::sync::Arc;

use hotbackup_core::effects::LockManagerEffects;
use hotbackup_core::{BackupError, LockMode};

use crate::protocol::LockEscalationProtocol;
use crate::session::BackupSession;

/// Moves a session's ALTER ticket between `WAIT_DDL` and `ALTER_COPY`.
#[derive(Clone)]
pub struct AlterCopyLockAdapter {
    locks: Arc<dyn LockManagerEffects>,
}

impl AlterCopyLockAdapter {
    /// Adapter using `locks`.
    pub fn new(locks: Arc<dyn LockManagerEffects>) -> Self {
        Self { locks }
    }

    /// Relax the session's ALTER ticket from `WAIT_DDL` to `ALTER_COPY`.
    ///
    /// Does nothing when no ticket is attached or it is in another mode.
    pub fn relax_for_copy(&self, session: &mut BackupSession) {
        let id = session.id();
        let Some(ticket) = session.alter_copy_ticket_mut() else {
            return;
        };
        if ticket.mode() != LockMode::WaitDdl {
            return;
        }
        self.locks.downgrade(ticket, LockMode::AlterCopy);
        tracing::debug!(session = %id, ticket = %ticket.id(), "relaxed ALTER ticket for copy");
    }

    /// Move the session's ALTER ticket back from `ALTER_COPY` to `WAIT_DDL`.
    ///
    /// Waits with the session's lock timeout and cancellation. Succeeds
    /// without doing anything when no relaxed ticket is attached.
    pub async fn restore_after_copy(&self, session: &mut BackupSession) -> Result<(), BackupError> {
        let id = session.id();
        let timeout = session.lock_wait_timeout();
        let cancel = session.cancellation();
        let Some(ticket) = session.alter_copy_ticket_mut() else {
            return Ok(());
        };
        if ticket.mode() != LockMode::AlterCopy {
            return Ok(());
        }
        LockEscalationProtocol::check_lateral(ticket.mode(), LockMode::WaitDdl)?;

        self.locks
            .upgrade(ticket, LockMode::WaitDdl, timeout, cancel.as_ref())
            .await
            .map_err(|err| {
                tracing::warn!(session = %id, error = %err, "restoring ALTER ticket failed");
                BackupError::from(err)
            })?;
        tracing::debug!(session = %id, ticket = %ticket.id(), "restored ALTER ticket");
        Ok(())
    }
}

impl std::fmt::Debug for AlterCopyLockAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlterCopyLockAdapter").finish_non_exhaustive()
    }
}
