//! Per-session backup context.

use std::sync::Arc;
use std::time::Duration;

use hotbackup_core::effects::{CancellationToken, NeverCancel};
use hotbackup_core::{BackupConfig, LockMode, LockTicket, SessionId, Stage};

/// Session-level error state.
///
/// Collaborators that report an error to the client put it here; the flush
/// policy reads it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionDiagnostics {
    error: Option<String>,
}

impl SessionDiagnostics {
    /// Record an error on the session. The first error wins.
    pub fn raise(&mut self, message: impl Into<String>) {
        if self.error.is_none() {
            self.error = Some(message.into());
        }
    }

    /// Whether an error has been raised.
    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    /// The raised error, if any.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Forget the raised error (new statement).
    pub fn clear(&mut self) {
        self.error = None;
    }
}

/// Backup state of one client session.
pub struct BackupSession {
    id: SessionId,
    current_stage: Stage,
    backup_ticket: Option<LockTicket>,
    alter_copy_ticket: Option<LockTicket>,
    cancel: Arc<dyn CancellationToken>,
    lock_wait_timeout: Duration,
    read_only_protection: bool,
    locked_tables_mode: bool,
    diagnostics: SessionDiagnostics,
}

impl BackupSession {
    /// New session with the configured lock-wait timeout and no kill switch.
    pub fn new(config: &BackupConfig) -> Self {
        Self::with_id(SessionId::new(), config)
    }

    /// New session with a fixed identifier.
    pub fn with_id(id: SessionId, config: &BackupConfig) -> Self {
        Self {
            id,
            current_stage: Stage::Finished,
            backup_ticket: None,
            alter_copy_ticket: None,
            cancel: Arc::new(NeverCancel),
            lock_wait_timeout: config.lock_wait_timeout(),
            read_only_protection: false,
            locked_tables_mode: false,
            diagnostics: SessionDiagnostics::default(),
        }
    }

    /// Observe `cancel` at every suspension point.
    pub fn with_cancellation(mut self, cancel: Arc<dyn CancellationToken>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Override the session's lock-wait timeout.
    pub fn with_lock_wait_timeout(mut self, timeout: Duration) -> Self {
        self.lock_wait_timeout = timeout;
        self
    }

    /// Mark the session as running under read-only enforcement.
    pub fn with_read_only_protection(mut self, enabled: bool) -> Self {
        self.read_only_protection = enabled;
        self
    }

    /// Mark the session as holding explicit table locks.
    pub fn with_locked_tables(mut self, enabled: bool) -> Self {
        self.locked_tables_mode = enabled;
        self
    }

    /// Session identifier.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Current backup stage.
    pub fn current_stage(&self) -> Stage {
        self.current_stage
    }

    pub(crate) fn set_current_stage(&mut self, stage: Stage) {
        self.current_stage = stage;
    }

    /// Whether a backup is in progress on this session.
    pub fn backup_active(&self) -> bool {
        self.current_stage.is_active()
    }

    /// Cancellation token observed by this session.
    pub fn cancellation(&self) -> Arc<dyn CancellationToken> {
        self.cancel.clone()
    }

    /// Lock-wait timeout used for every lock request.
    pub fn lock_wait_timeout(&self) -> Duration {
        self.lock_wait_timeout
    }

    /// Change the lock-wait timeout (session variable).
    pub fn set_lock_wait_timeout(&mut self, timeout: Duration) {
        self.lock_wait_timeout = timeout;
    }

    /// Whether read-only enforcement applies.
    pub fn read_only_protection(&self) -> bool {
        self.read_only_protection
    }

    /// Toggle read-only enforcement.
    pub fn set_read_only_protection(&mut self, enabled: bool) {
        self.read_only_protection = enabled;
    }

    /// Whether explicit table locks are held.
    pub fn locked_tables_mode(&self) -> bool {
        self.locked_tables_mode
    }

    /// Enter or leave explicit table-lock mode.
    pub fn set_locked_tables_mode(&mut self, enabled: bool) {
        self.locked_tables_mode = enabled;
    }

    /// Session error state.
    pub fn diagnostics(&self) -> &SessionDiagnostics {
        &self.diagnostics
    }

    /// Mutable session error state.
    pub fn diagnostics_mut(&mut self) -> &mut SessionDiagnostics {
        &mut self.diagnostics
    }

    /// Mode of the backup ticket, if FLUSH acquired one.
    pub fn backup_ticket_mode(&self) -> Option<LockMode> {
        self.backup_ticket.as_ref().map(LockTicket::mode)
    }

    pub(crate) fn backup_ticket_mut(&mut self) -> Option<&mut LockTicket> {
        self.backup_ticket.as_mut()
    }

    pub(crate) fn set_backup_ticket(&mut self, ticket: LockTicket) {
        debug_assert!(self.backup_ticket.is_none(), "backup ticket acquired twice");
        self.backup_ticket = Some(ticket);
    }

    pub(crate) fn take_backup_ticket(&mut self) -> Option<LockTicket> {
        self.backup_ticket.take()
    }

    /// Hand the session's backup-namespace DDL ticket to the backup protocol
    /// for the duration of an ALTER. Returns the previously attached ticket.
    pub fn attach_alter_copy_ticket(&mut self, ticket: LockTicket) -> Option<LockTicket> {
        self.alter_copy_ticket.replace(ticket)
    }

    /// Take the ALTER ticket back (ALTER finished or aborted).
    pub fn take_alter_copy_ticket(&mut self) -> Option<LockTicket> {
        self.alter_copy_ticket.take()
    }

    /// Mode of the attached ALTER ticket.
    pub fn alter_copy_ticket_mode(&self) -> Option<LockMode> {
        self.alter_copy_ticket.as_ref().map(LockTicket::mode)
    }

    pub(crate) fn alter_copy_ticket_mut(&mut self) -> Option<&mut LockTicket> {
        self.alter_copy_ticket.as_mut()
    }
}

impl std::fmt::Debug for BackupSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackupSession")
            .field("id", &self.id)
            .field("current_stage", &self.current_stage)
            .field("backup_ticket", &self.backup_ticket)
            .field("alter_copy_ticket", &self.alter_copy_ticket)
            .field("lock_wait_timeout", &self.lock_wait_timeout)
            .field("read_only_protection", &self.read_only_protection)
            .field("locked_tables_mode", &self.locked_tables_mode)
            .field("diagnostics", &self.diagnostics)
            .finish_non_exhaustive()
    }
}

impl Drop for BackupSession {
    fn drop(&mut self) {
        if self.backup_active() {
            tracing::warn!(
                session = %self.id,
                stage = %self.current_stage,
                "session dropped with a backup in progress; end_backup was not called"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hotbackup_core::TicketId;

    #[test]
    fn test_new_session_is_idle() {
        let config = BackupConfig::default();
        let session = BackupSession::new(&config);
        assert_eq!(session.current_stage(), Stage::Finished);
        assert!(!session.backup_active());
        assert_eq!(session.backup_ticket_mode(), None);
        assert_eq!(session.lock_wait_timeout(), config.lock_wait_timeout());
        assert!(!session.cancellation().is_cancelled());
    }

    #[test]
    fn test_first_error_wins() {
        let mut diagnostics = SessionDiagnostics::default();
        diagnostics.raise("first");
        diagnostics.raise("second");
        assert_eq!(diagnostics.error(), Some("first"));
        diagnostics.clear();
        assert!(!diagnostics.has_error());
    }

    #[test]
    fn test_alter_ticket_attach_and_take() {
        let mut session = BackupSession::new(&BackupConfig::default());
        let previous =
            session.attach_alter_copy_ticket(LockTicket::granted(TicketId(9), LockMode::WaitDdl));
        assert!(previous.is_none());
        assert_eq!(session.alter_copy_ticket_mode(), Some(LockMode::WaitDdl));

        let ticket = session.take_alter_copy_ticket().unwrap();
        assert_eq!(ticket.id(), TicketId(9));
        assert_eq!(session.alter_copy_ticket_mode(), None);
    }
}
