//! Unified error type for backup stage operations.
//!
//! Collaborator failures keep their own small enums ([`LockError`],
//! [`EngineError`], [`TableError`]) so effect handlers do not depend on the
//! protocol's error vocabulary; they convert into [`BackupError`] with `?`.

use crate::lock::{LockMode, TicketId};
use crate::stage::Stage;

/// Errors surfaced by the lock manager.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LockError {
    /// The lock-wait timeout expired before the mode could be granted.
    #[error("Lock wait timeout exceeded after {timeout_ms}ms waiting for {mode}")]
    Timeout {
        /// Mode that was being requested
        mode: LockMode,
        /// Timeout that expired
        timeout_ms: u64,
    },

    /// The waiting session was killed.
    #[error("Interrupted while waiting for {mode}")]
    Interrupted {
        /// Mode that was being requested
        mode: LockMode,
    },

    /// The ticket is no longer known to the lock manager.
    #[error("Lock ticket {ticket} is no longer valid")]
    Invalidated {
        /// The stale ticket
        ticket: TicketId,
    },
}

/// Errors surfaced by storage engine backup hooks.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// The engine has no backup hook.
    #[error("Storage engine {engine} does not support backup hooks")]
    Unsupported {
        /// Engine name
        engine: String,
    },

    /// The hook ran and failed.
    #[error("Storage engine {engine} failed: {message}")]
    Failed {
        /// Engine name
        engine: String,
        /// Engine-specific description
        message: String,
    },
}

/// Errors surfaced by the table cache.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TableError {
    /// Some tables could not be flushed; nothing was reported to the client.
    #[error("Flush of {scope} tables failed: {message}")]
    FlushFailed {
        /// Which tables were being flushed
        scope: String,
        /// Description of the failure
        message: String,
    },

    /// The failure raised an error on the session itself.
    #[error("Session error: {message}")]
    SessionError {
        /// Error raised on the session
        message: String,
    },
}

impl TableError {
    /// Whether this failure put an error on the session.
    pub fn raised_session_error(&self) -> bool {
        matches!(self, TableError::SessionError { .. })
    }
}

/// Unified error type for all backup stage operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackupError {
    /// A stage other than START was requested while no backup is running
    #[error("Backup stage START has not been run")]
    NotRunning,

    /// The requested stage is not ahead of the session's current stage
    #[error("Backup stage {requested} is same or before current backup stage {current}")]
    WrongStage {
        /// Stage the client asked for
        requested: Stage,
        /// Stage the session is at
        current: Stage,
    },

    /// A handler failed while advancing towards `stage`
    #[error("Backup stage {stage} failed")]
    StageFailed {
        /// The originally requested stage
        stage: Stage,
        /// What went wrong inside the handler
        #[source]
        source: Box<BackupError>,
    },

    /// The session runs under read-only enforcement
    #[error("Backup is not allowed while the session is read-only protected")]
    ReadOnlyProtection,

    /// The session holds explicit table locks
    #[error("Can't execute the given command because you have active locked tables or an active transaction")]
    LockOrActiveTransaction,

    /// The session was killed while waiting for the backup slot
    #[error("Interrupted while waiting for a running backup to finish")]
    Cancelled,

    /// Waiting for the backup slot exceeded the configured limit
    #[error("Timed out after {timeout_ms}ms waiting for a running backup to finish")]
    StartWaitTimedOut {
        /// Configured wait limit
        timeout_ms: u64,
    },

    /// The coordinator is shutting down
    #[error("Backup coordinator is shutting down")]
    ShuttingDown,

    /// Lock manager failure
    #[error(transparent)]
    Lock(#[from] LockError),

    /// Storage engine failure
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Table cache failure
    #[error(transparent)]
    Table(#[from] TableError),

    /// A stage needs the backup ticket but FLUSH never acquired one
    #[error("Backup stage {stage} requires the backup lock, which is not held")]
    MissingTicket {
        /// Stage whose handler needed the ticket
        stage: Stage,
    },

    /// A lock request would move a ticket off the escalation ladder
    #[error("Lock mode change {from} -> {to} is not allowed")]
    LadderViolation {
        /// Mode the ticket holds
        from: LockMode,
        /// Mode that was requested
        to: LockMode,
    },

    /// Unrecognized stage name
    #[error("Unknown backup stage: '{name}'")]
    UnknownStage {
        /// The name as given
        name: String,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {message}")]
    Config {
        /// What is wrong
        message: String,
    },
}

impl BackupError {
    /// Wrap a handler failure under the stage the client requested.
    pub fn stage_failed(stage: Stage, source: BackupError) -> Self {
        Self::StageFailed {
            stage,
            source: Box::new(source),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// The innermost error, looking through `StageFailed` wrappers.
    pub fn root_cause(&self) -> &BackupError {
        match self {
            BackupError::StageFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Whether the failure was caused by a kill or cancellation.
    pub fn is_interruption(&self) -> bool {
        matches!(
            self.root_cause(),
            BackupError::Cancelled | BackupError::Lock(LockError::Interrupted { .. })
        )
    }
}

/// Standard Result type for backup stage operations
pub type Result<T> = std::result::Result<T, BackupError>;
