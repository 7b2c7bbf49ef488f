//! Backup lock modes and tickets.
//!
//! The backup protocol only ever holds one ticket per session in the backup
//! lock namespace. Its mode climbs the ladder
//! `Flush < WaitFlush < WaitDdl < WaitCommit`; `AlterCopy` sits beside the
//! ladder and is only reachable from `WaitDdl`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Modes a backup-namespace ticket can be granted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LockMode {
    /// Blocks new writes to non-transactional tables.
    Flush,
    /// Waits for in-flight writers on non-transactional tables.
    WaitFlush,
    /// Additionally blocks new DDL.
    WaitDdl,
    /// Additionally blocks commits.
    WaitCommit,
    /// Lateral relaxation that lets a running ALTER copy proceed under `WaitDdl`.
    AlterCopy,
}

impl LockMode {
    /// Position on the escalation ladder; `None` for lateral modes.
    pub fn ladder_rank(self) -> Option<u8> {
        match self {
            LockMode::Flush => Some(0),
            LockMode::WaitFlush => Some(1),
            LockMode::WaitDdl => Some(2),
            LockMode::WaitCommit => Some(3),
            LockMode::AlterCopy => None,
        }
    }

    /// Whether moving from `self` to `to` escalates along the ladder.
    pub fn escalates_to(self, to: LockMode) -> bool {
        match (self.ladder_rank(), to.ladder_rank()) {
            (Some(from), Some(to)) => to > from,
            _ => false,
        }
    }

    /// The one sanctioned off-ladder move, in either direction.
    pub fn is_lateral_move(self, to: LockMode) -> bool {
        matches!(
            (self, to),
            (LockMode::WaitDdl, LockMode::AlterCopy) | (LockMode::AlterCopy, LockMode::WaitDdl)
        )
    }

    /// Name used in diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            LockMode::Flush => "BACKUP_FLUSH",
            LockMode::WaitFlush => "BACKUP_WAIT_FLUSH",
            LockMode::WaitDdl => "BACKUP_WAIT_DDL",
            LockMode::WaitCommit => "BACKUP_WAIT_COMMIT",
            LockMode::AlterCopy => "BACKUP_ALTER_COPY",
        }
    }
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Identifier the lock manager assigns to a granted ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TicketId(pub u64);

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ticket-{}", self.0)
    }
}

/// Lock namespaces the backup protocol requests locks in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LockNamespace {
    /// The global backup namespace.
    Backup,
}

/// How long a granted lock lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LockDuration {
    /// Released at statement end.
    Statement,
    /// Released at transaction end.
    Transaction,
    /// Held until explicitly released.
    Explicit,
}

/// A request for a new ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRequest {
    /// Namespace of the lock.
    pub namespace: LockNamespace,
    /// Mode to grant.
    pub mode: LockMode,
    /// Lifetime of the grant.
    pub duration: LockDuration,
}

impl LockRequest {
    /// Explicit-duration request in the backup namespace.
    pub fn backup(mode: LockMode) -> Self {
        Self {
            namespace: LockNamespace::Backup,
            mode,
            duration: LockDuration::Explicit,
        }
    }
}

/// A granted lock.
///
/// Tickets are deliberately neither `Clone` nor `Copy`: the session that
/// acquired one owns it, and releasing it consumes it.
#[derive(Debug, PartialEq, Eq)]
pub struct LockTicket {
    id: TicketId,
    mode: LockMode,
}

impl LockTicket {
    /// Constructed by lock manager implementations when granting a request.
    pub fn granted(id: TicketId, mode: LockMode) -> Self {
        Self { id, mode }
    }

    /// Ticket identifier.
    pub fn id(&self) -> TicketId {
        self.id
    }

    /// Currently granted mode.
    pub fn mode(&self) -> LockMode {
        self.mode
    }

    /// Records a mode change granted by the lock manager.
    pub fn set_granted_mode(&mut self, mode: LockMode) {
        self.mode = mode;
    }
}
