//! # Hotbackup Core - Layer 1: Backup Stage Foundations
//!
//! Domain types, the unified error type, collaborator effect traits and
//! configuration for the online backup stage protocol.
//!
//! This crate defines **what** the backup protocol talks to: the lock manager,
//! the storage engines and the table cache are expressed as effect traits in
//! [`effects`]. `hotbackup-stage` defines **how** the protocol drives them.

pub mod config;
pub mod effects;
pub mod errors;
pub mod lock;
pub mod stage;
pub mod types;

pub use config::{BackupConfig, FlushFailurePolicy};
pub use errors::{BackupError, EngineError, LockError, Result, TableError};
pub use lock::{LockDuration, LockMode, LockNamespace, LockRequest, LockTicket, TicketId};
pub use stage::{BackupStageName, Stage};
pub use types::SessionId;
