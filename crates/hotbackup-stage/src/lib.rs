#![deny(clippy::await_holding_lock)]
//! # Hotbackup Stage - Layer 2: Backup Stage Protocol
//!
//! Online, non-blocking hot backups by staged lock escalation. A session walks
//! `START -> FLUSH -> BLOCK_DDL -> BLOCK_COMMIT -> END`; every stage installs a
//! stricter backup lock while client traffic keeps running, until the backup
//! tool can copy the last files under a lock that only blocks commits.
//!
//! - [`BackupCoordinator`] serializes backups across sessions.
//! - [`StageRunner`] sequences stage handlers for one session.
//! - [`LockEscalationProtocol`] describes the lock ladder.
//! - [`AlterCopyLockAdapter`] lets ALTER copy phases run under a blocked-DDL backup.
//! - [`BackupStageService`] is the entry point tying them to the collaborators.

pub mod alter_copy;
pub mod coordinator;
pub mod engines;
pub mod handlers;
pub mod policy;
pub mod prelude;
pub mod protocol;
pub mod runner;
pub mod service;
pub mod session;

pub use alter_copy::AlterCopyLockAdapter;
pub use coordinator::{BackupCoordinator, CoordinatorStatistics, SlotWait};
pub use engines::StorageEngineRegistry;
pub use handlers::StageHandler;
pub use policy::FlushFailureContext;
pub use protocol::{LockEscalationProtocol, LockStep};
pub use runner::StageRunner;
pub use service::{BackupStageService, BackupStageServiceBuilder};
pub use session::{BackupSession, SessionDiagnostics};
