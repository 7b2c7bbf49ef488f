//! Collaborator effect traits.
//!
//! Pure trait definitions for every side effect the backup protocol performs.
//! This module defines **what** the protocol asks of its collaborators; the
//! server (or `hotbackup-testkit` in tests) defines **how**.
//!
//! - **Lock manager**: acquire/upgrade/downgrade/release of backup-namespace tickets
//! - **Storage engines**: prepare-for-backup and end-backup hooks
//! - **Table cache**: unused-table purging and table flushing
//! - **Cancellation**: cooperative kill signal observed at every suspension point

pub mod cancel;
pub mod engine;
pub mod lock;
pub mod table;

pub use cancel::{CancellationSource, CancellationToken, NeverCancel};
pub use engine::StorageEngineEffects;
pub use lock::LockManagerEffects;
pub use table::{FlushScope, TableCacheEffects};
