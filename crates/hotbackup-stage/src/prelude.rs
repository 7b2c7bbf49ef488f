//! Hotbackup stage prelude.
//!
//! Curated re-exports for driving backup stages from a session handler.

pub use crate::alter_copy::AlterCopyLockAdapter;
pub use crate::coordinator::{BackupCoordinator, SlotWait};
pub use crate::service::{BackupStageService, BackupStageServiceBuilder};
pub use crate::session::BackupSession;
pub use hotbackup_core::effects::{
    CancellationSource, CancellationToken, LockManagerEffects, NeverCancel, StorageEngineEffects,
    TableCacheEffects,
};
pub use hotbackup_core::{BackupConfig, BackupError, BackupStageName, Stage};
