//! Shared harness for backup stage integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use hotbackup_core::BackupConfig;
use hotbackup_stage::{BackupSession, BackupStageService};
use hotbackup_testkit::{
    init_test_tracing, test_config, InMemoryLockManager, RecordingStorageEngine,
    ScriptedTableCache,
};

/// A service wired to in-memory collaborators, plus handles to inspect them.
pub struct Harness {
    pub service: Arc<BackupStageService>,
    pub locks: InMemoryLockManager,
    pub tables: ScriptedTableCache,
    pub engine: RecordingStorageEngine,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: BackupConfig) -> Self {
        init_test_tracing();
        let locks = InMemoryLockManager::new();
        let tables = ScriptedTableCache::new();
        let engine = RecordingStorageEngine::new("InnoDB");

        let service = BackupStageService::builder()
            .with_config(config)
            .with_lock_manager(Arc::new(locks.clone()))
            .with_table_cache(Arc::new(tables.clone()))
            .with_storage_engine(Arc::new(engine.clone()))
            .build()
            .unwrap();

        Self {
            service: Arc::new(service),
            locks,
            tables,
            engine,
        }
    }

    pub fn session(&self) -> BackupSession {
        self.service.new_session()
    }
}

/// Yield until `n` sessions wait for the backup slot.
pub async fn wait_for_slot_waiters(harness: &Harness, n: usize) {
    while harness.service.coordinator().waiting() < n {
        tokio::task::yield_now().await;
    }
}
