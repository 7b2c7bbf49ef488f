//! Backup stage entry points.
//!
//! [`BackupStageService`] bundles the coordinator with the collaborators the
//! stage handlers talk to. One service serves every session of a process.

use std::sync::Arc;

use hotbackup_core::effects::{LockManagerEffects, StorageEngineEffects, TableCacheEffects};
use hotbackup_core::{BackupConfig, BackupError, BackupStageName, Stage};

use crate::alter_copy::AlterCopyLockAdapter;
use crate::coordinator::BackupCoordinator;
use crate::engines::StorageEngineRegistry;
use crate::handlers::{self, StageContext};
use crate::runner::StageRunner;
use crate::session::BackupSession;

/// Runs `BACKUP STAGE` requests for sessions.
pub struct BackupStageService {
    coordinator: Arc<BackupCoordinator>,
    locks: Arc<dyn LockManagerEffects>,
    engines: StorageEngineRegistry,
    tables: Arc<dyn TableCacheEffects>,
    config: BackupConfig,
}

impl BackupStageService {
    /// Start building a service.
    pub fn builder() -> BackupStageServiceBuilder {
        BackupStageServiceBuilder::default()
    }

    /// New session using the service configuration.
    pub fn new_session(&self) -> BackupSession {
        BackupSession::new(&self.config)
    }

    /// Advance `session` to `stage`.
    pub async fn advance_backup_stage(
        &self,
        session: &mut BackupSession,
        stage: BackupStageName,
    ) -> Result<(), BackupError> {
        let mut ctx = self.context(session);
        StageRunner::advance(&mut ctx, stage.stage()).await
    }

    /// Advance `session` to the stage called `name` (case-insensitive).
    pub async fn advance_backup_stage_by_name(
        &self,
        session: &mut BackupSession,
        name: &str,
    ) -> Result<(), BackupError> {
        let stage: BackupStageName = name.parse()?;
        self.advance_backup_stage(session, stage).await
    }

    /// End whatever backup `session` runs. Safe to call at any time, any
    /// number of times; used on disconnect and after failed stages.
    pub async fn end_backup(&self, session: &mut BackupSession) {
        if session.current_stage() == Stage::Finished {
            return;
        }
        tracing::debug!(session = %session.id(), stage = %session.current_stage(), "ending backup");
        let mut ctx = self.context(session);
        handlers::end(&mut ctx).await;
    }

    /// ALTER copy-phase adapter bound to this service's lock manager.
    pub fn alter_copy(&self) -> AlterCopyLockAdapter {
        AlterCopyLockAdapter::new(self.locks.clone())
    }

    /// The coordinator, for diagnostics.
    pub fn coordinator(&self) -> &Arc<BackupCoordinator> {
        &self.coordinator
    }

    /// Registered storage engines.
    pub fn engines(&self) -> &StorageEngineRegistry {
        &self.engines
    }

    /// Service configuration.
    pub fn config(&self) -> &BackupConfig {
        &self.config
    }

    fn context<'a>(&'a self, session: &'a mut BackupSession) -> StageContext<'a> {
        StageContext {
            session,
            coordinator: &self.coordinator,
            locks: self.locks.as_ref(),
            engines: &self.engines,
            tables: self.tables.as_ref(),
            config: &self.config,
        }
    }
}

impl std::fmt::Debug for BackupStageService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackupStageService")
            .field("coordinator", &self.coordinator)
            .field("engines", &self.engines)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Builder for [`BackupStageService`].
#[derive(Default)]
pub struct BackupStageServiceBuilder {
    config: BackupConfig,
    coordinator: Option<Arc<BackupCoordinator>>,
    locks: Option<Arc<dyn LockManagerEffects>>,
    engines: StorageEngineRegistry,
    tables: Option<Arc<dyn TableCacheEffects>>,
}

impl BackupStageServiceBuilder {
    /// Use `config` instead of the defaults.
    pub fn with_config(mut self, config: BackupConfig) -> Self {
        self.config = config;
        self
    }

    /// Share an existing coordinator. A fresh one is created otherwise.
    pub fn with_coordinator(mut self, coordinator: Arc<BackupCoordinator>) -> Self {
        self.coordinator = Some(coordinator);
        self
    }

    /// Lock manager (required).
    pub fn with_lock_manager(mut self, locks: Arc<dyn LockManagerEffects>) -> Self {
        self.locks = Some(locks);
        self
    }

    /// Register a storage engine.
    pub fn with_storage_engine(mut self, engine: Arc<dyn StorageEngineEffects>) -> Self {
        self.engines.register(engine);
        self
    }

    /// Table cache (required).
    pub fn with_table_cache(mut self, tables: Arc<dyn TableCacheEffects>) -> Self {
        self.tables = Some(tables);
        self
    }

    /// Validate and build.
    pub fn build(self) -> Result<BackupStageService, BackupError> {
        self.config.validate()?;
        let locks = self
            .locks
            .ok_or_else(|| BackupError::config("a lock manager is required"))?;
        let tables = self
            .tables
            .ok_or_else(|| BackupError::config("a table cache is required"))?;

        Ok(BackupStageService {
            coordinator: self
                .coordinator
                .unwrap_or_else(|| Arc::new(BackupCoordinator::init())),
            locks,
            engines: self.engines,
            tables,
            config: self.config,
        })
    }
}
