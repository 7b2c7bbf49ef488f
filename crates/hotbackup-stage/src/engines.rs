//! Storage engine registry.
//!
//! Backup hooks are advisory. An engine that cannot checkpoint or resume does
//! not stop the backup, so neither fan-out here returns an error.

use std::sync::Arc;

use hotbackup_core::effects::StorageEngineEffects;
use hotbackup_core::EngineError;

/// Engines notified at backup start and end, in registration order.
#[derive(Clone, Default)]
pub struct StorageEngineRegistry {
    engines: Vec<Arc<dyn StorageEngineEffects>>,
}

impl StorageEngineRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an engine.
    pub fn register(&mut self, engine: Arc<dyn StorageEngineEffects>) {
        tracing::debug!(engine = engine.name(), "registered storage engine");
        self.engines.push(engine);
    }

    /// Number of registered engines.
    pub fn len(&self) -> usize {
        self.engines.len()
    }

    /// Whether no engine is registered.
    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }

    /// Names of the registered engines.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.engines.iter().map(|engine| engine.name())
    }

    /// Run every engine's `prepare_for_backup` hook.
    pub async fn prepare_for_backup_all(&self) {
        for engine in &self.engines {
            log_hook_outcome("prepare_for_backup", engine.prepare_for_backup().await);
        }
    }

    /// Run every engine's `end_backup` hook.
    pub async fn end_backup_all(&self) {
        for engine in &self.engines {
            log_hook_outcome("end_backup", engine.end_backup().await);
        }
    }
}

impl std::fmt::Debug for StorageEngineRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

fn log_hook_outcome(hook: &'static str, outcome: Result<(), EngineError>) {
    match outcome {
        Ok(()) => {}
        Err(EngineError::Unsupported { engine }) => {
            tracing::debug!(engine = %engine, hook, "engine has no backup hook");
        }
        Err(err) => {
            tracing::warn!(hook, error = %err, "storage engine backup hook failed");
        }
    }
}
