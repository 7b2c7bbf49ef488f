//! Recording storage engine for testing

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use hotbackup_core::effects::StorageEngineEffects;
use hotbackup_core::EngineError;

#[derive(Debug, Clone, PartialEq, Eq)]
enum HookBehavior {
    Succeed,
    Unsupported,
    Fail(String),
}

#[derive(Debug, Default)]
struct Calls {
    prepare: AtomicUsize,
    end: AtomicUsize,
}

/// Storage engine that counts its backup hook invocations.
///
/// Clones share their counters.
#[derive(Debug, Clone)]
pub struct RecordingStorageEngine {
    name: String,
    behavior: HookBehavior,
    calls: Arc<Calls>,
}

impl RecordingStorageEngine {
    /// Engine whose hooks succeed.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_behavior(name, HookBehavior::Succeed)
    }

    /// Engine without backup hooks.
    pub fn unsupported(name: impl Into<String>) -> Self {
        Self::with_behavior(name, HookBehavior::Unsupported)
    }

    /// Engine whose hooks fail with `message`.
    pub fn failing(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_behavior(name, HookBehavior::Fail(message.into()))
    }

    fn with_behavior(name: impl Into<String>, behavior: HookBehavior) -> Self {
        Self {
            name: name.into(),
            behavior,
            calls: Arc::new(Calls::default()),
        }
    }

    /// Number of `prepare_for_backup` calls.
    pub fn prepare_calls(&self) -> usize {
        self.calls.prepare.load(Ordering::SeqCst)
    }

    /// Number of `end_backup` calls.
    pub fn end_calls(&self) -> usize {
        self.calls.end.load(Ordering::SeqCst)
    }

    fn outcome(&self) -> Result<(), EngineError> {
        match &self.behavior {
            HookBehavior::Succeed => Ok(()),
            HookBehavior::Unsupported => Err(EngineError::Unsupported {
                engine: self.name.clone(),
            }),
            HookBehavior::Fail(message) => Err(EngineError::Failed {
                engine: self.name.clone(),
                message: message.clone(),
            }),
        }
    }
}

#[async_trait]
impl StorageEngineEffects for RecordingStorageEngine {
    fn name(&self) -> &str {
        &self.name
    }

    async fn prepare_for_backup(&self) -> Result<(), EngineError> {
        self.calls.prepare.fetch_add(1, Ordering::SeqCst);
        self.outcome()
    }

    async fn end_backup(&self) -> Result<(), EngineError> {
        self.calls.end.fetch_add(1, Ordering::SeqCst);
        self.outcome()
    }
}
