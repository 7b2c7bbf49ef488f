//! Storage engine backup hooks.

use async_trait::async_trait;

use crate::errors::EngineError;

/// Per-engine hooks invoked once per backup lifecycle.
///
/// Engines without backup support return [`EngineError::Unsupported`]; the
/// protocol treats that as success.
#[async_trait]
pub trait StorageEngineEffects: Send + Sync {
    /// Engine name, for diagnostics.
    fn name(&self) -> &str;

    /// Called once the backup slot is held. A checkpoint opportunity that
    /// shortens recovery of the copied files.
    async fn prepare_for_backup(&self) -> Result<(), EngineError> {
        Err(EngineError::Unsupported {
            engine: self.name().to_string(),
        })
    }

    /// Called when the backup ends, successfully or not.
    async fn end_backup(&self) -> Result<(), EngineError> {
        Err(EngineError::Unsupported {
            engine: self.name().to_string(),
        })
    }
}
