//! Table cache effect.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::TableError;

/// Which open tables a flush covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlushScope {
    /// Non-transactional tables, statistics and log tables excluded.
    NonTransactional,
    /// System, statistics and log tables.
    SystemAndLog,
}

impl fmt::Display for FlushScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlushScope::NonTransactional => f.write_str("non-transactional"),
            FlushScope::SystemAndLog => f.write_str("system and log"),
        }
    }
}

/// Table cache maintenance the backup protocol triggers.
#[async_trait]
pub trait TableCacheEffects: Send + Sync {
    /// Evict unused table shares and closed-table entries.
    async fn purge_unused_tables(&self) -> Result<(), TableError>;

    /// Flush and close the open tables in `scope`, marking them consistent on disk.
    async fn flush_tables(&self, scope: FlushScope) -> Result<(), TableError>;
}
