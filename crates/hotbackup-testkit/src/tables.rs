//! Scripted table cache for testing

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use hotbackup_core::effects::{FlushScope, TableCacheEffects};
use hotbackup_core::TableError;
use parking_lot::Mutex;

#[derive(Debug, Default)]
struct TableState {
    purges: usize,
    flushes: HashMap<FlushScope, usize>,
    purge_failures: VecDeque<TableError>,
    flush_failures: HashMap<FlushScope, VecDeque<TableError>>,
}

/// Table cache whose failures are scripted per call.
///
/// Every call succeeds unless a failure was queued for it. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct ScriptedTableCache {
    state: Arc<Mutex<TableState>>,
}

impl ScriptedTableCache {
    /// Table cache where everything succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next flush of `scope` without raising a session error.
    pub fn fail_next_flush(&self, scope: FlushScope, message: impl Into<String>) {
        self.queue_flush_failure(
            scope,
            TableError::FlushFailed {
                scope: scope.to_string(),
                message: message.into(),
            },
        );
    }

    /// Fail the next flush of `scope` and raise a session error.
    pub fn fail_next_flush_with_session_error(&self, scope: FlushScope, message: impl Into<String>) {
        self.queue_flush_failure(
            scope,
            TableError::SessionError {
                message: message.into(),
            },
        );
    }

    /// Fail the next purge.
    pub fn fail_next_purge(&self, message: impl Into<String>) {
        self.state
            .lock()
            .purge_failures
            .push_back(TableError::FlushFailed {
                scope: "unused".to_string(),
                message: message.into(),
            });
    }

    /// Number of purge calls.
    pub fn purge_calls(&self) -> usize {
        self.state.lock().purges
    }

    /// Number of flush calls for `scope`.
    pub fn flush_calls(&self, scope: FlushScope) -> usize {
        self.state.lock().flushes.get(&scope).copied().unwrap_or(0)
    }

    fn queue_flush_failure(&self, scope: FlushScope, error: TableError) {
        self.state
            .lock()
            .flush_failures
            .entry(scope)
            .or_default()
            .push_back(error);
    }
}

#[async_trait]
impl TableCacheEffects for ScriptedTableCache {
    async fn purge_unused_tables(&self) -> Result<(), TableError> {
        let mut state = self.state.lock();
        state.purges += 1;
        state.purge_failures.pop_front().map_or(Ok(()), Err)
    }

    async fn flush_tables(&self, scope: FlushScope) -> Result<(), TableError> {
        let mut state = self.state.lock();
        *state.flushes.entry(scope).or_insert(0) += 1;
        match state.flush_failures.get_mut(&scope).and_then(VecDeque::pop_front) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}
