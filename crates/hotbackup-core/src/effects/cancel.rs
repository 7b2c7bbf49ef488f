//! Cooperative cancellation.
//!
//! A session's administrative kill is modeled as a [`CancellationToken`].
//! Every suspension point of the backup protocol (waiting for the backup slot,
//! every lock acquire/upgrade) races its wait against `cancelled()`.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;

/// Cooperative cancellation token.
#[async_trait]
pub trait CancellationToken: Send + Sync {
    /// Resolves when cancellation is requested.
    async fn cancelled(&self);

    /// Non-blocking cancellation check. Must agree with `cancelled()`: the
    /// backup slot is handed out without waiting when this returns `false`.
    fn is_cancelled(&self) -> bool;
}

/// Cancellation token that never triggers.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverCancel;

#[async_trait]
impl CancellationToken for NeverCancel {
    async fn cancelled(&self) {
        futures::future::pending::<()>().await;
    }

    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Kill switch for one session.
///
/// Tokens handed out by [`CancellationSource::token`] observe the switch; once
/// cancelled, a source stays cancelled.
#[derive(Debug)]
pub struct CancellationSource {
    cancel_tx: watch::Sender<bool>,
}

impl CancellationSource {
    /// New, not yet cancelled source.
    pub fn new() -> Self {
        let (cancel_tx, _cancel_rx) = watch::channel(false);
        Self { cancel_tx }
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancel_tx.send_replace(true);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        *self.cancel_tx.borrow()
    }

    /// A token observing this source.
    pub fn token(&self) -> Arc<dyn CancellationToken> {
        Arc::new(WatchCancellationToken {
            cancel_rx: self.cancel_tx.subscribe(),
        })
    }
}

impl Default for CancellationSource {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
struct WatchCancellationToken {
    cancel_rx: watch::Receiver<bool>,
}

#[async_trait]
impl CancellationToken for WatchCancellationToken {
    async fn cancelled(&self) {
        let mut cancel_rx = self.cancel_rx.clone();
        loop {
            if *cancel_rx.borrow_and_update() {
                return;
            }
            if cancel_rx.changed().await.is_err() {
                // Source dropped without cancelling; it never will.
                futures::future::pending::<()>().await;
            }
        }
    }

    fn is_cancelled(&self) -> bool {
        *self.cancel_rx.borrow()
    }
}
