//! Hotbackup Testing Infrastructure
//!
//! Stateful in-memory implementations of the collaborator effect traits the
//! backup stage protocol drives, with fault injection and call accounting.
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! hotbackup-testkit = { path = "../hotbackup-testkit" }
//! ```
//!
//! ```rust,no_run
//! use hotbackup_testkit::*;
//!
//! let locks = InMemoryLockManager::new();
//! let tables = ScriptedTableCache::new();
//! let engine = RecordingStorageEngine::new("InnoDB");
//! ```

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

pub mod engines;
pub mod fixtures;
pub mod lock_manager;
pub mod tables;

pub use engines::RecordingStorageEngine;
pub use fixtures::{init_test_tracing, test_config};
pub use lock_manager::{InMemoryLockManager, LockEvent};
pub use tables::ScriptedTableCache;
