//! Shared test fixtures

use hotbackup_core::BackupConfig;

/// Install a test tracing subscriber. Safe to call from every test.
///
/// Honors `RUST_LOG`; output goes through the test harness capture.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Configuration with timeouts short enough for tests.
pub fn test_config() -> BackupConfig {
    BackupConfig {
        lock_wait_timeout_secs: 5,
        start_wait_timeout_secs: Some(5),
        ..BackupConfig::default()
    }
}
