//! Logging initialisation is safe to repeat.

#[test]
fn cli_logging_installs_at_most_once() {
    relaybot::logging::init_cli();
    assert!(!relaybot::logging::init_cli());
    tracing::info!(test = "logging", "still logging");
}

#[test]
fn production_logging_creates_the_log_directory() {
    let dir = tempfile::tempdir().expect("tempdir");
    let logs = dir.path().join("logs");
    // A subscriber may already be installed by the other test; the directory
    // is created either way.
    let _guard = relaybot::logging::init_production(&logs);
    assert!(logs.is_dir());
}
