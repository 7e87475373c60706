use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use docuchat::backend::FakeBackend;
use docuchat::config::Config;
use docuchat::orchestrator::{SendOrchestrator, SendOutcome};
use docuchat::stream::StreamSession;
use tempfile::TempDir;

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

/// An orchestrator wired to a shared in-memory backend
#[allow(dead_code)]
pub fn fake_orchestrator() -> (Arc<FakeBackend>, SendOrchestrator) {
    let backend = Arc::new(FakeBackend::new());
    let orchestrator = SendOrchestrator::new(backend.clone(), &Config::default());
    (backend, orchestrator)
}

/// Unwraps a started session, panicking on any other outcome
#[allow(dead_code)]
pub fn started(outcome: SendOutcome) -> StreamSession {
    match outcome {
        SendOutcome::Started(session) => session,
        other => panic!("expected a started stream, got {:?}", other),
    }
}
