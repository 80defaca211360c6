//! E2E Integration Tests for pairbot
//!
//! Run with: cargo test --test e2e

// Test submodules
mod e2e {
    pub mod mock_worker;
    mod review_flow;
}

use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::broadcast;

use pairbot_app::config::Settings;
use pairbot_app::test_utils::RecordingHost;
use pairbot_app::{Engine, EngineEvent, OutputLog};

// ─────────────────────────────────────────────────────────
// Test Harness
// ─────────────────────────────────────────────────────────

/// An engine wired to a scratch workspace and a recording surface host
pub struct Harness {
    pub workspace: TempDir,
    pub engine: Engine,
    pub events: broadcast::Receiver<EngineEvent>,
    pub host: RecordingHost,
}

impl Harness {
    /// Engine whose worker runs the mock script under `/bin/sh` and whose
    /// channel connects to `channel_url`
    pub fn new(channel_url: &str) -> Self {
        let workspace = tempfile::tempdir().expect("tempdir");
        let script = e2e::mock_worker::write_worker_script(workspace.path());

        let mut settings = Settings::default();
        settings.worker.python_path = "/bin/sh".to_string();
        settings.worker.server_path = script;
        settings.channel.url = channel_url.to_string();
        settings.watcher.enabled = false;

        let host = RecordingHost::new();
        let mut engine = Engine::with_settings(
            workspace.path().to_path_buf(),
            settings,
            Box::new(host.clone()),
        );
        engine.set_output_log(OutputLog::disabled());
        let events = engine.subscribe();

        Self {
            workspace,
            engine,
            events,
            host,
        }
    }

    /// Process messages until an event matching `done` is emitted.
    /// Returns every event seen on the way, including the matching one.
    pub async fn pump_until(&mut self, done: impl Fn(&EngineEvent) -> bool) -> Vec<EngineEvent> {
        let mut seen = Vec::new();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        loop {
            while let Ok(event) = self.events.try_recv() {
                let finished = done(&event);
                seen.push(event);
                if finished {
                    return seen;
                }
            }
            match tokio::time::timeout_at(deadline, self.engine.msg_rx.recv()).await {
                Ok(Some(msg)) => self.engine.process_message(msg).await,
                Ok(None) => panic!("message channel closed"),
                Err(_) => panic!("timed out; events so far: {:?}", seen),
            }
        }
    }

    /// Events already emitted and not yet consumed
    pub fn drain(&mut self) -> Vec<EngineEvent> {
        let mut seen = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            seen.push(event);
        }
        seen
    }
}

pub fn count(events: &[EngineEvent], pred: impl Fn(&EngineEvent) -> bool) -> usize {
    events.iter().filter(|e| pred(e)).count()
}
