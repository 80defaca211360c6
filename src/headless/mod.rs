//! Headless mode - NDJSON event output
//!
//! pairbot has no editor of its own: the headless runner reads line commands
//! on stdin and mirrors every [`EngineEvent`] to stdout as one JSON object per
//! line. Scripts and editor integrations drive it this way.
//!
//! # Event Format
//!
//! Each event has an "event" field indicating its type, event-specific data
//! and a millisecond `timestamp`.
//!
//! # Example Output
//!
//! ```json
//! {"event":"phase_changed","old_phase":"idle","new_phase":"launching","timestamp":1704700001000}
//! {"event":"channel_opened","address":"ws://127.0.0.1:8000/ws","timestamp":1704700002000}
//! {"event":"review","filename":"a.py","comment":"looks good","markdown":"**a.py**\n\nlooks good","timestamp":1704700003000}
//! ```

pub mod runner;

use chrono::Utc;
use serde::Serialize;
use std::io::{self, Write};
use tracing::error;

use pairbot_app::{EngineEvent, Phase};
use pairbot_core::OutputStream;

/// Events emitted in headless mode
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HeadlessEvent {
    PhaseChanged {
        old_phase: Phase,
        new_phase: Phase,
        timestamp: i64,
    },

    WorkerStarted {
        run: String,
        pid: Option<u32>,
        command: String,
        timestamp: i64,
    },

    /// One line of worker stdout/stderr
    WorkerOutput {
        stream: OutputStream,
        line: String,
        timestamp: i64,
    },

    WorkerReady { run: String, timestamp: i64 },

    WorkerExited {
        run: String,
        code: Option<i32>,
        timestamp: i64,
    },

    ChannelOpened { address: String, timestamp: i64 },

    Review {
        filename: String,
        comment: String,
        markdown: String,
        timestamp: i64,
    },

    MalformedFrame {
        reason: String,
        raw: String,
        timestamp: i64,
    },

    ChannelError { message: String, timestamp: i64 },

    ChannelClosed {
        reason: Option<String>,
        timestamp: i64,
    },

    SurfaceShown { surface: String, timestamp: i64 },

    SurfaceDisposed { surface: String, timestamp: i64 },

    DocumentSaved { path: String, timestamp: i64 },

    /// Markdown answer from `@superduper`
    Answer {
        question: String,
        answer: String,
        timestamp: i64,
    },

    Error {
        message: String,
        fatal: bool,
        timestamp: i64,
    },

    Shutdown { timestamp: i64 },
}

impl HeadlessEvent {
    /// Emit this event to stdout as JSON
    pub fn emit(&self) {
        let json = match serde_json::to_string(self) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize headless event: {}", e);
                return;
            }
        };

        // NDJSON: one object per line
        let mut stdout = io::stdout().lock();
        if let Err(e) = writeln!(stdout, "{}", json) {
            error!("Failed to write headless event to stdout: {}", e);
            return;
        }

        // Consumers read line by line; don't leave events in the buffer
        if let Err(e) = stdout.flush() {
            error!("Failed to flush headless stdout: {}", e);
        }
    }

    /// Get current timestamp in milliseconds
    fn now() -> i64 {
        Utc::now().timestamp_millis()
    }

    pub fn error(message: String, fatal: bool) -> Self {
        Self::Error {
            message,
            fatal,
            timestamp: Self::now(),
        }
    }
}

impl From<&EngineEvent> for HeadlessEvent {
    fn from(event: &EngineEvent) -> Self {
        let timestamp = Self::now();
        match event.clone() {
            EngineEvent::PhaseChanged {
                old_phase,
                new_phase,
            } => Self::PhaseChanged {
                old_phase,
                new_phase,
                timestamp,
            },
            EngineEvent::WorkerStarted { run, pid, command } => Self::WorkerStarted {
                run: run.to_string(),
                pid,
                command,
                timestamp,
            },
            EngineEvent::WorkerOutput { stream, line } => Self::WorkerOutput {
                stream,
                line,
                timestamp,
            },
            EngineEvent::WorkerReady { run } => Self::WorkerReady {
                run: run.to_string(),
                timestamp,
            },
            EngineEvent::WorkerExited { run, code } => Self::WorkerExited {
                run: run.to_string(),
                code,
                timestamp,
            },
            EngineEvent::ChannelOpened { address } => Self::ChannelOpened { address, timestamp },
            EngineEvent::Review {
                filename,
                comment,
                markdown,
            } => Self::Review {
                filename,
                comment,
                markdown,
                timestamp,
            },
            EngineEvent::MalformedFrame { reason, raw } => Self::MalformedFrame {
                reason,
                raw,
                timestamp,
            },
            EngineEvent::ChannelError { message } => Self::ChannelError { message, timestamp },
            EngineEvent::ChannelClosed { reason } => Self::ChannelClosed { reason, timestamp },
            EngineEvent::SurfaceShown { id } => Self::SurfaceShown {
                surface: id.to_string(),
                timestamp,
            },
            EngineEvent::SurfaceDisposed { id } => Self::SurfaceDisposed {
                surface: id.to_string(),
                timestamp,
            },
            EngineEvent::DocumentSaved { path } => Self::DocumentSaved {
                path: path.display().to_string(),
                timestamp,
            },
            EngineEvent::Answer { question, answer } => Self::Answer {
                question,
                answer,
                timestamp,
            },
            EngineEvent::Error { message, fatal } => Self::Error {
                message,
                fatal,
                timestamp,
            },
            EngineEvent::Shutdown => Self::Shutdown { timestamp },
        }
    }
}
