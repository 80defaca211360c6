//! Domain events emitted by the Engine for external consumers
//!
//! Events are broadcast while each message is processed; subscribe with
//! `Engine::subscribe()`. The headless runner turns every event into one
//! NDJSON line.

use std::path::PathBuf;

use pairbot_core::OutputStream;

use crate::session::{Phase, RunId};
use crate::surface::SurfaceId;

/// Domain events emitted by the Engine
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    // ─────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────
    PhaseChanged {
        old_phase: Phase,
        new_phase: Phase,
    },

    /// The worker process was spawned
    WorkerStarted {
        run: RunId,
        pid: Option<u32>,
        command: String,
    },

    /// One line of worker output
    WorkerOutput { stream: OutputStream, line: String },

    /// The readiness marker was seen; a channel open follows
    WorkerReady { run: RunId },

    WorkerExited { run: RunId, code: Option<i32> },

    // ─────────────────────────────────────────────────────────
    // Channel
    // ─────────────────────────────────────────────────────────
    ChannelOpened { address: String },

    /// A review frame was decoded and rendered
    Review {
        filename: String,
        comment: String,
        markdown: String,
    },

    /// A frame could not be decoded; the channel stays open
    MalformedFrame { reason: String, raw: String },

    ChannelError { message: String },

    ChannelClosed { reason: Option<String> },

    // ─────────────────────────────────────────────────────────
    // Display surface
    // ─────────────────────────────────────────────────────────
    /// A new surface was created (a reveal of the live one is not reported)
    SurfaceShown { id: SurfaceId },

    SurfaceDisposed { id: SurfaceId },

    // ─────────────────────────────────────────────────────────
    // Host collaborators
    // ─────────────────────────────────────────────────────────
    DocumentSaved { path: PathBuf },

    /// Answer from the `@superduper` participant, as markdown
    Answer { question: String, answer: String },

    Error { message: String, fatal: bool },

    /// Engine is shutting down
    Shutdown,
}

impl EngineEvent {
    /// Returns a short string label for this event type (for logging/debugging).
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::PhaseChanged { .. } => "phase_changed",
            Self::WorkerStarted { .. } => "worker_started",
            Self::WorkerOutput { .. } => "worker_output",
            Self::WorkerReady { .. } => "worker_ready",
            Self::WorkerExited { .. } => "worker_exited",
            Self::ChannelOpened { .. } => "channel_opened",
            Self::Review { .. } => "review",
            Self::MalformedFrame { .. } => "malformed_frame",
            Self::ChannelError { .. } => "channel_error",
            Self::ChannelClosed { .. } => "channel_closed",
            Self::SurfaceShown { .. } => "surface_shown",
            Self::SurfaceDisposed { .. } => "surface_disposed",
            Self::DocumentSaved { .. } => "document_saved",
            Self::Answer { .. } => "answer",
            Self::Error { .. } => "error",
            Self::Shutdown => "shutdown",
        }
    }

    pub fn error(err: &pairbot_core::Error) -> Self {
        Self::Error {
            message: err.to_string(),
            fatal: err.is_fatal(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_event_type_labels() {
        assert_eq!(EngineEvent::Shutdown.event_type(), "shutdown");
        assert_eq!(
            EngineEvent::PhaseChanged {
                old_phase: Phase::Idle,
                new_phase: Phase::Launching,
            }
            .event_type(),
            "phase_changed"
        );
        assert_eq!(
            EngineEvent::DocumentSaved {
                path: PathBuf::from("a.py"),
            }
            .event_type(),
            "document_saved"
        );
        assert_eq!(
            EngineEvent::MalformedFrame {
                reason: "x".into(),
                raw: "y".into(),
            }
            .event_type(),
            "malformed_frame"
        );
    }

    #[test]
    fn test_error_event_carries_fatality() {
        let event = EngineEvent::error(&pairbot_core::Error::config("no workspace"));
        assert_eq!(
            event,
            EngineEvent::Error {
                message: "Configuration error: no workspace".to_string(),
                fatal: true,
            }
        );

        let event = EngineEvent::error(&pairbot_core::Error::channel("reset"));
        assert!(matches!(event, EngineEvent::Error { fatal: false, .. }));
    }
}
