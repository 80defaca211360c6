//! Message types processed by the [`Engine`](crate::Engine)

use std::path::PathBuf;

use pairbot_core::{ChannelEvent, WorkerEvent};

use crate::chat::ChatRequest;
use crate::session::RunId;
use crate::surface::SurfaceId;

/// All possible inputs to the engine
#[derive(Debug, Clone)]
pub enum Message {
    // ─────────────────────────────────────────────────────────
    // Host commands
    // ─────────────────────────────────────────────────────────
    /// Manual start command
    Start,

    /// Explicit stop; the only way out of `Disconnected`
    Stop,

    /// Deactivate (stdin `quit`, SIGINT, SIGTERM)
    Quit,

    /// The user closed the display surface
    CloseSurface,

    /// A host reports that a surface went away
    SurfaceDisposed { id: SurfaceId },

    /// A chat participant was addressed
    Chat(ChatRequest),

    // ─────────────────────────────────────────────────────────
    // Run events, tagged with the run that produced them
    // ─────────────────────────────────────────────────────────
    Worker { run: RunId, event: WorkerEvent },

    Channel { run: RunId, event: ChannelEvent },

    // ─────────────────────────────────────────────────────────
    // Save observer
    // ─────────────────────────────────────────────────────────
    DocumentSaved { path: PathBuf },

    WatcherError { message: String },

    // ─────────────────────────────────────────────────────────
    // Background request results
    // ─────────────────────────────────────────────────────────
    AskCompleted {
        question: String,
        result: Result<String, String>,
    },
}
