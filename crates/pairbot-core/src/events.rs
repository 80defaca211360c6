//! Domain event definitions

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────
// Worker Events
// ─────────────────────────────────────────────────────────

/// Which pipe of the worker a line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl OutputStream {
    /// Prefix used in the worker output log
    pub fn tag(&self) -> &'static str {
        match self {
            OutputStream::Stdout => "[stdout]",
            OutputStream::Stderr => "[stderr]",
        }
    }
}

/// Events produced by a supervised worker process
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    /// A line from the worker's stdout
    Stdout(String),
    /// A line from the worker's stderr
    Stderr(String),
    /// The readiness marker was seen on stderr (at most once per run)
    Ready,
    /// The process terminated
    Exited { code: Option<i32> },
}

impl WorkerEvent {
    /// The stream and text of an output line, if this is one
    pub fn output_line(&self) -> Option<(OutputStream, &str)> {
        match self {
            WorkerEvent::Stdout(line) => Some((OutputStream::Stdout, line)),
            WorkerEvent::Stderr(line) => Some((OutputStream::Stderr, line)),
            _ => None,
        }
    }
}

// ─────────────────────────────────────────────────────────
// Channel Events
// ─────────────────────────────────────────────────────────

/// A review comment pushed by the worker over the channel
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct InboundMessage {
    pub filename: String,
    pub comment: String,
}

/// Transitions and payloads reported by a channel bridge
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// The connection was established
    Opened,
    /// A well-formed frame arrived
    Message(InboundMessage),
    /// A frame could not be decoded; the channel stays open
    Malformed { raw: String, reason: String },
    /// Transport-level failure
    Error(String),
    /// The channel reached its terminal state
    Closed { reason: Option<String> },
}
