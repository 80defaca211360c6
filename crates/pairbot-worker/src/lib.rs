//! # pairbot-worker - Worker Process and Channel Management
//!
//! Launches the review worker, watches its output for the readiness marker,
//! and bridges its WebSocket channel and HTTP question endpoint.
//!
//! Depends on [`pairbot_core`] for domain types and error handling.
//!
//! ## Public API
//!
//! ### Process Supervision
//! - [`WorkerProcess`] - Spawn, observe and stop the worker child process
//! - [`LaunchSpec`] - Resolved executable, arguments and working directory
//! - [`ReadinessLatch`] - One-shot readiness detection on stderr lines
//! - [`OutputLog`] - Durable log of every worker output line
//!
//! ### Channel
//! - [`ChannelBridge`] - Duplex WebSocket channel with open/message/error/close events
//! - [`decode_frame()`] - Decode a `{ filename, comment }` frame
//!
//! ### Questions
//! - [`AskClient`] - POST a question to the worker and read the answer

pub mod ask;
pub mod bridge;
pub mod output_log;
pub mod process;
pub mod protocol;
pub mod readiness;

pub use ask::{AskClient, AskRequest, AskResponse, DEFAULT_ASK_URL};
pub use bridge::{ChannelBridge, ChannelState};
pub use output_log::OutputLog;
pub use process::{LaunchSpec, WorkerProcess, WorkerState};
pub use protocol::{decode_frame, DEFAULT_CHANNEL_URL};
pub use readiness::{ReadinessLatch, DEFAULT_READINESS_MARKER};
