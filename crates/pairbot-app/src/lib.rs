//! pairbot-app - Session orchestration for pairbot
//!
//! This crate owns the per-run lifecycle state machine, the Engine that drives
//! the worker and its channel, configuration loading, review rendering, the
//! display surface, chat participants and the save observer.

pub mod chat;
pub mod config;
pub mod engine;
pub mod engine_event;
pub mod message;
pub mod render;
pub mod session;
pub mod signals;
pub mod surface;
pub mod watcher;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_utils;

// Re-export primary types
pub use chat::{parse_chat_line, ChatRequest, Participant};
pub use engine::Engine;
pub use engine_event::EngineEvent;
pub use message::Message;
pub use session::{Phase, RunId, Session};
pub use surface::{HtmlFileHost, NotificationSurface, SurfaceHost, SurfaceId, Visibility};

// Re-export worker types used by runners
pub use pairbot_worker::{ChannelState, OutputLog, WorkerState};
