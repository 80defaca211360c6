//! # pairbot-core - Core Domain Types
//!
//! Foundation crate for pairbot. Provides the error taxonomy, the events
//! exchanged between the worker supervisor, the channel bridge and the
//! application layer, and logging setup.
//!
//! This crate has **zero internal dependencies**.
//!
//! ## Public API
//!
//! ### Events (`events`)
//! - [`WorkerEvent`] - stdout/stderr lines, readiness and exit of the worker
//! - [`ChannelEvent`] - open/message/malformed/error/close transitions of the channel
//! - [`InboundMessage`] - decoded `{ filename, comment }` review frame
//!
//! ### Error Handling (`error`)
//! - [`Error`] - Custom error enum with `fatal` vs `recoverable` classification
//! - [`Result`] - Type alias for `std::result::Result<T, Error>`
//! - [`ResultExt`] - Extension trait for adding error context
//!
//! ## Prelude
//!
//! ```rust
//! use pairbot_core::prelude::*;
//! ```

pub mod error;
pub mod events;
pub mod logging;

/// Prelude for common imports used throughout all pairbot crates
pub mod prelude {
    pub use super::error::{Error, Result, ResultExt};
    pub use tracing::{debug, error, info, instrument, trace, warn};
}

pub use error::{Error, Result, ResultExt};
pub use events::{ChannelEvent, InboundMessage, OutputStream, WorkerEvent};
