//! Channel frame decoding

use pairbot_core::prelude::*;
use pairbot_core::InboundMessage;

/// Default address of the worker's duplex channel
pub const DEFAULT_CHANNEL_URL: &str = "ws://127.0.0.1:8000/ws";

/// Decode one text frame into an [`InboundMessage`].
///
/// Both fields must be present and be strings; unknown fields are ignored.
pub fn decode_frame(raw: &str) -> Result<InboundMessage> {
    serde_json::from_str::<InboundMessage>(raw.trim()).map_err(|e| Error::malformed(e.to_string()))
}

/// Shorten a raw frame for logging
pub fn preview(raw: &str) -> &str {
    match raw.char_indices().nth(120) {
        Some((idx, _)) => &raw[..idx],
        None => raw,
    }
}
