//! JSON codec for sink events.
//!
//! Events are encoded one per line (JSON Lines) when written to a stream.

use crate::messages::SinkEvent;
use thiserror::Error;

/// Errors that can occur during event encoding/decoding.
#[derive(Debug, Error)]
pub enum CodecError {
    /// JSON (de)serialization failed.
    #[error("Failed to (de)serialize event: {0}")]
    Json(#[from] serde_json::Error),

    /// Input was empty or whitespace only.
    #[error("Empty event")]
    Empty,
}

/// Encode an event to a single-line JSON string.
pub fn encode_event(event: &SinkEvent) -> Result<String, CodecError> {
    serde_json::to_string(event).map_err(CodecError::from)
}

/// Decode an event from a JSON string.
pub fn decode_event(text: &str) -> Result<SinkEvent, CodecError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(CodecError::Empty);
    }
    serde_json::from_str(text).map_err(CodecError::from)
}

/// Decode a JSON Lines stream, skipping blank lines.
pub fn decode_events(text: &str) -> Result<Vec<SinkEvent>, CodecError> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(decode_event)
        .collect()
}
