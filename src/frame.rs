//! Frame Codec - length-prefixed JSON messages
//!
//! Every message exchanged with the browser is a single frame:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  4 bytes: u32 length, native byte order                 │
//! ├─────────────────────────────────────────────────────────┤
//! │  N bytes: UTF-8 encoded JSON object                     │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! The browser writes the prefix in the host's native byte order, so the codec
//! uses `to_ne_bytes`/`from_ne_bytes`. Switching to a fixed order would break
//! the existing extension on big-endian hosts.
//!
//! The codec is pure: it only works on the buffers it is handed. Stream
//! handling lives in [`crate::io`].

use serde::Serialize;
use serde_json::{Map, Value};
use std::io;

/// A decoded message body: always a JSON object.
pub type Message = Map<String, Value>;

/// Size of the length prefix in bytes
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Largest body accepted from the browser (64 MiB, the browser's own cap)
pub const DEFAULT_MAX_INCOMING: usize = 64 * 1024 * 1024;

/// Largest body the browser accepts from a host (1 MiB)
pub const DEFAULT_MAX_OUTGOING: usize = 1024 * 1024;

/// Size limits enforced by the codec in each direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Maximum body size read from the browser
    pub max_incoming: usize,
    /// Maximum body size written to the browser
    pub max_outgoing: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_incoming: DEFAULT_MAX_INCOMING,
            max_outgoing: DEFAULT_MAX_OUTGOING,
        }
    }
}

/// Errors produced while encoding, decoding or moving frames
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON encoding error: {0}")]
    Encode(String),

    #[error("JSON decoding error: {0}")]
    Decode(String),

    #[error("Framing error: {0}")]
    Framing(String),

    #[error("Frame too large: {size} bytes (max {max})")]
    TooLarge { size: usize, max: usize },

    #[error("Unexpected end of stream")]
    UnexpectedEof,
}

/// Encode a message as a complete frame (prefix followed by body).
pub fn encode<T: Serialize + ?Sized>(message: &T, limits: &Limits) -> Result<Vec<u8>, FrameError> {
    let body = serde_json::to_vec(message).map_err(|e| FrameError::Encode(e.to_string()))?;

    if body.len() > limits.max_outgoing {
        return Err(FrameError::TooLarge {
            size: body.len(),
            max: limits.max_outgoing,
        });
    }

    let len = u32::try_from(body.len()).map_err(|_| FrameError::TooLarge {
        size: body.len(),
        max: u32::MAX as usize,
    })?;

    let mut frame = Vec::with_capacity(LENGTH_PREFIX_SIZE + body.len());
    frame.extend_from_slice(&len.to_ne_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Decode the 4-byte length prefix at the start of `bytes`.
pub fn decode_length(bytes: &[u8]) -> Result<u32, FrameError> {
    let prefix: [u8; LENGTH_PREFIX_SIZE] = bytes
        .get(..LENGTH_PREFIX_SIZE)
        .and_then(|p| p.try_into().ok())
        .ok_or_else(|| {
            FrameError::Framing(format!(
                "length prefix needs {} bytes, got {}",
                LENGTH_PREFIX_SIZE,
                bytes.len()
            ))
        })?;
    Ok(u32::from_ne_bytes(prefix))
}

/// Decode exactly `length` bytes of `bytes` as a JSON object.
pub fn decode_body(bytes: &[u8], length: u32) -> Result<Message, FrameError> {
    let length = length as usize;
    let body = bytes.get(..length).ok_or(FrameError::UnexpectedEof)?;

    let text = std::str::from_utf8(body)
        .map_err(|e| FrameError::Decode(format!("invalid UTF-8: {}", e)))?;

    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(FrameError::Decode(format!(
            "expected a JSON object, got {}",
            value_kind(&other)
        ))),
        Err(e) => Err(FrameError::Decode(e.to_string())),
    }
}

/// Decode one complete frame. Trailing bytes after the body are rejected.
pub fn decode(frame: &[u8]) -> Result<Message, FrameError> {
    let length = decode_length(frame)?;
    let rest = &frame[LENGTH_PREFIX_SIZE..];
    if rest.len() > length as usize {
        return Err(FrameError::Framing(format!(
            "{} trailing bytes after {} byte body",
            rest.len() - length as usize,
            length
        )));
    }
    decode_body(rest, length)
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
