//! Request and response types
//!
//! Requests arrive as free-form JSON objects and are validated into a
//! [`Request`] right after decoding. Responses are a closed [`Response`] type
//! whose serializer writes exactly the wire shapes the extension expects:
//!
//! | action          | fields                                                       |
//! |-----------------|--------------------------------------------------------------|
//! | `pong`          | `message`, `version`                                         |
//! | `ffmpeg_status` | `available`, then `version` or `error`                       |
//! | `convert_result`| `success`, then `output_path`, `input_path`, `deleted_original`, `message` or `error` |
//! | (none)          | `error`                                                      |

use crate::frame::Message;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Version reported in `pong` replies
pub const HOST_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Text of the `pong` reply
pub const PONG_MESSAGE: &str = "Native host is responding";

/// Text attached to a successful conversion
pub const CONVERTED_MESSAGE: &str = "Conversion completed successfully";

/// A validated request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Liveness check
    Ping,
    /// Probe for the external converter
    CheckFfmpeg,
    /// Convert `input_path`, optionally into `output_path`
    Convert {
        input_path: PathBuf,
        output_path: Option<PathBuf>,
    },
}

/// Reasons a decoded message is not a usable request
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error("Invalid message")]
    Empty,

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("Missing input_path parameter")]
    MissingInputPath,
}

impl Request {
    /// Validate a decoded message. Unknown fields are ignored.
    pub fn from_message(message: &Message) -> Result<Self, RequestError> {
        if message.is_empty() {
            return Err(RequestError::Empty);
        }

        let action = match message.get("action") {
            Some(Value::String(action)) => action.as_str(),
            Some(other) => return Err(RequestError::UnknownAction(other.to_string())),
            None => return Err(RequestError::UnknownAction("<missing>".to_string())),
        };

        match action {
            "ping" => Ok(Request::Ping),
            "check_ffmpeg" => Ok(Request::CheckFfmpeg),
            "convert" => {
                let input_path =
                    non_empty_str(message, "input_path").ok_or(RequestError::MissingInputPath)?;
                Ok(Request::Convert {
                    input_path: PathBuf::from(input_path),
                    output_path: non_empty_str(message, "output_path").map(PathBuf::from),
                })
            }
            other => Err(RequestError::UnknownAction(other.to_string())),
        }
    }

    /// Wire name of the action
    pub fn action(&self) -> &'static str {
        match self {
            Request::Ping => "ping",
            Request::CheckFfmpeg => "check_ffmpeg",
            Request::Convert { .. } => "convert",
        }
    }
}

fn non_empty_str<'a>(message: &'a Message, key: &str) -> Option<&'a str> {
    match message.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.as_str()),
        _ => None,
    }
}

/// Result of probing the external converter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolStatus {
    Available { version: String },
    Unavailable { error: String },
}

impl ToolStatus {
    fn write_fields<M: SerializeMap>(&self, map: &mut M) -> Result<(), M::Error> {
        match self {
            ToolStatus::Available { version } => {
                map.serialize_entry("available", &true)?;
                map.serialize_entry("version", version)
            }
            ToolStatus::Unavailable { error } => {
                map.serialize_entry("available", &false)?;
                map.serialize_entry("error", error)
            }
        }
    }
}

/// Result of one conversion attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionOutcome {
    Converted {
        output_path: PathBuf,
        input_path: PathBuf,
        /// False when the source could not be removed after converting
        deleted_original: bool,
    },
    Failed {
        error: String,
    },
}

impl ConversionOutcome {
    pub fn failed(error: impl Into<String>) -> Self {
        ConversionOutcome::Failed {
            error: error.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ConversionOutcome::Converted { .. })
    }

    /// Error text of a failed conversion
    pub fn error(&self) -> Option<&str> {
        match self {
            ConversionOutcome::Failed { error } => Some(error),
            ConversionOutcome::Converted { .. } => None,
        }
    }

    /// Destination of a successful conversion
    pub fn output_path(&self) -> Option<&Path> {
        match self {
            ConversionOutcome::Converted { output_path, .. } => Some(output_path),
            ConversionOutcome::Failed { .. } => None,
        }
    }

    fn write_fields<M: SerializeMap>(&self, map: &mut M) -> Result<(), M::Error> {
        match self {
            ConversionOutcome::Converted {
                output_path,
                input_path,
                deleted_original,
            } => {
                map.serialize_entry("success", &true)?;
                map.serialize_entry("output_path", &output_path.to_string_lossy())?;
                map.serialize_entry("input_path", &input_path.to_string_lossy())?;
                map.serialize_entry("deleted_original", deleted_original)?;
                map.serialize_entry("message", CONVERTED_MESSAGE)
            }
            ConversionOutcome::Failed { error } => {
                map.serialize_entry("success", &false)?;
                map.serialize_entry("error", error)
            }
        }
    }
}

/// A reply to exactly one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Pong,
    FfmpegStatus(ToolStatus),
    ConvertResult(ConversionOutcome),
    /// Untagged error reply for messages that name no usable action
    Error { error: String },
}

impl Response {
    pub fn error(error: impl Into<String>) -> Self {
        Response::Error {
            error: error.into(),
        }
    }

    /// Wire tag of the reply, if any
    pub fn action(&self) -> Option<&'static str> {
        match self {
            Response::Pong => Some("pong"),
            Response::FfmpegStatus(_) => Some("ffmpeg_status"),
            Response::ConvertResult(_) => Some("convert_result"),
            Response::Error { .. } => None,
        }
    }
}

impl From<RequestError> for Response {
    fn from(err: RequestError) -> Self {
        match err {
            RequestError::MissingInputPath => {
                Response::ConvertResult(ConversionOutcome::failed(err.to_string()))
            }
            RequestError::Empty | RequestError::UnknownAction(_) => Response::error(err.to_string()),
        }
    }
}

impl Serialize for Response {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        if let Some(action) = self.action() {
            map.serialize_entry("action", action)?;
        }
        match self {
            Response::Pong => {
                map.serialize_entry("message", PONG_MESSAGE)?;
                map.serialize_entry("version", HOST_VERSION)?;
            }
            Response::FfmpegStatus(status) => status.write_fields(&mut map)?,
            Response::ConvertResult(outcome) => outcome.write_fields(&mut map)?,
            Response::Error { error } => map.serialize_entry("error", error)?,
        }
        map.end()
    }
}
