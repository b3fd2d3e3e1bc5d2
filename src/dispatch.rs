//! Request dispatch
//!
//! Maps each decoded message to exactly one [`Response`]. Dispatch never
//! fails: validation problems become error replies and converter problems
//! are already folded into outcomes by the [`Converter`].

use crate::converter::Converter;
use crate::frame::Message;
use crate::message::{Request, Response};

/// Routes requests to the converter. Holds no per-request state.
#[derive(Debug)]
pub struct Dispatcher<C: Converter> {
    converter: C,
}

impl<C: Converter> Dispatcher<C> {
    pub fn new(converter: C) -> Self {
        Self { converter }
    }

    pub fn converter(&self) -> &C {
        &self.converter
    }

    /// Validate a decoded message and handle it.
    pub fn dispatch(&self, message: &Message) -> Response {
        match Request::from_message(message) {
            Ok(request) => self.handle(request),
            Err(e) => {
                tracing::warn!(
                    action = ?message.get("action"),
                    error = %e,
                    "Rejected request"
                );
                Response::from(e)
            }
        }
    }

    /// Handle an already validated request.
    pub fn handle(&self, request: Request) -> Response {
        tracing::info!(action = request.action(), "Handling action");

        match request {
            Request::Ping => Response::Pong,
            Request::CheckFfmpeg => Response::FfmpegStatus(self.converter.probe()),
            Request::Convert {
                input_path,
                output_path,
            } => Response::ConvertResult(
                self.converter.convert(&input_path, output_path.as_deref()),
            ),
        }
    }
}
