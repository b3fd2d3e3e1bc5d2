//! convert-host - Native messaging host for browser-side media conversion
//!
//! A browser extension launches the host and exchanges length-prefixed JSON
//! frames with it over stdin/stdout. The host answers three actions:
//!
//! - `ping` - liveness check
//! - `check_ffmpeg` - report whether the converter can be run
//! - `convert` - convert a recording to MP4 and remove the source on success
//!
//! Layers, leaf first:
//! - [`frame`]: length prefix + JSON body codec
//! - [`io`]: blocking frame reader/writer over byte streams
//! - [`message`]: validated requests and typed responses
//! - [`paths`]: output path derivation and `name (N).ext` disambiguation
//! - [`converter`]: supervised ffmpeg runs with a timeout
//! - [`dispatch`]: action routing
//! - [`interrupt`]: SIGINT/SIGTERM as a clean stop
//! - [`host`]: the serial request/response loop

pub mod config;
pub mod converter;
pub mod dispatch;
pub mod frame;
pub mod host;
pub mod interrupt;
pub mod io;
pub mod logging;
pub mod message;
pub mod paths;

#[cfg(test)]
mod testing;

pub use config::{ConverterConfig, HostConfig};
pub use converter::{Converter, FfmpegConverter};
pub use dispatch::Dispatcher;
pub use frame::{FrameError, Limits, Message};
pub use host::{HostRuntime, HostStats, RunSummary, StopReason};
pub use interrupt::Interrupt;
pub use io::{FrameReader, FrameWriter};
pub use message::{ConversionOutcome, Request, RequestError, Response, ToolStatus};
pub use paths::resolve_output_path;
