//! Host Runtime - the request/response loop
//!
//! The loop is strictly serial: read one frame, dispatch it, write one reply,
//! repeat. It stops when the browser closes stdin or when a frame cannot be
//! read or decoded. After a framing error the byte alignment of the channel
//! is unknown, so the host stops instead of trying to resynchronize and sends
//! nothing back.
//!
//! Frames are read on a separate thread so that an [`Interrupt`] can stop the
//! loop while it is waiting for input. The reader stays one frame ahead at
//! most.
//!
//! Every request gets a reply. One too large to send is replaced by a short
//! error reply; a reply that cannot be written at all is logged and dropped,
//! and the loop keeps serving the next request.

use crate::config::HostConfig;
use crate::converter::{Converter, FfmpegConverter};
use crate::dispatch::Dispatcher;
use crate::frame::{FrameError, Limits, Message};
use crate::interrupt::Interrupt;
use crate::io::{FrameReader, FrameWriter};
use crate::message::Response;
use crossbeam_channel::{bounded, select};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::thread;

/// Error text sent in place of a reply over the outgoing size limit
pub const RESPONSE_TOO_LARGE: &str = "Response too large";

/// Why the loop stopped
#[derive(Debug)]
pub enum StopReason {
    /// The peer closed the stream between frames
    EndOfStream,
    /// A frame could not be read or decoded
    ReadError(FrameError),
    /// The process was asked to stop
    Interrupted,
}

/// Counters reported when the loop stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostStats {
    /// Requests decoded and dispatched
    pub requests: u64,
    /// Replies replaced by an error because they exceeded the outgoing limit
    pub oversized_replies: u64,
    /// Replies that could not be written
    pub write_failures: u64,
}

/// Result of one run of the loop
#[derive(Debug)]
pub struct RunSummary {
    pub reason: StopReason,
    pub stats: HostStats,
}

/// Owns the dispatcher and drives it from a pair of byte streams
#[derive(Debug)]
pub struct HostRuntime<C: Converter> {
    dispatcher: Dispatcher<C>,
    limits: Limits,
    interrupt: Interrupt,
}

impl HostRuntime<FfmpegConverter> {
    /// Build a host that runs the configured ffmpeg and stops on `interrupt`
    pub fn from_config(config: HostConfig, interrupt: Interrupt) -> io::Result<Self> {
        let converter = FfmpegConverter::new(config.converter)?.with_interrupt(interrupt.clone());
        Ok(Self::new(converter, config.limits).with_interrupt(interrupt))
    }
}

impl<C: Converter> HostRuntime<C> {
    pub fn new(converter: C, limits: Limits) -> Self {
        Self {
            dispatcher: Dispatcher::new(converter),
            limits,
            interrupt: Interrupt::default(),
        }
    }

    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn dispatcher(&self) -> &Dispatcher<C> {
        &self.dispatcher
    }

    /// Serve requests from stdin, replying on stdout.
    pub fn run_stdio(&self) -> RunSummary {
        let stdout = io::stdout();
        self.run(BufReader::new(io::stdin()), BufWriter::new(stdout.lock()))
    }

    /// Serve requests from `reader` until it ends, breaks or the host is
    /// interrupted.
    pub fn run<R, W>(&self, reader: R, writer: W) -> RunSummary
    where
        R: Read + Send + 'static,
        W: Write,
    {
        let mut frame_writer = FrameWriter::with_limits(writer, self.limits);
        let mut stats = HostStats::default();
        let frames = spawn_reader(FrameReader::with_limits(reader, self.limits));
        let interrupted = self.interrupt.wake_channel();

        tracing::info!("Native host started");

        let reason = loop {
            if self.interrupt.is_triggered() {
                break StopReason::Interrupted;
            }

            let next = select! {
                recv(frames) -> next => Some(next.unwrap_or(Ok(None))),
                recv(interrupted) -> _ => None,
            };

            let message = match next {
                None => break StopReason::Interrupted,
                Some(Ok(Some(message))) => message,
                Some(Ok(None)) => {
                    tracing::info!("No message received, stdin closed");
                    break StopReason::EndOfStream;
                }
                Some(Err(e)) => {
                    tracing::error!(error = %e, "Error reading message");
                    break StopReason::ReadError(e);
                }
            };

            stats.requests += 1;
            tracing::debug!(?message, "Received message");

            let response = self.dispatcher.dispatch(&message);
            self.reply(&mut frame_writer, &response, &mut stats);
        };

        if matches!(reason, StopReason::Interrupted) {
            tracing::info!("Native host interrupted");
        }
        tracing::info!(
            requests = stats.requests,
            oversized_replies = stats.oversized_replies,
            write_failures = stats.write_failures,
            "Native host stopped"
        );

        RunSummary { reason, stats }
    }

    fn reply<W: Write>(&self, writer: &mut FrameWriter<W>, response: &Response, stats: &mut HostStats) {
        let result = match writer.write(response) {
            Err(e @ (FrameError::TooLarge { .. } | FrameError::Encode(_))) => {
                stats.oversized_replies += 1;
                tracing::warn!(
                    action = ?response.action(),
                    error = %e,
                    "Reply not sendable, replacing it with an error"
                );
                writer.write(&Response::error(RESPONSE_TOO_LARGE))
            }
            other => other,
        };

        match result {
            Ok(()) => tracing::debug!(?response, "Sent message"),
            Err(e) => {
                stats.write_failures += 1;
                tracing::error!(
                    action = ?response.action(),
                    error = %e,
                    "Error sending message"
                );
            }
        }
    }
}

/// Read frames on a background thread until end of stream, a read error, or
/// the receiving side going away.
fn spawn_reader<R: Read + Send + 'static>(
    mut reader: FrameReader<R>,
) -> crossbeam_channel::Receiver<Result<Option<Message>, FrameError>> {
    let (tx, rx) = bounded(0);
    thread::spawn(move || loop {
        let next = reader.read();
        let last = !matches!(next, Ok(Some(_)));
        if tx.send(next).is_err() || last {
            break;
        }
    });
    rx
}
