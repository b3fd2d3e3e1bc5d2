//! Conversion Runner - supervised ffmpeg invocations
//!
//! [`FfmpegConverter`] runs the external converter as a child process with a
//! wall-clock budget. The child is driven by a current-thread tokio runtime
//! owned by the converter, so the host stays single-threaded: `convert` and
//! `probe` block the caller until the child exits or is killed.
//!
//! Failure never escapes as an error. Every outcome, including a missing
//! binary, a non-zero exit or a timeout, is folded into a
//! [`ConversionOutcome`] or [`ToolStatus`] for the reply.
//!
//! An [`Interrupt`] raised mid-run kills the child the same way the timeout
//! does, and the request is answered as failed.
//!
//! The source file is removed only after the converter exits with status 0.
//! If removal fails the conversion still counts as a success and the reply
//! says `deleted_original: false`.

use crate::config::ConverterConfig;
use crate::interrupt::Interrupt;
use crate::message::{ConversionOutcome, ToolStatus};
use crate::paths::resolve_output_path;
use std::fs;
use std::io;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

/// Encoder settings placed between `-i <input>` and `-y <output>`
pub const ENCODE_ARGS: &[&str] = &[
    "-c:v", "libx264", "-preset", "fast", "-crf", "22", "-c:a", "aac", "-b:a", "192k",
];

/// Error text of every failed probe
pub const TOOL_NOT_FOUND: &str = "FFmpeg not found";

/// Error text of a conversion stopped by an interrupt
pub const INTERRUPTED: &str = "Conversion interrupted";

/// Operations the dispatcher needs from a converter
pub trait Converter {
    /// Check whether the converter can be run and report its version
    fn probe(&self) -> ToolStatus;

    /// Convert `input`, writing to `output` or a derived path
    fn convert(&self, input: &Path, output: Option<&Path>) -> ConversionOutcome;
}

/// Errors from running a child process to completion
#[derive(Debug, thiserror::Error)]
enum RunError {
    #[error("{0}")]
    Io(#[from] io::Error),

    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    #[error("interrupted")]
    Interrupted,
}

/// What a child left behind after exiting on its own
#[derive(Debug)]
struct Finished {
    status: ExitStatus,
    stdout: String,
    stderr: String,
}

/// Converter backed by an external ffmpeg-compatible program
#[derive(Debug)]
pub struct FfmpegConverter {
    config: ConverterConfig,
    runtime: tokio::runtime::Runtime,
    interrupt: Interrupt,
}

impl FfmpegConverter {
    pub fn new(config: ConverterConfig) -> io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_io()
            .enable_time()
            .build()?;
        Ok(Self {
            config,
            runtime,
            interrupt: Interrupt::default(),
        })
    }

    /// Kill running children and refuse new runs once `interrupt` is raised.
    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    fn run(&self, command: Command, limit: Duration) -> Result<Finished, RunError> {
        if self.interrupt.is_triggered() {
            return Err(RunError::Interrupted);
        }
        self.runtime
            .block_on(run_to_completion(command, limit, &self.interrupt))
    }
}

impl Converter for FfmpegConverter {
    fn probe(&self) -> ToolStatus {
        let mut command = Command::new(&self.config.program);
        command.arg("-version");

        match self.run(command, self.config.probe_timeout) {
            Ok(finished) if finished.status.success() => {
                let version = finished.stdout.lines().next().unwrap_or_default().to_string();
                tracing::info!(version = %version, "FFmpeg found");
                return ToolStatus::Available { version };
            }
            Ok(finished) => {
                tracing::warn!(
                    program = %self.config.program.display(),
                    code = ?finished.status.code(),
                    "FFmpeg version query failed"
                );
            }
            Err(RunError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                tracing::warn!(program = %self.config.program.display(), "FFmpeg not found in PATH");
            }
            Err(e) => {
                tracing::error!(program = %self.config.program.display(), error = %e, "Error checking FFmpeg");
            }
        }

        ToolStatus::Unavailable {
            error: TOOL_NOT_FOUND.to_string(),
        }
    }

    fn convert(&self, input: &Path, output: Option<&Path>) -> ConversionOutcome {
        if !input.is_file() {
            tracing::warn!(input = %input.display(), "Input file not found");
            return ConversionOutcome::failed(format!("Input file not found: {}", input.display()));
        }

        let output_path = resolve_output_path(input, output, &self.config.target_extension);
        tracing::info!(
            input = %input.display(),
            output = %output_path.display(),
            "Starting conversion"
        );

        let mut command = Command::new(&self.config.program);
        command
            .arg("-i")
            .arg(input)
            .args(ENCODE_ARGS)
            .arg("-y")
            .arg(&output_path);

        let finished = match self.run(command, self.config.timeout) {
            Ok(finished) => finished,
            Err(RunError::TimedOut(limit)) => {
                tracing::error!(input = %input.display(), ?limit, "FFmpeg conversion timed out");
                return ConversionOutcome::failed(timeout_message(limit));
            }
            Err(RunError::Interrupted) => {
                tracing::warn!(input = %input.display(), "FFmpeg conversion interrupted");
                return ConversionOutcome::failed(INTERRUPTED);
            }
            Err(RunError::Io(e)) => {
                tracing::error!(
                    program = %self.config.program.display(),
                    input = %input.display(),
                    error = %e,
                    "Conversion error"
                );
                return ConversionOutcome::failed(format!(
                    "Failed to run {}: {}",
                    self.config.program.display(),
                    e
                ));
            }
        };

        if !finished.status.success() {
            tracing::error!(
                input = %input.display(),
                code = ?finished.status.code(),
                stderr = %finished.stderr,
                "FFmpeg error"
            );
            return ConversionOutcome::failed(format!(
                "FFmpeg conversion failed: {}",
                truncate_chars(&finished.stderr, self.config.diagnostic_limit)
            ));
        }

        tracing::info!(output = %output_path.display(), "Conversion successful");

        let deleted_original = match fs::remove_file(input) {
            Ok(()) => {
                tracing::info!(input = %input.display(), "Deleted original file");
                true
            }
            Err(e) => {
                tracing::warn!(input = %input.display(), error = %e, "Could not delete original file");
                false
            }
        };

        ConversionOutcome::Converted {
            output_path,
            input_path: input.to_path_buf(),
            deleted_original,
        }
    }
}

/// Spawn `command` and wait for it, killing the child once `limit` elapses
/// or `interrupt` is raised.
async fn run_to_completion(
    mut command: Command,
    limit: Duration,
    interrupt: &Interrupt,
) -> Result<Finished, RunError> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn()?;
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let stopped = {
        let work = async {
            let (stdout, stderr) = tokio::try_join!(read_all(stdout), read_all(stderr))?;
            let status = child.wait().await?;
            Ok::<_, io::Error>(Finished {
                status,
                stdout,
                stderr,
            })
        };

        tokio::select! {
            waited = tokio::time::timeout(limit, work) => match waited {
                Ok(finished) => return Ok(finished?),
                Err(_) => RunError::TimedOut(limit),
            },
            _ = interrupt.triggered() => RunError::Interrupted,
        }
    };

    // kill() also reaps the child, so nothing is left running
    if let Err(e) = child.kill().await {
        tracing::warn!(error = %e, reason = %stopped, "Failed to kill child");
    }
    Err(stopped)
}

async fn read_all<R: AsyncRead + Unpin>(pipe: Option<R>) -> io::Result<String> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// First `limit` characters of `text`
fn truncate_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn timeout_message(limit: Duration) -> String {
    let secs = limit.as_secs();
    if limit.subsec_nanos() != 0 {
        format!("Conversion timed out (max {} ms)", limit.as_millis())
    } else if secs >= 60 && secs % 60 == 0 {
        let minutes = secs / 60;
        let unit = if minutes == 1 { "minute" } else { "minutes" };
        format!("Conversion timed out (max {} {})", minutes, unit)
    } else {
        let unit = if secs == 1 { "second" } else { "seconds" };
        format!("Conversion timed out (max {} {})", secs, unit)
    }
}
