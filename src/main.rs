//! convert-host - native messaging host for the WebM to MP4 extension
//!
//! The browser starts this binary and talks to it over stdin/stdout. Any
//! positional arguments the browser appends (caller origin, manifest path,
//! extension id, `--parent-window` on Windows) are accepted and ignored.
//!
//! SIGINT and SIGTERM stop the host cleanly: a running conversion is killed,
//! the shutdown is logged and the process exits with status 0.

use anyhow::{Context, Result};
use clap::Parser;
use convert_host::config::{
    ConverterConfig, HostConfig, DEFAULT_CONVERT_TIMEOUT, DEFAULT_PROBE_TIMEOUT, DEFAULT_PROGRAM,
    DEFAULT_TARGET_EXTENSION,
};
use convert_host::host::{HostRuntime, StopReason};
use convert_host::interrupt::{self, Interrupt};
use convert_host::logging::{self, LogConfig};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "convert-host", version, about = "Native messaging host that converts recordings with ffmpeg")]
struct Cli {
    /// Converter program name or path
    #[arg(long, env = "CONVERT_HOST_FFMPEG", default_value = DEFAULT_PROGRAM)]
    ffmpeg: PathBuf,

    /// Seconds a conversion may run before it is killed
    #[arg(long, env = "CONVERT_HOST_TIMEOUT_SECS", default_value_t = DEFAULT_CONVERT_TIMEOUT.as_secs())]
    timeout_secs: u64,

    /// Seconds the availability probe may run
    #[arg(long, default_value_t = DEFAULT_PROBE_TIMEOUT.as_secs())]
    probe_timeout_secs: u64,

    /// Extension of derived output files
    #[arg(long, default_value = DEFAULT_TARGET_EXTENSION)]
    target_extension: String,

    /// Directory for log files (default: next to this executable)
    #[arg(long, env = "CONVERT_HOST_LOG_DIR")]
    log_dir: Option<PathBuf>,

    /// Log to stderr only
    #[arg(long)]
    no_log_file: bool,

    /// Write log files as JSON lines
    #[arg(long)]
    log_json: bool,

    /// Log filter directives, e.g. `convert_host=info`
    #[arg(long, env = "CONVERT_HOST_LOG")]
    log_filter: Option<String>,

    /// Arguments appended by the browser
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, hide = true)]
    browser_args: Vec<String>,
}

impl Cli {
    fn log_config(&self) -> LogConfig {
        let base = if self.no_log_file {
            LogConfig::stderr_only()
        } else {
            LogConfig::beside_executable()
        };

        LogConfig {
            log_dir: self.log_dir.clone().or(base.log_dir),
            json_format: self.log_json,
            filter: self.log_filter.clone(),
            ..base
        }
    }

    fn host_config(&self) -> HostConfig {
        HostConfig {
            converter: ConverterConfig {
                program: self.ffmpeg.clone(),
                timeout: Duration::from_secs(self.timeout_secs),
                probe_timeout: Duration::from_secs(self.probe_timeout_secs),
                target_extension: self.target_extension.clone(),
                ..ConverterConfig::default()
            },
            ..HostConfig::default()
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let (sink, file_error) =
        logging::init_or_stderr(cli.log_config()).context("failed to set up logging")?;

    sink.in_scope(|| -> Result<()> {
        if let Some(e) = &file_error {
            tracing::warn!(error = %e, "Log file unavailable, logging to stderr");
        }
        tracing::debug!(
            browser_args = ?cli.browser_args,
            program = %cli.ffmpeg.display(),
            timeout_secs = cli.timeout_secs,
            "Launched"
        );

        let interrupt = Interrupt::new();
        interrupt::listen_for_signals(interrupt.clone())
            .context("failed to install signal handlers")?;

        let host = HostRuntime::from_config(cli.host_config(), interrupt)
            .context("failed to start the converter runtime")?;
        let summary = host.run_stdio();

        if let StopReason::ReadError(e) = &summary.reason {
            tracing::warn!(error = %e, "Stopped on unreadable input");
        }
        Ok(())
    })
}
