//! Diagnostic log sink
//!
//! Stdout carries protocol frames, so logs go to a daily rolling file
//! (`host.<date>.log`) or, when file logging is off, to stderr, which the
//! browser captures in its own console.
//!
//! [`init`] builds a [`LogSink`] but installs nothing globally. The binary
//! runs the host inside [`LogSink::in_scope`], which makes the sink the
//! default dispatcher for that thread. Dropping the sink flushes buffered
//! lines.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::Dispatch;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Layer, Registry};

/// Prefix of log file names
pub const LOG_FILE_PREFIX: &str = "host";

/// Rotated files kept on disk
pub const DEFAULT_MAX_FILES: usize = 5;

const DEFAULT_FILTER: &str = "convert_host=debug";

#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("Failed to create log directory {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("Failed to open log file: {0}")]
    Appender(#[from] InitError),

    #[error("Invalid log filter: {0}")]
    Filter(String),
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub log_dir: Option<PathBuf>,
    pub file_enabled: bool,
    pub json_format: bool,
    pub max_files: usize,
    /// Filter directives; `RUST_LOG` and then `convert_host=debug` otherwise
    pub filter: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_dir: None,
            file_enabled: true,
            json_format: false,
            max_files: DEFAULT_MAX_FILES,
            filter: None,
        }
    }
}

impl LogConfig {
    /// Log next to the executable, where the extension's installer puts the host.
    pub fn beside_executable() -> Self {
        Self {
            log_dir: std::env::current_exe()
                .ok()
                .and_then(|exe| exe.parent().map(Path::to_path_buf)),
            ..Default::default()
        }
    }

    pub fn stderr_only() -> Self {
        Self {
            file_enabled: false,
            ..Default::default()
        }
    }
}

/// The process-wide log sink
pub struct LogSink {
    dispatch: Dispatch,
    log_dir: Option<PathBuf>,
    _guard: Option<WorkerGuard>,
}

impl std::fmt::Debug for LogSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogSink")
            .field("log_dir", &self.log_dir)
            .finish_non_exhaustive()
    }
}

impl LogSink {
    /// Directory receiving log files, if file logging is active
    pub fn log_dir(&self) -> Option<&Path> {
        self.log_dir.as_deref()
    }

    /// Run `f` with this sink receiving all events on the current thread.
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        tracing::dispatcher::with_default(&self.dispatch, f)
    }
}

fn env_filter(config: &LogConfig) -> Result<EnvFilter, LogError> {
    match &config.filter {
        Some(directives) => {
            EnvFilter::try_new(directives).map_err(|e| LogError::Filter(e.to_string()))
        }
        None => Ok(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))),
    }
}

pub fn init(config: LogConfig) -> Result<LogSink, LogError> {
    let filter = env_filter(&config)?;

    let (layer, log_dir, guard): (Box<dyn Layer<Registry> + Send + Sync>, _, _) =
        match config.log_dir.clone().filter(|_| config.file_enabled) {
            Some(dir) => {
                fs::create_dir_all(&dir).map_err(|source| LogError::CreateDir {
                    path: dir.clone(),
                    source,
                })?;

                let appender = RollingFileAppender::builder()
                    .rotation(Rotation::DAILY)
                    .filename_prefix(LOG_FILE_PREFIX)
                    .filename_suffix("log")
                    .max_log_files(config.max_files)
                    .build(&dir)?;
                let (non_blocking, guard) = tracing_appender::non_blocking(appender);

                let layer = if config.json_format {
                    fmt::layer()
                        .json()
                        .with_writer(non_blocking)
                        .with_target(true)
                        .with_file(true)
                        .with_line_number(true)
                        .with_filter(filter)
                        .boxed()
                } else {
                    fmt::layer()
                        .with_writer(non_blocking)
                        .with_target(true)
                        .with_file(true)
                        .with_line_number(true)
                        .with_ansi(false)
                        .with_filter(filter)
                        .boxed()
                };
                (layer, Some(dir), Some(guard))
            }
            None => {
                let layer = fmt::layer()
                    .with_writer(io::stderr)
                    .with_target(true)
                    .with_ansi(false)
                    .with_filter(filter)
                    .boxed();
                (layer, None, None)
            }
        };

    let subscriber = tracing_subscriber::registry().with(layer);

    Ok(LogSink {
        dispatch: Dispatch::new(subscriber),
        log_dir,
        _guard: guard,
    })
}

/// Like [`init`], but logs to stderr when the log file cannot be opened.
///
/// The error that forced the fallback is handed back so it can be logged
/// through the sink that replaced the file.
pub fn init_or_stderr(config: LogConfig) -> Result<(LogSink, Option<LogError>), LogError> {
    match init(config.clone()) {
        Ok(sink) => Ok((sink, None)),
        Err(e @ (LogError::CreateDir { .. } | LogError::Appender(_))) => {
            let sink = init(LogConfig {
                file_enabled: false,
                ..config
            })?;
            Ok((sink, Some(e)))
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn log_files(dir: &Path) -> Vec<PathBuf> {
        fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .map_or(false, |n| n.starts_with(LOG_FILE_PREFIX) && n.ends_with(".log"))
            })
            .collect()
    }

    // TEST240: Events inside the scope land in the log file once the sink is dropped
    #[test]
    fn test240_file_sink_receives_events() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("logs");
        let sink = init(LogConfig {
            log_dir: Some(dir.clone()),
            filter: Some("debug".to_string()),
            ..LogConfig::default()
        })
        .unwrap();
        assert_eq!(sink.log_dir(), Some(dir.as_path()));

        sink.in_scope(|| tracing::info!(input = "/v/a.webm", "Starting conversion"));
        drop(sink);

        let files = log_files(&dir);
        assert_eq!(files.len(), 1, "expected one log file, found {:?}", files);
        let contents = fs::read_to_string(&files[0]).unwrap();
        assert!(contents.contains("Starting conversion"), "log was: {}", contents);
        assert!(contents.contains("/v/a.webm"));
    }

    // TEST241: JSON format writes one object per line
    #[test]
    fn test241_json_lines() {
        let temp = TempDir::new().unwrap();
        let sink = init(LogConfig {
            log_dir: Some(temp.path().to_path_buf()),
            json_format: true,
            filter: Some("info".to_string()),
            ..LogConfig::default()
        })
        .unwrap();

        sink.in_scope(|| tracing::warn!(code = 1, "FFmpeg error"));
        drop(sink);

        let contents = fs::read_to_string(&log_files(temp.path())[0]).unwrap();
        let line: serde_json::Value = serde_json::from_str(contents.lines().next().unwrap()).unwrap();
        assert_eq!(line["level"], "WARN");
        assert_eq!(line["fields"]["message"], "FFmpeg error");
    }

    // TEST242: Events outside the scope are not captured
    #[test]
    fn test242_sink_is_not_global() {
        let temp = TempDir::new().unwrap();
        let sink = init(LogConfig {
            log_dir: Some(temp.path().to_path_buf()),
            filter: Some("trace".to_string()),
            ..LogConfig::default()
        })
        .unwrap();

        tracing::info!("outside the sink");
        sink.in_scope(|| tracing::info!("inside the sink"));
        drop(sink);

        let contents = fs::read_to_string(&log_files(temp.path())[0]).unwrap();
        assert!(contents.contains("inside the sink"));
        assert!(!contents.contains("outside the sink"));
    }

    // TEST243: Disabling the file sink creates no files
    #[test]
    fn test243_stderr_only_creates_no_files() {
        let temp = TempDir::new().unwrap();
        let sink = init(LogConfig {
            log_dir: Some(temp.path().to_path_buf()),
            file_enabled: false,
            ..LogConfig::default()
        })
        .unwrap();

        assert!(sink.log_dir().is_none());
        drop(sink);
        assert!(log_files(temp.path()).is_empty());
    }

    // TEST244: Bad filter directives are reported, not ignored
    #[test]
    fn test244_invalid_filter() {
        let result = init(LogConfig {
            filter: Some("convert_host=notalevel".to_string()),
            ..LogConfig::stderr_only()
        });
        assert!(matches!(result, Err(LogError::Filter(_))));
    }

    // TEST245: An unusable log directory falls back to stderr instead of failing
    #[test]
    fn test245_unwritable_dir_falls_back_to_stderr() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("not-a-dir");
        fs::write(&blocker, b"").unwrap();

        let (sink, fallback) = init_or_stderr(LogConfig {
            log_dir: Some(blocker.join("logs")),
            ..LogConfig::default()
        })
        .expect("fallback sink should open");

        assert!(sink.log_dir().is_none());
        assert!(matches!(fallback, Some(LogError::CreateDir { .. })), "got {:?}", fallback);
    }

    // TEST246: A working directory needs no fallback; bad filters still fail
    #[test]
    fn test246_fallback_only_for_file_errors() {
        let temp = TempDir::new().unwrap();
        let (sink, fallback) = init_or_stderr(LogConfig {
            log_dir: Some(temp.path().to_path_buf()),
            ..LogConfig::default()
        })
        .unwrap();
        assert_eq!(sink.log_dir(), Some(temp.path()));
        assert!(fallback.is_none());

        let result = init_or_stderr(LogConfig {
            log_dir: Some(temp.path().to_path_buf()),
            filter: Some("convert_host=notalevel".to_string()),
            ..LogConfig::default()
        });
        assert!(matches!(result, Err(LogError::Filter(_))));
    }
}
