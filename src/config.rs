//! Host configuration
//!
//! Defaults mirror the behavior the extension was built against: `ffmpeg`
//! from `PATH`, a five minute conversion budget, a five second probe and MP4
//! output. The binary overrides them from its command line.

use crate::frame::Limits;
use std::path::PathBuf;
use std::time::Duration;

/// Converter looked up on `PATH` when none is configured
pub const DEFAULT_PROGRAM: &str = "ffmpeg";

/// Wall-clock budget for one conversion
pub const DEFAULT_CONVERT_TIMEOUT: Duration = Duration::from_secs(300);

/// Wall-clock budget for the `-version` probe
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Container produced when the request names no output path
pub const DEFAULT_TARGET_EXTENSION: &str = "mp4";

/// Characters of converter diagnostics forwarded in an error reply
pub const DEFAULT_DIAGNOSTIC_LIMIT: usize = 500;

/// Settings for running the external converter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConverterConfig {
    /// Program name or path of the converter
    pub program: PathBuf,
    /// Budget for a conversion before the child is killed
    pub timeout: Duration,
    /// Budget for the availability probe
    pub probe_timeout: Duration,
    /// Extension (without dot) of derived output paths
    pub target_extension: String,
    /// Maximum characters of stderr included in failure messages
    pub diagnostic_limit: usize,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from(DEFAULT_PROGRAM),
            timeout: DEFAULT_CONVERT_TIMEOUT,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            target_extension: DEFAULT_TARGET_EXTENSION.to_string(),
            diagnostic_limit: DEFAULT_DIAGNOSTIC_LIMIT,
        }
    }
}

/// Everything the host loop needs besides its streams
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostConfig {
    pub converter: ConverterConfig,
    pub limits: Limits,
}
