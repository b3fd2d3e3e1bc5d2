//! Output path resolution
//!
//! The destination defaults to the input with its extension swapped for the
//! target container. When something already sits at the destination, a
//! counter is inserted before the extension (`clip (1).mp4`, `clip (2).mp4`,
//! ...) until a free name is found. Nothing is created here; a file appearing
//! between this check and the converter starting is an accepted race.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

/// Pick the path the converter should write to.
pub fn resolve_output_path(input: &Path, requested: Option<&Path>, target_extension: &str) -> PathBuf {
    let candidate = match requested {
        Some(path) => path.to_path_buf(),
        None => input.with_extension(target_extension),
    };

    if !entry_exists(&candidate) {
        return candidate;
    }

    let mut counter: u64 = 1;
    loop {
        let numbered = with_counter(&candidate, counter);
        if !entry_exists(&numbered) {
            tracing::info!(
                requested = %candidate.display(),
                resolved = %numbered.display(),
                "Output file exists, using numbered name"
            );
            return numbered;
        }
        counter += 1;
    }
}

/// `dir/stem.ext` -> `dir/stem (n).ext`; a name without extension keeps none.
fn with_counter(path: &Path, counter: u64) -> PathBuf {
    let mut name = path.file_stem().map(OsString::from).unwrap_or_default();
    name.push(format!(" ({})", counter));
    if let Some(ext) = path.extension() {
        name.push(".");
        name.push(ext);
    }
    path.with_file_name(name)
}

// Dangling symlinks count as taken: the converter would write through them.
fn entry_exists(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}
