//! In-memory converter used by unit tests

use crate::converter::{Converter, TOOL_NOT_FOUND};
use crate::message::{ConversionOutcome, ToolStatus};
use std::cell::{Cell, RefCell};
use std::path::{Path, PathBuf};

/// Returns canned results and records every call
#[derive(Debug)]
pub(crate) struct FakeConverter {
    pub status: ToolStatus,
    pub outcome: ConversionOutcome,
    pub probes: Cell<usize>,
    pub conversions: RefCell<Vec<(PathBuf, Option<PathBuf>)>>,
}

impl Default for FakeConverter {
    fn default() -> Self {
        Self {
            status: ToolStatus::Unavailable {
                error: TOOL_NOT_FOUND.to_string(),
            },
            outcome: ConversionOutcome::failed("fake converter"),
            probes: Cell::new(0),
            conversions: RefCell::new(Vec::new()),
        }
    }
}

impl Converter for FakeConverter {
    fn probe(&self) -> ToolStatus {
        self.probes.set(self.probes.get() + 1);
        self.status.clone()
    }

    fn convert(&self, input: &Path, output: Option<&Path>) -> ConversionOutcome {
        self.conversions
            .borrow_mut()
            .push((input.to_path_buf(), output.map(Path::to_path_buf)));
        self.outcome.clone()
    }
}
