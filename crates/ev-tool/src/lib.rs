mod case;
mod runner;
mod source;

pub use case::{ExpectedCommand, StateUpdate, TestCase, TESTCASE_SCHEMA_V1};
pub use runner::{assert_case, run_case, RunReport, MAX_COMMANDS};
pub use source::{read_events_from_dir, read_test_case};

use std::path::PathBuf;

use ev_core::{ErrorCode, EventError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EvToolError {
    #[error("Failed to read file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse testcase {path}: {source}")]
    ParseCase {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Invalid testcase schema version \"{found}\", expected \"{expected}\".")]
    InvalidSchemaVersion { expected: String, found: String },
    #[error("No .pyevent/.event files under {path}.")]
    SourceEmpty { path: PathBuf },
    #[error("Event error: {0}")]
    Event(#[from] EventError),
    #[error("Entry event \"{name}\" is not in the case directory.")]
    MissingEntry { name: String },
    #[error("Guard exceeded: more than {max_commands} commands.")]
    GuardExceeded { max_commands: usize },
    #[error("Expected error {expected:?}, actual {actual:?}.")]
    ErrorMismatch {
        expected: Option<ErrorCode>,
        actual: Option<ErrorCode>,
    },
    #[error("Expected findings {expected:?}, actual {actual:?}.")]
    FindingMismatch {
        expected: Vec<ErrorCode>,
        actual: Vec<ErrorCode>,
    },
    #[error("Expected command count {expected}, actual {actual}. observed={observed}")]
    CommandCountMismatch {
        expected: usize,
        actual: usize,
        observed: String,
    },
    #[error("Command mismatch at index {index}. expected={expected} actual={actual}")]
    CommandMismatch {
        index: usize,
        expected: String,
        actual: String,
    },
    #[error("Failed to round-trip a saved runner through JSON: {0}")]
    SnapshotJson(serde_json::Error),
    #[error("Failed to serialize command for diff: {0}")]
    CommandSerialize(serde_json::Error),
}

#[cfg(test)]
pub(crate) mod tool_test_support {
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{SystemTime, UNIX_EPOCH};

    pub(crate) fn temp_dir(name: &str) -> PathBuf {
        static COUNTER: AtomicUsize = AtomicUsize::new(0);
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time should move forward")
            .as_nanos();
        let unique = COUNTER.fetch_add(1, Ordering::Relaxed);
        let dir = std::env::temp_dir().join(format!("ev-tool-{}-{}-{}", name, nanos, unique));
        fs::create_dir_all(&dir).expect("temp dir should be created");
        dir
    }

    pub(crate) fn write_file(path: &Path, content: &str) {
        let parent = path.parent().expect("path should have parent");
        fs::create_dir_all(parent).expect("parent dir should be created");
        fs::write(path, content).expect("file should be written");
    }
}
