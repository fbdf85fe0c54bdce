//! File and directory filtering for repository imports
//!
//! A file passes through two ordered stages, each a standalone function:
//! [`FilterPolicy::check_size`] reads metadata only, then the content is read
//! once and [`decode_text`] decides whether it is storable text.
//! [`FilterPolicy::evaluate`] chains them. Directory pruning is a separate
//! predicate consulted by the walker before it descends.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::Path;

use serde::Serialize;

/// Default size ceiling in bytes
pub const DEFAULT_MAX_FILE_SIZE: u64 = 1_000_000;

/// Version-control metadata directory, never imported
pub const VCS_DIR: &str = ".git";

/// Default directories pruned during traversal
pub const DEFAULT_DENYLIST: &[&str] = &[
    VCS_DIR,
    "node_modules",
    "__pycache__",
    ".venv",
    "venv",
    "env",
    "dist",
    "build",
    "target",
    ".next",
    ".tox",
    ".mypy_cache",
    ".pytest_cache",
];

/// Why a file was left out of an import
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    #[error("too large ({size} bytes)")]
    TooLarge { size: u64 },
    #[error("binary")]
    Binary,
    #[error("unreadable: {message}")]
    Unreadable { message: String },
}

impl SkipReason {
    fn unreadable(err: io::Error) -> Self {
        SkipReason::Unreadable {
            message: err.to_string(),
        }
    }
}

/// Filesystem access used by the filter stages
///
/// Split out so tests can count how often content is actually read.
pub trait ContentReader: Send + Sync {
    /// Size in bytes from metadata, without touching content
    fn file_size(&self, path: &Path) -> io::Result<u64>;

    /// Full file content
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;
}

/// Reads straight from the local filesystem
#[derive(Debug, Default, Clone, Copy)]
pub struct FsContentReader;

impl ContentReader for FsContentReader {
    fn file_size(&self, path: &Path) -> io::Result<u64> {
        Ok(fs::metadata(path)?.len())
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }
}

/// Directory denylist and size ceiling applied to one import
#[derive(Debug, Clone)]
pub struct FilterPolicy {
    denylist: HashSet<String>,
    max_file_size: u64,
}

impl Default for FilterPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_DENYLIST.iter().map(|d| d.to_string()),
            DEFAULT_MAX_FILE_SIZE,
        )
    }
}

impl FilterPolicy {
    pub fn new(denylist: impl IntoIterator<Item = String>, max_file_size: u64) -> Self {
        let mut denylist: HashSet<String> = denylist.into_iter().collect();
        // Repository metadata is never content, whatever the configured list says.
        denylist.insert(VCS_DIR.to_string());
        Self {
            denylist,
            max_file_size,
        }
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    /// Whether the walker may enter a directory with this exact name
    pub fn should_descend(&self, dir_name: &str) -> bool {
        !self.denylist.contains(dir_name)
    }

    /// Size stage: metadata only, content untouched
    pub fn check_size(&self, path: &Path, reader: &dyn ContentReader) -> Result<u64, SkipReason> {
        let size = reader.file_size(path).map_err(SkipReason::unreadable)?;
        if size > self.max_file_size {
            return Err(SkipReason::TooLarge { size });
        }
        Ok(size)
    }

    /// Run every stage for one file and return its text on success
    pub fn evaluate(&self, path: &Path, reader: &dyn ContentReader) -> Result<String, SkipReason> {
        self.check_size(path, reader)?;
        let bytes = reader.read(path).map_err(SkipReason::unreadable)?;
        decode_text(bytes)
    }
}

/// Decode stage: valid UTF-8 without NUL bytes.
///
/// NUL is rejected because it marks binary payloads and cannot be stored in a
/// Postgres `TEXT` column.
pub fn decode_text(bytes: Vec<u8>) -> Result<String, SkipReason> {
    if bytes.contains(&0) {
        return Err(SkipReason::Binary);
    }
    String::from_utf8(bytes).map_err(|_| SkipReason::Binary)
}
