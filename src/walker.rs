//! Depth-first traversal of a fetched working tree

use std::path::{Component, Path, PathBuf};

use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::filter::{FilterPolicy, VCS_DIR};

/// A regular file selected for evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkEntry {
    /// Path relative to the walk root, `/`-separated
    pub relative: String,
    pub absolute: PathBuf,
}

/// Lazily yield every regular file under `root`.
///
/// Denylisted directories are pruned before they are entered, so nothing
/// beneath them is visited at any depth. Sibling order is unspecified.
pub fn walk<'a>(root: &'a Path, policy: &'a FilterPolicy) -> impl Iterator<Item = WalkEntry> + 'a {
    WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .into_iter()
        .filter_entry(move |entry| !is_pruned(entry, policy))
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!(error = %err, "Skipping unreadable directory entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter_map(move |entry| to_walk_entry(root, entry))
}

fn is_pruned(entry: &DirEntry, policy: &FilterPolicy) -> bool {
    if !entry.file_type().is_dir() {
        return false;
    }
    let pruned = entry
        .file_name()
        .to_str()
        .map(|name| !policy.should_descend(name))
        .unwrap_or(false);
    if pruned {
        debug!(path = %entry.path().display(), "Pruning directory");
    }
    pruned
}

fn to_walk_entry(root: &Path, entry: DirEntry) -> Option<WalkEntry> {
    let relative = entry.path().strip_prefix(root).ok()?;
    let parts: Option<Vec<&str>> = relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_str()),
            _ => None,
        })
        .collect();
    // A lossy conversion could map two distinct files onto one stored path.
    let Some(parts) = parts else {
        warn!(path = %entry.path().display(), "Skipping file with non-UTF-8 path");
        return None;
    };

    // Any component, not only parents: submodule checkouts carry a `.git` file.
    if parts.iter().any(|part| *part == VCS_DIR) {
        return None;
    }

    let relative = parts.join("/");
    Some(WalkEntry {
        relative,
        absolute: entry.into_path(),
    })
}
