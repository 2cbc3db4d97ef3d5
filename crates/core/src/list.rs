//! Inclusion-list resolution
//!
//! The inclusion list is the sole authority on what belongs to a package:
//! one path per line, relative lines joined onto the source root, a leading
//! `~` marking the path (and everything under it) as excluded. Directory
//! entries expand recursively to leaf files; directories themselves are
//! never part of the resolved set.

use std::path::{Path, PathBuf};

use color_eyre::Result;
use color_eyre::eyre::eyre;
use ignore::WalkBuilder;

use crate::report::RunLog;

/// Inclusion list file name, at the root of the source tree.
pub const LIST_FILE: &str = "redist.list";

/// Marker prefix for excluded entries.
pub const EXCLUDE_MARKER: char = '~';

/// A single parsed line of the inclusion list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    /// Path as written, possibly relative to the source root
    pub path: PathBuf,
    /// Whether the line carried the exclusion marker
    pub excluded: bool,
}

impl ListEntry {
    /// Parse one list line. Returns `None` for empty lines.
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        if line.is_empty() {
            return None;
        }

        match line.strip_prefix(EXCLUDE_MARKER) {
            Some(rest) => Some(Self {
                path: PathBuf::from(rest),
                excluded: true,
            }),
            None => Some(Self {
                path: PathBuf::from(line),
                excluded: false,
            }),
        }
    }
}

/// Root-relative paths withheld from hashing, diffing, and deletion.
///
/// Matching is path-segment containment: an entry covers itself and
/// everything under it, and nothing else. `foo` never matches `foobar`.
#[derive(Debug, Clone, Default)]
pub struct ExclusionSet {
    paths: Vec<PathBuf>,
}

impl ExclusionSet {
    /// Create an empty set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a root-relative path to the set
    pub fn insert(&mut self, rel: impl Into<PathBuf>) {
        self.paths.push(rel.into());
    }

    /// Whether `rel` equals or lies under any excluded path
    #[must_use]
    pub fn matches(&self, rel: &Path) -> bool {
        self.paths.iter().any(|e| rel.starts_with(e))
    }

    /// Whether the set is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// Result of resolving the inclusion list against a source root.
#[derive(Debug, Default)]
pub struct ResolvedList {
    /// Root-relative included files, in resolution order (list order,
    /// directory expansion sorted)
    pub files: Vec<PathBuf>,
    /// Root-relative excluded paths
    pub exclusions: ExclusionSet,
}

/// Resolve the inclusion list under `root` into concrete file sets.
///
/// Per-line problems (missing target, path outside the root, unreadable
/// subdirectory) are reported to the run log and skipped; resolution
/// proceeds best-effort through the remainder of the list.
///
/// # Errors
/// Returns an error only if the list file itself cannot be read.
pub fn resolve(root: &Path, log: &mut RunLog) -> Result<ResolvedList> {
    let list_path = root.join(LIST_FILE);
    let contents = std::fs::read_to_string(&list_path)
        .map_err(|e| eyre!("cannot open \"{}\": {e}", list_path.display()))?;

    let entries: Vec<ListEntry> = contents.lines().filter_map(ListEntry::parse).collect();

    // Exclusions first: an exclusion line protects leaves expanded from any
    // other line, regardless of where it appears in the list.
    let mut resolved = ResolvedList::default();
    for entry in entries.iter().filter(|e| e.excluded) {
        match relative_to_root(&entry.path, root) {
            Ok(rel) => resolved.exclusions.insert(rel),
            Err(e) => log.error(format!("{e}")),
        }
    }

    for entry in entries.iter().filter(|e| !e.excluded) {
        let full = if entry.path.is_absolute() {
            entry.path.clone()
        } else {
            root.join(&entry.path)
        };

        if !full.exists() {
            log.error(format!("no such file or directory \"{}\"", full.display()));
            continue;
        }

        if full.is_dir() {
            for leaf in expand_dir(&full, log) {
                push_included(&leaf, root, &mut resolved, log);
            }
        } else {
            push_included(&full, root, &mut resolved, log);
        }
    }

    Ok(resolved)
}

fn push_included(full: &Path, root: &Path, resolved: &mut ResolvedList, log: &mut RunLog) {
    match relative_to_root(full, root) {
        Ok(rel) => {
            if !resolved.exclusions.matches(&rel) {
                resolved.files.push(rel);
            }
        }
        Err(e) => log.error(format!("{e}")),
    }
}

/// Recursively collect leaf (non-directory) paths under `dir`, sorted.
fn expand_dir(dir: &Path, log: &mut RunLog) -> Vec<PathBuf> {
    let mut leaves = Vec::new();

    let walker = WalkBuilder::new(dir)
        .standard_filters(false)
        .follow_links(false)
        .build();

    for result in walker {
        match result {
            Ok(entry) => {
                let is_dir = entry.file_type().map_or(true, |ft| ft.is_dir());
                if !is_dir {
                    leaves.push(entry.into_path());
                }
            }
            Err(e) => log.error(format!("cannot traverse \"{}\": {e}", dir.display())),
        }
    }

    leaves.sort();
    leaves
}

/// Express `path` relative to `root`, for entries written either relative
/// or absolute. Paths outside the tree cannot be mirrored.
fn relative_to_root(path: &Path, root: &Path) -> Result<PathBuf> {
    if !path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    path.strip_prefix(root)
        .map(Path::to_path_buf)
        .map_err(|_| eyre!("\"{}\" is outside the source tree", path.display()))
}
