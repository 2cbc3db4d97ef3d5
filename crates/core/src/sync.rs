//! Run orchestration and sync execution
//!
//! Two run modes share a pipeline. The hash run resolves the inclusion
//! list, fingerprints every included file, and records the source manifest.
//! The sync run replays the recorded manifests into an update plan and
//! applies it: prune stale destination files (with single-level empty-parent
//! cleanup), copy changed files (resolving symlinks to their targets), then
//! hand the manifest to the destination only if the whole run was clean.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use color_eyre::Result;
use color_eyre::eyre::eyre;
use ignore::WalkBuilder;

use crate::diff;
use crate::hash::{Fingerprint, READ_CHUNK_SIZE};
use crate::list;
use crate::manifest::{self, MANIFEST_FILE, Manifest, ManifestRecord};
use crate::report::RunLog;

/// Outcome of a hash run.
#[derive(Debug, Default)]
pub struct HashSummary {
    /// Files recorded in the manifest
    pub hashed: usize,
    /// Total bytes streamed through the hasher
    pub bytes: u64,
}

/// Outcome of a sync run.
#[derive(Debug, Default)]
pub struct SyncSummary {
    pub copied: usize,
    pub deleted: usize,
    /// Whether the source manifest was handed to the destination
    pub manifest_propagated: bool,
}

/// Hash run: fingerprint the listed source files and write the manifest.
///
/// Per-file problems (unreadable list entries, open failures) are reported
/// and counted; an unreadable file is recorded with the
/// [`Fingerprint::UNREADABLE`] sentinel so the run can complete.
///
/// # Errors
/// Returns an error only for failures the run cannot continue past.
pub fn generate_manifest(source_root: &Path, log: &mut RunLog) -> Result<HashSummary> {
    let resolved = match list::resolve(source_root, log) {
        Ok(resolved) => resolved,
        Err(e) => {
            log.error(format!("{e}"));
            return Ok(HashSummary::default());
        }
    };

    log.info(format!("{} files will be hashed:", resolved.files.len()));
    for rel in &resolved.files {
        log.info(format!("  {}", rel.display()));
    }

    let mut summary = HashSummary::default();
    let mut records = Vec::with_capacity(resolved.files.len());

    for rel in &resolved.files {
        let full = source_root.join(rel);
        let fingerprint = match Fingerprint::from_file(&full) {
            Ok(fingerprint) => {
                summary.bytes += std::fs::metadata(&full).map_or(0, |m| m.len());
                fingerprint
            }
            Err(e) => {
                log.error(format!("cannot hash \"{}\": {e}", full.display()));
                Fingerprint::UNREADABLE
            }
        };
        records.push(ManifestRecord {
            path: rel.clone(),
            fingerprint,
        });
    }

    match manifest::write_manifest(source_root, &records) {
        Ok(()) => summary.hashed = records.len(),
        Err(e) => log.error(format!("cannot write manifest: {e}")),
    }

    Ok(summary)
}

/// Sync run: diff the recorded manifests and mirror the source into the
/// destination.
///
/// # Errors
/// Returns an error if the source manifest is missing or either manifest
/// file exists but cannot be read.
pub fn sync(source_root: &Path, dest_root: &Path, log: &mut RunLog) -> Result<SyncSummary> {
    let resolved = match list::resolve(source_root, log) {
        Ok(resolved) => resolved,
        Err(e) => {
            log.error(format!("{e}"));
            return Ok(SyncSummary::default());
        }
    };

    if !source_root.join(MANIFEST_FILE).is_file() {
        return Err(eyre!(
            "no manifest under \"{}\", run `redist <src>` first",
            source_root.display()
        ));
    }

    let source_manifest = Manifest::load(source_root, log)?;
    let dest_manifest = Manifest::load(dest_root, log)?;
    let dest_files = scan_tree(dest_root, log);

    let plan = diff::plan(
        &source_manifest,
        &dest_manifest,
        &dest_files,
        &resolved.exclusions,
    );
    log.info(format!(
        "{} files to copy, {} files to delete",
        plan.to_copy.len(),
        plan.to_delete.len()
    ));

    // Deletions vacate stale occupants before new content lands
    let deleted = prune(source_root, dest_root, &plan.to_delete, log);
    let copied = copy_files(source_root, dest_root, &plan.to_copy, log);

    // The destination manifest may only ever reflect a state that has been
    // fully realized on disk; on any error the old manifest stays, so the
    // next run recomputes the same pending work.
    let mut manifest_propagated = false;
    if log.errors() == 0 {
        match propagate_manifest(source_root, dest_root) {
            Ok(()) => {
                manifest_propagated = true;
                log.info("manifest propagated to destination");
            }
            Err(e) => log.error(format!("cannot propagate manifest: {e}")),
        }
    } else {
        log.info("errors occurred, destination manifest left untouched");
    }

    Ok(SyncSummary {
        copied,
        deleted,
        manifest_propagated,
    })
}

/// Scan a tree for its current file set, as sorted root-relative paths.
pub fn scan_tree(root: &Path, log: &mut RunLog) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let walker = WalkBuilder::new(root)
        .standard_filters(false)
        .follow_links(false)
        .build();

    for result in walker {
        match result {
            Ok(entry) => {
                let is_dir = entry.file_type().map_or(true, |ft| ft.is_dir());
                if is_dir {
                    continue;
                }
                if let Ok(rel) = entry.path().strip_prefix(root) {
                    files.push(rel.to_path_buf());
                }
            }
            Err(e) => log.error(format!("cannot scan \"{}\": {e}", root.display())),
        }
    }

    files.sort();
    files
}

/// Delete the planned files, cleaning up parents that end up empty.
///
/// Deeper paths go first so a directory's files are gone by the time its
/// own entries come up. The cleanup is single-level per file: after each
/// deletion only the immediate parent is considered, and only if no
/// corresponding source directory still expects it to exist.
fn prune(source_root: &Path, dest_root: &Path, to_delete: &[PathBuf], log: &mut RunLog) -> usize {
    let mut deleted = 0;

    let mut bottom_up: Vec<&PathBuf> = to_delete.iter().collect();
    bottom_up.sort_by_key(|rel| std::cmp::Reverse(rel.components().count()));

    for rel in bottom_up {
        let full = dest_root.join(rel);
        match std::fs::remove_file(&full) {
            Ok(()) => {
                deleted += 1;
                log.info(format!("deleted \"{}\"", rel.display()));
                remove_empty_parent(rel, source_root, dest_root, log);
            }
            Err(e) => log.error(format!("cannot delete \"{}\": {e}", full.display())),
        }
    }

    deleted
}

fn remove_empty_parent(rel: &Path, source_root: &Path, dest_root: &Path, log: &mut RunLog) {
    let Some(parent_rel) = rel.parent() else {
        return;
    };
    if parent_rel.as_os_str().is_empty() {
        return;
    }
    // Never remove a directory the source tree still expects
    if source_root.join(parent_rel).is_dir() {
        return;
    }

    let parent = dest_root.join(parent_rel);
    let is_empty = std::fs::read_dir(&parent).map_or(false, |mut it| it.next().is_none());
    if !is_empty {
        return;
    }

    match std::fs::remove_dir(&parent) {
        Ok(()) => log.info(format!("removed empty directory \"{}\"", parent_rel.display())),
        Err(e) => log.error(format!(
            "cannot remove directory \"{}\": {e}",
            parent.display()
        )),
    }
}

/// Copy the planned files through one reusable chunk buffer.
fn copy_files(source_root: &Path, dest_root: &Path, to_copy: &[PathBuf], log: &mut RunLog) -> usize {
    let mut copied = 0;
    let mut buffer = vec![0u8; READ_CHUNK_SIZE];

    for rel in to_copy {
        match copy_one(source_root, dest_root, rel, &mut buffer, log) {
            Ok(bytes) => {
                copied += 1;
                log.info(format!("copied \"{}\" ({bytes} bytes)", rel.display()));
            }
            Err(e) => log.error(format!("cannot copy \"{}\": {e}", rel.display())),
        }
    }

    copied
}

fn copy_one(
    source_root: &Path,
    dest_root: &Path,
    rel: &Path,
    buffer: &mut [u8],
    log: &mut RunLog,
) -> Result<u64> {
    let src = resolve_copy_path(&source_root.join(rel), log)?;
    let dest = resolve_copy_path(&dest_root.join(rel), log)?;

    if dest.is_dir() {
        return Err(eyre!(
            "\"{}\" is a directory where a file is expected",
            dest.display()
        ));
    }
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut reader = File::open(&src)?;
    let mut writer = File::create(&dest)?;
    let mut bytes = 0u64;

    loop {
        let read = reader.read(buffer)?;
        if read == 0 {
            break;
        }
        writer.write_all(&buffer[..read])?;
        bytes += read as u64;
    }

    writer.sync_all()?;
    Ok(bytes)
}

/// Resolve a symlink to its concrete target before it takes part in a copy.
///
/// Applies to both ends: a symlinked source contributes its target's
/// content, and a symlinked destination is overwritten through its target,
/// so the tool never silently breaks or duplicates links. The conversion is
/// reported; a path that is not a symlink passes through untouched.
fn resolve_copy_path(path: &Path, log: &mut RunLog) -> Result<PathBuf> {
    match path.symlink_metadata() {
        Ok(meta) if meta.file_type().is_symlink() => {
            let target = std::fs::canonicalize(path)
                .map_err(|e| eyre!("cannot resolve symlink \"{}\": {e}", path.display()))?;
            log.info(format!(
                "symlink \"{}\" resolved to \"{}\"",
                path.display(),
                target.display()
            ));
            Ok(target)
        }
        _ => Ok(path.to_path_buf()),
    }
}

fn propagate_manifest(source_root: &Path, dest_root: &Path) -> Result<()> {
    std::fs::copy(
        source_root.join(MANIFEST_FILE),
        dest_root.join(MANIFEST_FILE),
    )?;
    Ok(())
}
