//! Update-set planning
//!
//! Given the freshly recorded source manifest, the previously propagated
//! destination manifest, and a scan of what is actually on the destination,
//! compute the minimal update set: files to copy and files to delete.

use std::path::{Path, PathBuf};

use rayon::prelude::*;

use crate::list::ExclusionSet;
use crate::manifest::{MANIFEST_FILE, Manifest};

/// The planned update set for one sync run, applied as unordered batches.
#[derive(Debug, Clone, Default)]
pub struct SyncPlan {
    /// Relative paths whose content must be copied to the destination
    pub to_copy: Vec<PathBuf>,
    /// Relative destination paths no longer part of the source set
    pub to_delete: Vec<PathBuf>,
}

impl SyncPlan {
    /// Whether the destination is already up to date
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_copy.is_empty() && self.to_delete.is_empty()
    }
}

/// Compute the update set.
///
/// `to_copy` holds every source record whose fingerprint is absent from or
/// differs byte-for-byte in the destination manifest. `to_delete` holds
/// every scanned destination file absent from the source record set. The
/// exclusion set withholds entries from both sides: an excluded path is
/// never copied even if a stale manifest still records it, and never
/// deleted even when the source no longer references it. The manifest's
/// own file never appears in either set.
///
/// Fingerprint comparisons are independent per path, so they fan out over
/// the rayon worker pool; each unit of work reads two immutable records and
/// produces one verdict. Both batches come back sorted so logs and tests
/// are deterministic.
#[must_use]
pub fn plan(
    source: &Manifest,
    dest: &Manifest,
    dest_files: &[PathBuf],
    exclusions: &ExclusionSet,
) -> SyncPlan {
    let manifest_name = Path::new(MANIFEST_FILE);

    let mut to_copy: Vec<PathBuf> = source
        .files
        .par_iter()
        .filter_map(|(rel, fingerprint)| {
            if rel.as_path() == manifest_name || exclusions.matches(rel) {
                return None;
            }
            let unchanged = dest.get(rel) == Some(fingerprint);
            (!unchanged).then(|| rel.clone())
        })
        .collect();
    to_copy.sort();

    let mut to_delete: Vec<PathBuf> = dest_files
        .iter()
        .filter(|rel| rel.as_path() != manifest_name)
        .filter(|rel| !source.contains(rel))
        .filter(|rel| !exclusions.matches(rel))
        .cloned()
        .collect();
    to_delete.sort();

    SyncPlan { to_copy, to_delete }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::Fingerprint;

    fn manifest(entries: &[(&str, &[u8])]) -> Manifest {
        let mut m = Manifest::empty();
        for (path, data) in entries {
            m.files
                .insert(PathBuf::from(path), Fingerprint::from_bytes(data));
        }
        m
    }

    fn paths(items: &[&str]) -> Vec<PathBuf> {
        items.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn test_empty_destination_copies_everything() {
        let source = manifest(&[("a.txt", b"a"), ("lib/b.dll", b"b")]);
        let plan = plan(&source, &Manifest::empty(), &[], &ExclusionSet::new());

        assert_eq!(plan.to_copy, paths(&["a.txt", "lib/b.dll"]));
        assert!(plan.to_delete.is_empty());
    }

    #[test]
    fn test_identical_manifests_copy_nothing() {
        let source = manifest(&[("a.txt", b"a"), ("b.txt", b"b")]);
        let dest = manifest(&[("a.txt", b"a"), ("b.txt", b"b")]);
        let dest_files = paths(&["a.txt", "b.txt"]);

        let plan = plan(&source, &dest, &dest_files, &ExclusionSet::new());
        assert!(plan.is_empty());
    }

    #[test]
    fn test_changed_fingerprint_is_copied() {
        let source = manifest(&[("lib/a.dll", b"new"), ("same.txt", b"same")]);
        let dest = manifest(&[("lib/a.dll", b"old"), ("same.txt", b"same")]);
        let dest_files = paths(&["lib/a.dll", "same.txt"]);

        let plan = plan(&source, &dest, &dest_files, &ExclusionSet::new());
        assert_eq!(plan.to_copy, paths(&["lib/a.dll"]));
        assert!(plan.to_delete.is_empty());
    }

    #[test]
    fn test_diff_correctness_property() {
        // toCopy == { k in keys(S) : k not in keys(D) or S[k] != D[k] }
        let source = manifest(&[("changed", b"v2"), ("new", b"n"), ("kept", b"k")]);
        let dest = manifest(&[("changed", b"v1"), ("kept", b"k"), ("stale", b"s")]);

        let plan = plan(&source, &dest, &[], &ExclusionSet::new());
        assert_eq!(plan.to_copy, paths(&["changed", "new"]));
    }

    #[test]
    fn test_stale_destination_file_is_deleted() {
        let source = manifest(&[("keep.txt", b"k")]);
        let dest_files = paths(&["keep.txt", "old/leftover.txt"]);

        let plan = plan(&source, &Manifest::empty(), &dest_files, &ExclusionSet::new());
        assert_eq!(plan.to_delete, paths(&["old/leftover.txt"]));
    }

    #[test]
    fn test_deletion_safety() {
        // A destination file whose path is a source key is never deleted,
        // regardless of content.
        let source = manifest(&[("a.txt", b"new")]);
        let dest_files = paths(&["a.txt"]);

        let plan = plan(&source, &manifest(&[("a.txt", b"old")]), &dest_files, &ExclusionSet::new());
        assert!(plan.to_delete.is_empty());
        assert_eq!(plan.to_copy, paths(&["a.txt"]));
    }

    #[test]
    fn test_exclusions_win_over_deletion() {
        let source = manifest(&[("keep.txt", b"k")]);
        let dest_files = paths(&["keep.txt", "local/config.ini", "local/cache/x"]);

        let mut exclusions = ExclusionSet::new();
        exclusions.insert("local");

        let plan = plan(&source, &Manifest::empty(), &dest_files, &exclusions);
        assert!(plan.to_delete.is_empty());
    }

    #[test]
    fn test_exclusions_withhold_stale_manifest_records_from_copy() {
        // A manifest hashed before the list gained the exclusion may still
        // record the path; it must not be copied.
        let source = manifest(&[("keep.txt", b"k"), ("local/cfg.ini", b"c")]);

        let mut exclusions = ExclusionSet::new();
        exclusions.insert("local");

        let plan = plan(&source, &Manifest::empty(), &[], &exclusions);
        assert_eq!(plan.to_copy, paths(&["keep.txt"]));
    }

    #[test]
    fn test_manifest_file_never_planned() {
        let source = manifest(&[(MANIFEST_FILE, b"self"), ("a.txt", b"a")]);
        let dest_files = vec![PathBuf::from(MANIFEST_FILE)];

        let plan = plan(&source, &Manifest::empty(), &dest_files, &ExclusionSet::new());
        assert_eq!(plan.to_copy, paths(&["a.txt"]));
        assert!(plan.to_delete.is_empty());
    }

    #[test]
    fn test_plan_is_sorted() {
        let source = manifest(&[("z.txt", b"z"), ("a.txt", b"a"), ("m/n.txt", b"n")]);
        let dest_files = paths(&["zz.bin", "aa.bin"]);

        let plan = plan(&source, &Manifest::empty(), &dest_files, &ExclusionSet::new());
        assert_eq!(plan.to_copy, paths(&["a.txt", "m/n.txt", "z.txt"]));
        assert_eq!(plan.to_delete, paths(&["aa.bin", "zz.bin"]));
    }
}
