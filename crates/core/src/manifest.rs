//! Manifest persistence
//!
//! A manifest maps root-relative paths to content fingerprints and is the
//! unit of recorded sync state: written under the source root by a hash run,
//! copied to the destination by a clean sync run. The on-disk format is two
//! lines per record, the relative path followed by the hex fingerprint.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Component, Path, PathBuf};

use color_eyre::Result;
use color_eyre::eyre::eyre;

use crate::hash::Fingerprint;
use crate::report::RunLog;

/// Manifest file name, at the root of each tree.
pub const MANIFEST_FILE: &str = "redist.manifest";

/// One manifest record: a root-relative path and its fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestRecord {
    pub path: PathBuf,
    pub fingerprint: Fingerprint,
}

/// Mapping from root-relative path to content fingerprint for one tree root.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    /// All recorded files, keyed by relative path
    pub files: HashMap<PathBuf, Fingerprint>,
}

impl Manifest {
    /// Create an empty manifest
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of records
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Look up the fingerprint recorded for `rel`
    #[must_use]
    pub fn get(&self, rel: &Path) -> Option<&Fingerprint> {
        self.files.get(rel)
    }

    /// Whether `rel` is recorded
    #[must_use]
    pub fn contains(&self, rel: &Path) -> bool {
        self.files.contains_key(rel)
    }

    /// Load the manifest under `root`.
    ///
    /// A manifest file that does not exist is not an error: it yields an
    /// empty mapping (the first-sync case). Records with a path that escapes
    /// the root or a fingerprint that fails strict decoding are reported to
    /// the run log and skipped; duplicate paths overwrite.
    ///
    /// # Errors
    /// Returns an error if an existing manifest file cannot be read.
    pub fn load(root: &Path, log: &mut RunLog) -> Result<Self> {
        let path = root.join(MANIFEST_FILE);
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::empty()),
            Err(e) => return Err(eyre!("cannot read \"{}\": {e}", path.display())),
        };

        let mut files = HashMap::new();
        let mut lines = contents.lines();

        while let Some(path_line) = lines.next() {
            if path_line.is_empty() {
                continue;
            }

            let Some(hex_line) = lines.next() else {
                log.error(format!(
                    "manifest record for \"{path_line}\" is missing its fingerprint"
                ));
                break;
            };

            let rel = PathBuf::from(path_line);
            if !is_root_relative(&rel) {
                log.error(format!(
                    "manifest record \"{path_line}\" is not inside the tree"
                ));
                continue;
            }

            match Fingerprint::decode(hex_line) {
                Ok(fingerprint) => {
                    files.insert(rel, fingerprint);
                }
                Err(e) => log.error(format!("manifest record \"{path_line}\": {e}")),
            }
        }

        Ok(Self { files })
    }
}

/// A relative path stays inside its root iff it has no absolute or
/// parent-directory components.
fn is_root_relative(rel: &Path) -> bool {
    !rel.as_os_str().is_empty()
        && rel
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Serialize `records` as the manifest under `root`, in the given order.
///
/// The file is built in a temporary sibling and atomically renamed over any
/// prior manifest only once fully flushed and synced, so a failed write
/// leaves the previous manifest intact.
///
/// # Errors
/// Returns an error if the manifest cannot be written, flushed, or renamed.
pub fn write_manifest(root: &Path, records: &[ManifestRecord]) -> Result<()> {
    let final_path = root.join(MANIFEST_FILE);
    let tmp_path = root.join(format!("{MANIFEST_FILE}.tmp"));

    let result = (|| -> Result<()> {
        let mut writer = BufWriter::new(File::create(&tmp_path)?);
        for record in records {
            writeln!(writer, "{}", record.path.display())?;
            writeln!(writer, "{}", record.fingerprint.encode())?;
        }

        let file = writer
            .into_inner()
            .map_err(|e| eyre!("cannot flush manifest: {}", e.error()))?;
        file.sync_all()?;

        std::fs::rename(&tmp_path, &final_path)?;
        Ok(())
    })();

    if result.is_err() {
        let _ = std::fs::remove_file(&tmp_path);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn record(path: &str, data: &[u8]) -> ManifestRecord {
        ManifestRecord {
            path: PathBuf::from(path),
            fingerprint: Fingerprint::from_bytes(data),
        }
    }

    #[test]
    fn test_write_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let records = vec![record("lib/a.dll", b"a"), record("bin/app", b"app")];
        write_manifest(dir.path(), &records).unwrap();

        let mut log = RunLog::create(dir.path()).unwrap();
        let manifest = Manifest::load(dir.path(), &mut log).unwrap();

        assert_eq!(manifest.len(), 2);
        assert_eq!(
            manifest.get(Path::new("lib/a.dll")),
            Some(&Fingerprint::from_bytes(b"a"))
        );
        assert_eq!(
            manifest.get(Path::new("bin/app")),
            Some(&Fingerprint::from_bytes(b"app"))
        );
        assert_eq!(log.errors(), 0);
    }

    #[test]
    fn test_write_preserves_record_order() {
        let dir = TempDir::new().unwrap();
        let records = vec![record("z.txt", b"z"), record("a.txt", b"a")];
        write_manifest(dir.path(), &records).unwrap();

        let text = fs::read_to_string(dir.path().join(MANIFEST_FILE)).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "z.txt");
        assert_eq!(lines[2], "a.txt");
    }

    #[test]
    fn test_missing_manifest_yields_empty() {
        let dir = TempDir::new().unwrap();
        let mut log = RunLog::create(dir.path()).unwrap();
        let manifest = Manifest::load(dir.path(), &mut log).unwrap();
        assert!(manifest.is_empty());
        assert_eq!(log.errors(), 0);
    }

    #[test]
    fn test_malformed_fingerprint_skipped_and_counted() {
        let dir = TempDir::new().unwrap();
        let good = Fingerprint::from_bytes(b"good");
        let text = format!("bad.txt\nnot-a-fingerprint\ngood.txt\n{}\n", good.encode());
        fs::write(dir.path().join(MANIFEST_FILE), text).unwrap();

        let mut log = RunLog::create(dir.path()).unwrap();
        let manifest = Manifest::load(dir.path(), &mut log).unwrap();

        assert_eq!(manifest.len(), 1);
        assert!(manifest.contains(Path::new("good.txt")));
        assert_eq!(log.errors(), 1);
    }

    #[test]
    fn test_record_outside_tree_skipped_and_counted() {
        let dir = TempDir::new().unwrap();
        let fp = Fingerprint::from_bytes(b"x");
        let text = format!(
            "/etc/passwd\n{}\n../escape.txt\n{}\nok.txt\n{}\n",
            fp.encode(),
            fp.encode(),
            fp.encode()
        );
        fs::write(dir.path().join(MANIFEST_FILE), text).unwrap();

        let mut log = RunLog::create(dir.path()).unwrap();
        let manifest = Manifest::load(dir.path(), &mut log).unwrap();

        assert_eq!(manifest.len(), 1);
        assert!(manifest.contains(Path::new("ok.txt")));
        assert_eq!(log.errors(), 2);
    }

    #[test]
    fn test_truncated_record_counted() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(MANIFEST_FILE), "dangling.txt\n").unwrap();

        let mut log = RunLog::create(dir.path()).unwrap();
        let manifest = Manifest::load(dir.path(), &mut log).unwrap();

        assert!(manifest.is_empty());
        assert_eq!(log.errors(), 1);
    }

    #[test]
    fn test_duplicate_records_overwrite() {
        let dir = TempDir::new().unwrap();
        let first = Fingerprint::from_bytes(b"first");
        let second = Fingerprint::from_bytes(b"second");
        let text = format!(
            "same.txt\n{}\nsame.txt\n{}\n",
            first.encode(),
            second.encode()
        );
        fs::write(dir.path().join(MANIFEST_FILE), text).unwrap();

        let mut log = RunLog::create(dir.path()).unwrap();
        let manifest = Manifest::load(dir.path(), &mut log).unwrap();

        assert_eq!(manifest.len(), 1);
        assert_eq!(manifest.get(Path::new("same.txt")), Some(&second));
    }

    #[test]
    fn test_rewrite_replaces_prior_manifest() {
        let dir = TempDir::new().unwrap();
        write_manifest(dir.path(), &[record("old.txt", b"old")]).unwrap();
        write_manifest(dir.path(), &[record("new.txt", b"new")]).unwrap();

        let mut log = RunLog::create(dir.path()).unwrap();
        let manifest = Manifest::load(dir.path(), &mut log).unwrap();

        assert_eq!(manifest.len(), 1);
        assert!(manifest.contains(Path::new("new.txt")));
        assert!(!dir.path().join(format!("{MANIFEST_FILE}.tmp")).exists());
    }

    #[test]
    fn test_is_root_relative() {
        assert!(is_root_relative(Path::new("a/b.txt")));
        assert!(is_root_relative(Path::new("./a/b.txt")));
        assert!(!is_root_relative(Path::new("/a/b.txt")));
        assert!(!is_root_relative(Path::new("../b.txt")));
        assert!(!is_root_relative(Path::new("a/../../b.txt")));
        assert!(!is_root_relative(Path::new("")));
    }
}
