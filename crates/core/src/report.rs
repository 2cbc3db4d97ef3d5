//! Operator-facing run log
//!
//! Every diagnostic line is printed live through `tracing` and buffered into
//! a log file under the source root. The log is an explicit value handed to
//! each pipeline stage; the per-run error counter it carries gates manifest
//! propagation at the end of a sync run.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use color_eyre::Result;
use color_eyre::eyre::eyre;
use tracing::{error, info};

/// Log file name, created under the source root at the start of every run.
pub const LOG_FILE: &str = "redist.log";

/// Buffered run log with an error counter.
///
/// Dropping the log performs a best-effort flush so early-return paths still
/// leave a log file behind; [`RunLog::close`] is the checked variant that
/// distinguishes "written" from "durably persisted".
pub struct RunLog {
    writer: Option<BufWriter<File>>,
    path: PathBuf,
    errors: u64,
}

impl RunLog {
    /// Create (truncating any previous run's log) under `root`.
    ///
    /// # Errors
    /// Returns an error if the log file cannot be created; callers treat
    /// this as a structural failure.
    pub fn create(root: &Path) -> Result<Self> {
        let path = root.join(LOG_FILE);
        let file = File::create(&path)?;
        Ok(Self {
            writer: Some(BufWriter::new(file)),
            path,
            errors: 0,
        })
    }

    /// Report a progress line.
    pub fn info(&mut self, line: impl AsRef<str>) {
        let line = line.as_ref();
        info!("{line}");
        self.append(line);
    }

    /// Report an error line and bump the run error counter.
    pub fn error(&mut self, line: impl AsRef<str>) {
        let line = line.as_ref();
        error!("{line}");
        self.errors += 1;
        self.append(&format!("error: {line}"));
    }

    fn append(&mut self, line: &str) {
        if let Some(writer) = self.writer.as_mut() {
            // Buffered writes surface failures at close time
            let _ = writeln!(writer, "{line}");
        }
    }

    /// Cumulative error count for this run.
    #[must_use]
    pub fn errors(&self) -> u64 {
        self.errors
    }

    /// Path of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush the buffered log and sync it to disk.
    ///
    /// # Errors
    /// Returns an error if the flush or sync fails.
    pub fn close(mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            let file = writer
                .into_inner()
                .map_err(|e| eyre!("cannot flush log: {}", e.error()))?;
            file.sync_all()?;
        }
        Ok(())
    }
}

impl Drop for RunLog {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            let _ = writer.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_create_truncates_previous_log() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(LOG_FILE), "stale contents\n").unwrap();

        let log = RunLog::create(dir.path()).unwrap();
        log.close().unwrap();

        let contents = fs::read_to_string(dir.path().join(LOG_FILE)).unwrap();
        assert!(contents.is_empty());
    }

    #[test]
    fn test_lines_persisted_on_close() {
        let dir = TempDir::new().unwrap();
        let mut log = RunLog::create(dir.path()).unwrap();
        log.info("copying a.txt");
        log.error("cannot open b.txt");
        log.close().unwrap();

        let contents = fs::read_to_string(dir.path().join(LOG_FILE)).unwrap();
        assert!(contents.contains("copying a.txt"));
        assert!(contents.contains("error: cannot open b.txt"));
    }

    #[test]
    fn test_error_counter() {
        let dir = TempDir::new().unwrap();
        let mut log = RunLog::create(dir.path()).unwrap();
        assert_eq!(log.errors(), 0);
        log.info("fine");
        assert_eq!(log.errors(), 0);
        log.error("broken");
        log.error("also broken");
        assert_eq!(log.errors(), 2);
    }

    #[test]
    fn test_drop_flushes() {
        let dir = TempDir::new().unwrap();
        {
            let mut log = RunLog::create(dir.path()).unwrap();
            log.error("dropped without close");
        }
        let contents = fs::read_to_string(dir.path().join(LOG_FILE)).unwrap();
        assert!(contents.contains("dropped without close"));
    }

    #[test]
    fn test_create_fails_on_missing_root() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("no-such-dir");
        assert!(RunLog::create(&missing).is_err());
    }
}
