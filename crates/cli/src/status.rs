//! Cargo-style status output for redist
//!
//! Displays run progress in the familiar cargo format:
//! ```text
//!     Hashing /opt/pkg/staging
//!      Hashed 42 files (117.3 MiB) in 1.2s
//!     Syncing /opt/pkg/staging -> /srv/pkg/live
//!      Synced 5 copied, 2 deleted in 340ms
//! ```

use std::io::Write as _;
use std::path::Path;
use std::time::Instant;

use redist_core::{HashSummary, SyncSummary};

/// Print a cargo-style status line (verb right-aligned to 12 chars)
fn print_status(status: &str, message: &str) {
    let mut term = console::Term::stderr();
    let style = console::Style::new().green().bold();
    let _ = writeln!(term, "{:>12} {}", style.apply_to(status), message);
}

fn print_warn_status(status: &str, message: &str) {
    let mut term = console::Term::stderr();
    let style = console::Style::new().yellow().bold();
    let _ = writeln!(term, "{:>12} {}", style.apply_to(status), message);
}

/// Elapsed-time tracker for the run's summary lines
pub struct RunProgress {
    start: Instant,
}

impl RunProgress {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Announce the hash run
    pub fn hashing(&self, source: &Path) {
        print_status("Hashing", &source.display().to_string());
    }

    /// Announce the sync run
    pub fn syncing(&self, source: &Path, dest: &Path) {
        print_status(
            "Syncing",
            &format!("{} -> {}", source.display(), dest.display()),
        );
    }

    /// Final summary for a hash run
    pub fn finish_hash(&self, summary: &HashSummary, errors: u64) {
        let size = humansize::format_size(summary.bytes, humansize::BINARY);
        let message = format!(
            "{} files ({size}) in {}",
            summary.hashed,
            self.elapsed_str()
        );
        if errors == 0 {
            print_status("Hashed", &message);
        } else {
            print_warn_status("Finished", &format!("{message}, {errors} errors"));
        }
    }

    /// Final summary for a sync run
    pub fn finish_sync(&self, summary: &SyncSummary, errors: u64) {
        let message = format!(
            "{} copied, {} deleted in {}",
            summary.copied,
            summary.deleted,
            self.elapsed_str()
        );
        if errors == 0 {
            print_status("Synced", &message);
        } else {
            print_warn_status("Finished", &format!("{message}, {errors} errors"));
        }
    }

    fn elapsed_str(&self) -> String {
        let elapsed = self.start.elapsed();
        if elapsed.as_secs() >= 1 {
            format!("{:.2}s", elapsed.as_secs_f64())
        } else {
            format!("{}ms", elapsed.as_millis())
        }
    }
}

impl Default for RunProgress {
    fn default() -> Self {
        Self::new()
    }
}
