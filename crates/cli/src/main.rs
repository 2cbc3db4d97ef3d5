//! redist: manifest-driven one-way mirroring
//!
//! Two invocations drive a package mirror:
//! - `redist <SRC>` fingerprints the files named by the inclusion list and
//!   records the source manifest.
//! - `redist <SRC> <DEST>` diffs the recorded manifests and propagates only
//!   the files whose content actually changed, removing what left the set.

mod status;

use std::path::{Path, PathBuf};

use clap::builder::styling::{AnsiColor, Effects};
use clap::{Parser, builder::Styles};
use color_eyre::Result;
use color_eyre::eyre::eyre;

use redist_core::{RunLog, sync};

use crate::status::RunProgress;

const STYLES: Styles = Styles::styled()
    .header(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Cyan.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default())
    .valid(AnsiColor::Green.on_default())
    .invalid(AnsiColor::Red.on_default());

#[derive(Parser)]
#[command(name = "redist")]
#[command(version)]
#[command(styles = STYLES)]
#[command(about = "Mirror a package tree using content-hash manifests")]
#[command(long_about = r#"
redist mirrors a package tree into a destination, copying only files whose
content fingerprint changed and deleting files that left the source set.

  redist <SRC>         Read the inclusion list under SRC and record a
                       fingerprint manifest for every listed file.
  redist <SRC> <DEST>  Mirror SRC into DEST based on the recorded
                       manifests, then hand the manifest to DEST.

The inclusion list (redist.list at the root of SRC) names one path per
line; a leading `~` excludes that path and everything under it.
"#)]
struct Cli {
    /// Source directory (holds the inclusion list and manifest)
    source: PathBuf,

    /// Destination directory; when given, performs the sync run
    dest: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    // Structural preconditions: bad roots and an unwritable log abort the
    // run with a non-zero exit. Everything past this point completes with
    // exit 0 and reports per-item errors through the log instead.
    let source = existing_dir(&cli.source)?;
    let dest = cli.dest.as_deref().map(existing_dir).transpose()?;

    let mut log = RunLog::create(&source)
        .map_err(|e| eyre!("cannot create log under \"{}\": {e}", source.display()))?;

    let progress = RunProgress::new();
    let result = match dest {
        None => hash_run(&source, &mut log, &progress),
        Some(dest) => sync_run(&source, &dest, &mut log, &progress),
    };

    match result {
        Ok(()) => {
            if log.errors() == 0 {
                log.info("all tasks done successfully");
            } else {
                log.info(format!("{} errors occurred", log.errors()));
            }
            log.close()?;
            Ok(())
        }
        Err(e) => {
            log.error(format!("{e}"));
            log.close()?;
            Err(e)
        }
    }
}

fn hash_run(source: &Path, log: &mut RunLog, progress: &RunProgress) -> Result<()> {
    progress.hashing(source);
    let summary = sync::generate_manifest(source, log)?;
    progress.finish_hash(&summary, log.errors());
    Ok(())
}

fn sync_run(source: &Path, dest: &Path, log: &mut RunLog, progress: &RunProgress) -> Result<()> {
    progress.syncing(source, dest);
    let summary = sync::sync(source, dest, log)?;
    progress.finish_sync(&summary, log.errors());
    Ok(())
}

/// Canonicalize a root argument, requiring an existing directory.
fn existing_dir(path: &Path) -> Result<PathBuf> {
    let full = std::fs::canonicalize(path)
        .map_err(|_| eyre!("no such directory \"{}\"", path.display()))?;
    if !full.is_dir() {
        return Err(eyre!("\"{}\" is not a directory", path.display()));
    }
    Ok(full)
}
