//! redist-core: Manifest-driven one-way mirror engine
//!
//! Provides inclusion-list resolution, content fingerprinting, manifest
//! persistence, update-set planning, and sync execution.

pub mod diff;
pub mod hash;
pub mod list;
pub mod manifest;
pub mod report;
pub mod sync;

pub use diff::SyncPlan;
pub use hash::Fingerprint;
pub use list::{ExclusionSet, LIST_FILE, ListEntry, ResolvedList};
pub use manifest::{MANIFEST_FILE, Manifest, ManifestRecord};
pub use report::{LOG_FILE, RunLog};
pub use sync::{HashSummary, SyncSummary};
