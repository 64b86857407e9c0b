//! # Local Volume
//!
//! Physical deletion against a local directory tree laid out as
//!
//! ```text
//! <root>/<tables_dir>/<tableId>/<tabletDir>/<file>
//! ```
//!
//! An environment backed by local disk can delegate the storage half of
//! [`GcEnvironment::delete`](crate::GcEnvironment::delete) and
//! [`GcEnvironment::delete_table_dir_if_empty`](crate::GcEnvironment::delete_table_dir_if_empty)
//! to [`LocalVolume`]. Candidate paths are resolved through their
//! normalized key, so any scheme/host spelling maps onto this volume.
//!
//! ## Parallelism
//!
//! A delete batch is spread over `delete_threads` scoped workers that pull
//! paths from a shared crossbeam channel. Workers borrow the batch; no
//! thread outlives the call.
//!
//! ## Semantics
//!
//! - Files are removed with `remove_file`, tablet directories with
//!   `remove_dir_all`.
//! - A path that is already gone counts as deleted.
//! - Any other I/O error leaves the path in [`DeleteOutcome::failed`].


use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crossbeam::channel;
use tracing::{debug, info, warn};

use crate::env::{Candidate, DeleteOutcome};
use crate::path::{DEFAULT_TABLES_DIR, TabletPath};

/// Configuration for a [`LocalVolume`].
#[derive(Debug, Clone)]
pub struct VolumeConfig {
    /// Name of the directory under the root holding per-table directories.
    ///
    /// Default: `"tables"`.
    pub tables_dir: String,

    /// Number of worker threads used per delete batch.
    ///
    /// Default: 16. Values below 1 are treated as 1.
    pub delete_threads: usize,
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            tables_dir: DEFAULT_TABLES_DIR.to_string(),
            delete_threads: 16,
        }
    }
}

/// A local directory tree holding table files.
#[derive(Debug, Clone)]
pub struct LocalVolume {
    root: PathBuf,
    config: VolumeConfig,
}

impl LocalVolume {
    pub fn new(root: impl AsRef<Path>, config: VolumeConfig) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            config,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding all tablet directories of `table_id`.
    pub fn table_dir(&self, table_id: &str) -> PathBuf {
        self.root.join(&self.config.tables_dir).join(table_id)
    }

    /// On-disk location of a normalized key.
    pub fn resolve(&self, key: &TabletPath) -> PathBuf {
        let dir = self.table_dir(key.table_id()).join(key.tablet_dir());
        match key.file_name() {
            Some(file) => dir.join(file),
            None => dir,
        }
    }

    /// Deletes every candidate, in parallel. Never fails as a whole; paths
    /// that could not be removed are reported in the outcome.
    pub fn delete(&self, candidates: &[Candidate]) -> DeleteOutcome {
        if candidates.is_empty() {
            return DeleteOutcome::all_deleted();
        }

        let workers = self.config.delete_threads.clamp(1, candidates.len());
        let (work_tx, work_rx) = channel::unbounded::<&Candidate>();
        let (fail_tx, fail_rx) = channel::unbounded::<String>();

        for candidate in candidates {
            // Receiver is alive until the scope below ends.
            let _ = work_tx.send(candidate);
        }
        drop(work_tx);

        let panicked = crossbeam::scope(|scope| {
            for _ in 0..workers {
                let rx = work_rx.clone();
                let failures = fail_tx.clone();
                scope.spawn(move |_| {
                    while let Ok(candidate) = rx.recv() {
                        if let Err(e) = self.remove(&candidate.key) {
                            warn!(candidate = %candidate.literal, %e, "failed to delete candidate");
                            let _ = failures.send(candidate.literal.clone());
                        }
                    }
                });
            }
        })
        .is_err();
        drop(fail_tx);

        let mut failed: Vec<String> = fail_rx.try_iter().collect();
        if panicked {
            // A panicked worker may have dropped paths without reporting them.
            warn!("delete worker panicked, re-checking batch");
            for candidate in candidates {
                if !failed.contains(&candidate.literal) && self.resolve(&candidate.key).exists() {
                    failed.push(candidate.literal.clone());
                }
            }
        }
        failed.sort();

        debug!(
            batch = candidates.len(),
            failed = failed.len(),
            workers,
            "volume delete batch finished"
        );
        DeleteOutcome::with_failures(failed)
    }

    /// Removes `<root>/<tables_dir>/<table_id>` if it exists and is empty.
    ///
    /// Returns `Ok(true)` if the directory was removed.
    pub fn delete_table_dir_if_empty(&self, table_id: &str) -> io::Result<bool> {
        let dir = self.table_dir(table_id);
        let mut entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e),
        };

        if entries.next().is_some() {
            debug!(%table_id, "table directory not empty, keeping it");
            return Ok(false);
        }

        match fs::remove_dir(&dir) {
            Ok(()) => {
                info!(%table_id, path = %dir.display(), "removed table directory");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn remove(&self, key: &TabletPath) -> io::Result<()> {
        let path = self.resolve(key);
        let result = if key.is_directory() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };

        match result {
            Ok(()) => {
                debug!(path = %path.display(), "deleted");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}
