//! # Collection Pass
//!
//! [`GcAlgorithm::collect`] runs one garbage-collection pass against a
//! [`GcEnvironment`]:
//!
//! ```text
//! Fetching ──► Reconciling ──► Deleting ──┐
//!    ▲                                    │  (next page)
//!    └────────────────────────────────────┘
//!    │ empty page
//!    ▼
//! CleaningTableDirs ──► Done            (any state) ──► Failed
//! ```
//!
//! ## Snapshot
//!
//! The reference scan, the blip scan, and the live table-id set are read
//! once, at the start of the pass, and stay fixed until it ends. Every page
//! is judged against the same view of metadata.
//!
//! ## Paging
//!
//! Candidates are fetched in log order using the last literal path of the
//! previous page as an exclusive cursor. Each page is reconciled and its
//! survivors deleted before the next page is fetched, so a failure midway
//! leaves earlier pages deleted and later pages untouched. There is no
//! rollback across pages.
//!
//! ## Failures
//!
//! Malformed paths and collaborator errors abort the pass with a
//! [`CollectError`]. Paths that a `delete` call reports as not removed do
//! not abort anything: they are handled by the [`DeleteFailurePolicy`]
//! and, if still present, stay in the log for the next pass.

#[cfg(test)]
mod tests;

use std::collections::HashSet;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::blip::BlipGuard;
use crate::env::{Candidate, EnvError, GcEnvironment};
use crate::metadata::{self, MetadataError};
use crate::path::{PathError, PathNormalizer};
use crate::reference::ReferenceIndex;
use crate::tabledir::TableDirectoryTracker;

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors that abort a collection pass.
#[derive(Debug, Error)]
pub enum CollectError {
    /// A candidate or blip path could not be normalized.
    #[error("malformed path: {0}")]
    MalformedPath(#[from] PathError),

    /// A metadata reference entry could not be interpreted.
    #[error("malformed reference: {0}")]
    Metadata(#[from] MetadataError),

    /// A collaborator call failed.
    #[error("{op} failed: {source}")]
    Environment {
        op: &'static str,
        #[source]
        source: EnvError,
    },

    /// The candidate log returned a page that does not move past the cursor.
    #[error("candidate log did not advance past {cursor:?}")]
    CursorStalled { cursor: String },
}

/// A failed pass: the error, the phase it failed in, and the counters
/// accumulated up to that point.
#[derive(Debug, Error)]
#[error("collection pass failed while {failed_in:?}: {error}")]
pub struct PassFailure {
    #[source]
    pub error: CollectError,
    pub failed_in: PassState,
    pub stats: PassStats,
}

impl CollectError {
    /// `true` for failures caused by malformed input rather than a collaborator.
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::MalformedPath(_) | Self::Metadata(_))
    }

    fn env(op: &'static str) -> impl FnOnce(EnvError) -> Self {
        move |source| Self::Environment { op, source }
    }
}

// ------------------------------------------------------------------------------------------------
// Configuration
// ------------------------------------------------------------------------------------------------

/// What to do with paths a `delete` call reports as not removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeleteFailurePolicy {
    /// Leave them in the candidate log for the next pass.
    #[default]
    Defer,

    /// Re-issue `delete` for just the failed paths, up to `max_attempts`
    /// more times within the same page, then defer what is left.
    Retry { max_attempts: u32 },
}

impl DeleteFailurePolicy {
    fn max_retries(self) -> u32 {
        match self {
            Self::Defer => 0,
            Self::Retry { max_attempts } => max_attempts,
        }
    }
}

/// Settings for [`GcAlgorithm`].
#[derive(Debug, Clone)]
pub struct PassConfig {
    /// Page size requested from the candidate log.
    pub candidate_batch_size: usize,

    /// Normalizer for candidates, blips, and references.
    pub normalizer: PathNormalizer,

    pub delete_failure_policy: DeleteFailurePolicy,

    /// Reconcile but never delete.
    pub safe_mode: bool,
}

impl Default for PassConfig {
    fn default() -> Self {
        Self {
            candidate_batch_size: 1000,
            normalizer: PathNormalizer::default(),
            delete_failure_policy: DeleteFailurePolicy::Defer,
            safe_mode: false,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Pass state & statistics
// ------------------------------------------------------------------------------------------------

/// Phase of a collection pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassState {
    Fetching,
    Reconciling,
    Deleting,
    CleaningTableDirs,
    Done,
    Failed,
}

/// Counters for one collection pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassStats {
    /// Non-empty candidate pages processed.
    pub pages: u64,
    /// Candidates read from the log.
    pub candidates: u64,
    /// Candidates kept alive by a reference.
    pub in_use: u64,
    /// Unreferenced candidates kept because of an active bulk load.
    pub blip_protected: u64,
    /// Candidates confirmed unreferenced and unprotected.
    pub confirmed: u64,
    /// Confirmed candidates actually removed.
    pub deleted: u64,
    /// Confirmed candidates left in the log because deletion failed.
    pub delete_failures: u64,
    /// Paths re-submitted under [`DeleteFailurePolicy::Retry`].
    pub delete_retries: u64,
    /// `delete_table_dir_if_empty` calls issued.
    pub table_dirs_removed: u64,
    pub elapsed: Duration,
    pub state: PassState,
}

impl Default for PassStats {
    fn default() -> Self {
        Self {
            pages: 0,
            candidates: 0,
            in_use: 0,
            blip_protected: 0,
            confirmed: 0,
            deleted: 0,
            delete_failures: 0,
            delete_retries: 0,
            table_dirs_removed: 0,
            elapsed: Duration::ZERO,
            state: PassState::Fetching,
        }
    }
}

/// Everything read once at the start of a pass.
struct Snapshot {
    references: ReferenceIndex,
    blips: BlipGuard,
    live_tables: HashSet<String>,
}

// ------------------------------------------------------------------------------------------------
// GcAlgorithm
// ------------------------------------------------------------------------------------------------

/// Stateless driver for collection passes. All per-pass state lives on
/// the stack of [`GcAlgorithm::collect`].
#[derive(Debug, Clone, Default)]
pub struct GcAlgorithm {
    config: PassConfig,
}

impl GcAlgorithm {
    pub fn new(config: PassConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PassConfig {
        &self.config
    }

    /// Runs one full pass.
    pub fn collect<E>(&self, env: &mut E) -> Result<PassStats, PassFailure>
    where
        E: GcEnvironment + ?Sized,
    {
        let started = Instant::now();
        let mut stats = PassStats::default();
        let result = self.run(env, &mut stats);
        stats.elapsed = started.elapsed();

        match result {
            Ok(()) => {
                stats.state = PassState::Done;
                info!(
                    pages = stats.pages,
                    candidates = stats.candidates,
                    in_use = stats.in_use,
                    blip_protected = stats.blip_protected,
                    deleted = stats.deleted,
                    delete_failures = stats.delete_failures,
                    table_dirs_removed = stats.table_dirs_removed,
                    elapsed_ms = stats.elapsed.as_millis() as u64,
                    safe_mode = self.config.safe_mode,
                    "collection pass finished"
                );
                Ok(stats)
            }
            Err(error) => {
                let failed_in = stats.state;
                stats.state = PassState::Failed;
                error!(
                    ?failed_in,
                    malformed = error.is_malformed(),
                    candidates = stats.candidates,
                    deleted = stats.deleted,
                    "collection pass failed: {error}"
                );
                Err(PassFailure {
                    error,
                    failed_in,
                    stats,
                })
            }
        }
    }

    fn run<E>(&self, env: &mut E, stats: &mut PassStats) -> Result<(), CollectError>
    where
        E: GcEnvironment + ?Sized,
    {
        stats.state = PassState::Fetching;
        let snapshot = self.take_snapshot(env)?;
        info!(
            references = snapshot.references.len(),
            blips = snapshot.blips.len(),
            live_tables = snapshot.live_tables.len(),
            "collection pass started"
        );

        let mut tracker = TableDirectoryTracker::new();
        let mut cursor = String::new();

        loop {
            stats.state = PassState::Fetching;
            let page = env
                .candidates(&cursor, self.config.candidate_batch_size)
                .map_err(CollectError::env("candidates"))?;

            let Some(last) = page.last() else {
                break;
            };
            if !cursor.is_empty() && last.as_str() <= cursor.as_str() {
                return Err(CollectError::CursorStalled { cursor });
            }
            cursor = last.clone();

            stats.pages += 1;
            stats.candidates += page.len() as u64;
            env.increment_candidates_stat(page.len() as u64);
            debug!(page = stats.pages, size = page.len(), %cursor, "fetched candidate page");

            stats.state = PassState::Reconciling;
            let confirmed = self.reconcile_page(page, &snapshot, &mut tracker, env, stats)?;

            if confirmed.is_empty() {
                continue;
            }
            stats.state = PassState::Deleting;
            self.delete_confirmed(env, confirmed, &mut tracker, stats)?;
        }

        stats.state = PassState::CleaningTableDirs;
        self.clean_table_dirs(env, &snapshot, &tracker, stats)
    }

    /// Reads references, blips, and live table ids.
    fn take_snapshot<E>(&self, env: &mut E) -> Result<Snapshot, CollectError>
    where
        E: GcEnvironment + ?Sized,
    {
        let normalizer = &self.config.normalizer;

        let mut references = ReferenceIndex::new();
        for entry in env
            .references()
            .map_err(CollectError::env("references"))?
        {
            let entry = entry.map_err(CollectError::env("references"))?;
            references.insert(metadata::resolve(&entry, normalizer)?);
        }

        let mut blips = BlipGuard::new();
        for blip in env.blips().map_err(CollectError::env("blips"))? {
            let blip = blip.map_err(CollectError::env("blips"))?;
            blips.insert_path(&blip, normalizer)?;
        }

        let live_tables = env.table_ids().map_err(CollectError::env("table_ids"))?;

        Ok(Snapshot {
            references,
            blips,
            live_tables,
        })
    }

    /// Normalizes a page and drops everything still referenced or under a
    /// bulk load. Returns the candidates confirmed for deletion.
    fn reconcile_page<E>(
        &self,
        page: Vec<String>,
        snapshot: &Snapshot,
        tracker: &mut TableDirectoryTracker,
        env: &mut E,
        stats: &mut PassStats,
    ) -> Result<Vec<Candidate>, CollectError>
    where
        E: GcEnvironment + ?Sized,
    {
        let mut candidates = Vec::with_capacity(page.len());
        for literal in page {
            let key = self.config.normalizer.normalize(&literal)?;
            candidates.push(Candidate::new(literal, key));
        }

        let reconciled = snapshot.references.reconcile(candidates);
        let mut confirmed = reconciled.unreferenced;
        let protected = snapshot.blips.retain_unprotected(&mut confirmed);

        for candidate in reconciled.in_use.iter().chain(&protected) {
            tracker.record_retained(&candidate.key);
        }

        let retained = (reconciled.in_use.len() + protected.len()) as u64;
        stats.in_use += reconciled.in_use.len() as u64;
        stats.blip_protected += protected.len() as u64;
        stats.confirmed += confirmed.len() as u64;
        env.increment_in_use_stat(retained);

        Ok(confirmed)
    }

    /// Deletes one page worth of confirmed candidates, applying the
    /// configured failure policy.
    fn delete_confirmed<E>(
        &self,
        env: &mut E,
        confirmed: Vec<Candidate>,
        tracker: &mut TableDirectoryTracker,
        stats: &mut PassStats,
    ) -> Result<(), CollectError>
    where
        E: GcEnvironment + ?Sized,
    {
        if self.config.safe_mode {
            for candidate in &confirmed {
                warn!(candidate = %candidate.literal, "safe mode: would delete");
                tracker.record_retained(&candidate.key);
            }
            return Ok(());
        }

        let mut pending = confirmed;
        let mut outcome = env.delete(&pending).map_err(CollectError::env("delete"))?;
        let mut attempts = 0;

        let failed = loop {
            let failed: HashSet<&str> = outcome.failed.iter().map(String::as_str).collect();
            let (still_failed, removed): (Vec<Candidate>, Vec<Candidate>) = pending
                .into_iter()
                .partition(|c| failed.contains(c.literal.as_str()));

            for candidate in &removed {
                tracker.record_deleted(&candidate.key);
            }
            stats.deleted += removed.len() as u64;

            if still_failed.is_empty() || attempts >= self.config.delete_failure_policy.max_retries()
            {
                break still_failed;
            }

            attempts += 1;
            stats.delete_retries += still_failed.len() as u64;
            debug!(attempt = attempts, count = still_failed.len(), "retrying failed deletes");
            pending = still_failed;
            outcome = env.delete(&pending).map_err(CollectError::env("delete"))?;
        };

        for candidate in &failed {
            warn!(candidate = %candidate.literal, "delete failed, deferring to next pass");
            tracker.record_retained(&candidate.key);
        }
        stats.delete_failures += failed.len() as u64;
        Ok(())
    }

    fn clean_table_dirs<E>(
        &self,
        env: &mut E,
        snapshot: &Snapshot,
        tracker: &TableDirectoryTracker,
        stats: &mut PassStats,
    ) -> Result<(), CollectError>
    where
        E: GcEnvironment + ?Sized,
    {
        let tables = tracker.tables_to_remove(&snapshot.live_tables, &snapshot.references);
        for table_id in tables {
            debug!(%table_id, "removing table directory if empty");
            env.delete_table_dir_if_empty(&table_id)
                .map_err(CollectError::env("delete_table_dir_if_empty"))?;
            stats.table_dirs_removed += 1;
        }
        Ok(())
    }
}
