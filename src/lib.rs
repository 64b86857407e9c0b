//! # tablet-gc
//!
//! Garbage-collection reconciliation for a tablet-based distributed
//! key-value store. Given a log of paths that *might* no longer be needed
//! and a fresh scan of live metadata, the collector decides which paths
//! are provably unreferenced, deletes them, and removes the root
//! directories of dropped tables once they are empty.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tablet_gc::{GarbageCollector, GcConfig, GcEnvironment};
//!
//! fn run(env: &mut impl GcEnvironment) -> Result<(), tablet_gc::GcError> {
//!     let gc = GarbageCollector::new(GcConfig::default())?;
//!     let stats = gc.collect(env)?;
//!     println!("deleted {} of {} candidates", stats.deleted, stats.candidates);
//!     Ok(())
//! }
//! ```
//!
//! ## Safety rules
//!
//! - **Absolute and relative spellings are one target**: a reference in
//!   either form protects a candidate in either form.
//! - **Directory references do not protect files**: only an explicit
//!   file reference keeps a file alive.
//! - **Bulk loads win**: anything under an active bulk-load marker is
//!   kept, referenced or not.
//! - **Never guess**: a path that does not decompose into table id and
//!   tablet directory aborts the pass.
//! - **Fresh view per pass**: references, markers, and table ids are
//!   scanned once at the start of every pass and never cached across passes.
//!
//! The storage side (candidate log, metadata scan, filesystem) is supplied
//! through [`GcEnvironment`]. [`LocalVolume`] implements the physical
//! deletion half for a local directory tree.

pub mod blip;
pub mod env;
pub mod gc;
pub mod metadata;
pub mod path;
pub mod reference;
pub mod tabledir;
pub mod volume;

use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;
use tracing::{debug, info};

pub use env::{Candidate, DeleteOutcome, EnvError, GcEnvironment, Scan};
pub use gc::{
    CollectError, DeleteFailurePolicy, GcAlgorithm, PassConfig, PassFailure, PassState, PassStats,
};
pub use metadata::{MetadataEntry, MetadataError, Reference};
pub use path::{PathError, PathNormalizer, PathShape, TabletPath};
pub use volume::{LocalVolume, VolumeConfig};

// ------------------------------------------------------------------------------------------------
// Configuration
// ------------------------------------------------------------------------------------------------

/// Configuration for a [`GarbageCollector`].
///
/// All fields have sensible defaults via [`GcConfig::default()`].
/// The configuration is validated when passed to [`GarbageCollector::new`].
///
/// # Example
///
/// ```rust
/// use tablet_gc::{DeleteFailurePolicy, GcConfig};
///
/// let config = GcConfig {
///     candidate_batch_size: 500,
///     delete_failure_policy: DeleteFailurePolicy::Retry { max_attempts: 2 },
///     ..GcConfig::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct GcConfig {
    /// Number of candidates requested from the log per page. Each page is
    /// reconciled and deleted before the next one is fetched.
    ///
    /// Default: 1000. Must be ≥ 1.
    pub candidate_batch_size: usize,

    /// Name of the directory holding per-table directories in absolute
    /// paths (`hdfs://host/<base>/<tables_dir>/<tableId>/...`).
    ///
    /// Default: `"tables"`. Must be non-empty and contain no `/`.
    pub tables_dir: String,

    /// Handling of paths a delete call reports as not removed.
    ///
    /// Default: [`DeleteFailurePolicy::Defer`].
    pub delete_failure_policy: DeleteFailurePolicy,

    /// When `true`, passes reconcile and report but never delete anything.
    ///
    /// Default: `false`.
    pub safe_mode: bool,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            candidate_batch_size: 1000,
            tables_dir: path::DEFAULT_TABLES_DIR.to_string(),
            delete_failure_policy: DeleteFailurePolicy::Defer,
            safe_mode: false,
        }
    }
}

impl GcConfig {
    /// Validates all configuration parameters.
    fn validate(&self) -> Result<(), GcError> {
        if self.candidate_batch_size < 1 {
            return Err(GcError::InvalidConfig(
                "candidate_batch_size must be >= 1".into(),
            ));
        }
        if self.tables_dir.is_empty() || self.tables_dir.contains('/') {
            return Err(GcError::InvalidConfig(
                "tables_dir must be a single non-empty path segment".into(),
            ));
        }
        if let DeleteFailurePolicy::Retry { max_attempts: 0 } = self.delete_failure_policy {
            return Err(GcError::InvalidConfig(
                "delete_failure_policy retry needs max_attempts >= 1".into(),
            ));
        }
        Ok(())
    }

    /// Converts to the per-pass configuration.
    fn to_pass_config(&self) -> PassConfig {
        PassConfig {
            candidate_batch_size: self.candidate_batch_size,
            normalizer: PathNormalizer::new(self.tables_dir.clone()),
            delete_failure_policy: self.delete_failure_policy,
            safe_mode: self.safe_mode,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Error type
// ------------------------------------------------------------------------------------------------

/// Errors returned by [`GarbageCollector`] operations.
#[derive(Debug, Error)]
pub enum GcError {
    /// Invalid configuration parameter.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// A collection pass aborted.
    #[error("{0}")]
    Pass(#[from] Box<PassFailure>),
}

impl From<PassFailure> for GcError {
    fn from(failure: PassFailure) -> Self {
        Self::Pass(Box::new(failure))
    }
}

// ------------------------------------------------------------------------------------------------
// Collector handle
// ------------------------------------------------------------------------------------------------

/// The main collector handle.
///
/// Holds validated configuration only; every pass builds its reference
/// index, bulk-load guard, and table tracker from scratch. `GarbageCollector`
/// is `Send + Sync`, but running two passes concurrently against the same
/// tables is the scheduler's job to prevent.
#[derive(Debug)]
pub struct GarbageCollector {
    algorithm: GcAlgorithm,
    passes: AtomicU64,
}

impl GarbageCollector {
    /// Creates a collector.
    ///
    /// # Errors
    ///
    /// Returns [`GcError::InvalidConfig`] if any configuration parameter
    /// is out of range.
    pub fn new(config: GcConfig) -> Result<Self, GcError> {
        config.validate()?;

        info!(
            batch_size = config.candidate_batch_size,
            tables_dir = %config.tables_dir,
            policy = ?config.delete_failure_policy,
            safe_mode = config.safe_mode,
            "garbage collector created"
        );

        Ok(Self {
            algorithm: GcAlgorithm::new(config.to_pass_config()),
            passes: AtomicU64::new(0),
        })
    }

    /// Runs one collection pass.
    ///
    /// # Errors
    ///
    /// Returns [`GcError::Pass`] if a path or reference is malformed or a
    /// collaborator fails. Pages deleted before the failure stay deleted.
    pub fn collect<E>(&self, env: &mut E) -> Result<PassStats, GcError>
    where
        E: GcEnvironment + ?Sized,
    {
        let pass = self.passes.fetch_add(1, Ordering::Relaxed) + 1;
        let span = tracing::info_span!("gc_pass", pass);
        let _entered = span.enter();

        debug!("starting collection pass");
        Ok(self.algorithm.collect(env)?)
    }

    /// Number of passes started through this handle.
    pub fn passes_started(&self) -> u64 {
        self.passes.load(Ordering::Relaxed)
    }
}
