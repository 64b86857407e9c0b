//! # Collector Environment
//!
//! The collector owns no storage. Everything it reads (candidate log,
//! bulk-load markers, metadata references, live table ids) and everything
//! it changes (candidate files, table directories) goes through the
//! [`GcEnvironment`] trait.
//!
//! ## Contract
//!
//! - [`GcEnvironment::candidates`] pages through the candidate log in
//!   lexicographic order. Each call returns paths strictly greater than
//!   `after`; an empty page means the log is exhausted.
//! - [`GcEnvironment::blips`] and [`GcEnvironment::references`] are lazy,
//!   finite scans. The collector consumes each exactly once per pass.
//! - [`GcEnvironment::delete`] must be idempotent: deleting a path that is
//!   already gone is success. Paths it could not remove are reported in
//!   [`DeleteOutcome::failed`] and stay in the candidate log.
//! - [`GcEnvironment::delete_table_dir_if_empty`] is best-effort and may
//!   be called speculatively.

use std::collections::HashSet;

use thiserror::Error;

use crate::metadata::MetadataEntry;
use crate::path::TabletPath;

/// Lazy scan yielded by [`GcEnvironment::blips`] and [`GcEnvironment::references`].
pub type Scan<'a, T> = Box<dyn Iterator<Item = Result<T, EnvError>> + 'a>;

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Failures raised by a collaborator.
#[derive(Debug, Error)]
pub enum EnvError {
    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The backing service could not be reached.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Collaborator-side invariant violation.
    #[error("internal error: {0}")]
    Internal(String),
}

// ------------------------------------------------------------------------------------------------
// Candidate
// ------------------------------------------------------------------------------------------------

/// A deletion candidate: the literal path from the log and its normalized key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub literal: String,
    pub key: TabletPath,
}

impl Candidate {
    pub fn new(literal: impl Into<String>, key: TabletPath) -> Self {
        Self {
            literal: literal.into(),
            key,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// DeleteOutcome
// ------------------------------------------------------------------------------------------------

/// Result of one [`GcEnvironment::delete`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteOutcome {
    /// Literal paths that were not removed.
    pub failed: Vec<String>,
}

impl DeleteOutcome {
    /// Every path in the batch was removed.
    pub fn all_deleted() -> Self {
        Self::default()
    }

    pub fn with_failures(failed: Vec<String>) -> Self {
        Self { failed }
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

// ------------------------------------------------------------------------------------------------
// GcEnvironment
// ------------------------------------------------------------------------------------------------

/// Collaborators consumed by one collection pass.
pub trait GcEnvironment {
    /// Up to roughly `limit` candidate paths strictly greater than `after`,
    /// in ascending order. Empty when the log is exhausted.
    fn candidates(&mut self, after: &str, limit: usize) -> Result<Vec<String>, EnvError>;

    /// All active bulk-load directories.
    fn blips(&mut self) -> Result<Scan<'_, String>, EnvError>;

    /// All metadata entries that can reference a file or directory.
    fn references(&mut self) -> Result<Scan<'_, MetadataEntry>, EnvError>;

    /// Ids of tables that currently exist.
    fn table_ids(&mut self) -> Result<HashSet<String>, EnvError>;

    /// Removes the given candidates from storage and from the candidate log.
    fn delete(&mut self, candidates: &[Candidate]) -> Result<DeleteOutcome, EnvError>;

    /// Removes a table's root directory if nothing is left in it.
    fn delete_table_dir_if_empty(&mut self, table_id: &str) -> Result<(), EnvError>;

    fn increment_candidates_stat(&mut self, count: u64);

    fn increment_in_use_stat(&mut self, count: u64);
}
