//! # Reference Index
//!
//! Per-pass lookup structure built from the metadata reference scan.
//!
//! ## Matching rules
//!
//! - A **file** candidate is in use only if the exact file key is
//!   referenced. A directory reference for its tablet does *not* protect
//!   it: a tablet directory routinely holds files that compaction has
//!   already replaced.
//! - A **directory** candidate is in use if the directory is referenced,
//!   or if any referenced file lives inside it. Removing the directory
//!   would otherwise destroy a live file.
//!
//! The index also remembers which table ids are targeted by at least one
//! reference, so table-directory cleanup can tell whether anything under a
//! dropped table is still alive.
//!
//! The index is never cached across passes; metadata changes between
//! passes and must be re-scanned every time.

#[cfg(test)]
mod tests;

use std::collections::HashSet;

use tracing::debug;

use crate::env::Candidate;
use crate::metadata::Reference;
use crate::path::TabletPath;

/// Snapshot of all live references for one pass.
#[derive(Debug, Default)]
pub struct ReferenceIndex {
    files: HashSet<TabletPath>,
    directories: HashSet<TabletPath>,
    tables: HashSet<String>,
    entries: usize,
}

/// Split of one page of candidates.
#[derive(Debug, Default)]
pub struct Reconciled {
    /// Candidates with no live reference.
    pub unreferenced: Vec<Candidate>,
    /// Candidates still referenced by metadata.
    pub in_use: Vec<Candidate>,
}

impl ReferenceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, reference: Reference) {
        self.entries += 1;
        let key = match reference {
            Reference::File(key) => {
                self.directories.insert(key.parent_directory());
                key
            }
            Reference::Directory(key) => key,
        };
        if !self.tables.contains(key.table_id()) {
            self.tables.insert(key.table_id().to_string());
        }
        if key.is_directory() {
            self.directories.insert(key);
        } else {
            self.files.insert(key);
        }
    }

    /// `true` if the key is kept alive by a reference.
    pub fn is_referenced(&self, key: &TabletPath) -> bool {
        if key.is_directory() {
            self.directories.contains(key)
        } else {
            self.files.contains(key)
        }
    }

    /// `true` if any reference points into the given table.
    pub fn references_table(&self, table_id: &str) -> bool {
        self.tables.contains(table_id)
    }

    /// Number of metadata entries folded into the index.
    pub fn len(&self) -> usize {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    /// Splits a page of candidates into unreferenced and in-use sets,
    /// preserving input order in both.
    pub fn reconcile(&self, page: Vec<Candidate>) -> Reconciled {
        let mut reconciled = Reconciled::default();
        for candidate in page {
            if self.is_referenced(&candidate.key) {
                debug!(candidate = %candidate.literal, key = %candidate.key, "candidate still in use");
                reconciled.in_use.push(candidate);
            } else {
                reconciled.unreferenced.push(candidate);
            }
        }
        reconciled
    }
}

impl FromIterator<Reference> for ReferenceIndex {
    fn from_iter<I: IntoIterator<Item = Reference>>(iter: I) -> Self {
        let mut index = Self::new();
        for reference in iter {
            index.insert(reference);
        }
        index
    }
}
