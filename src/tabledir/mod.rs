//! # Table Directory Cleanup
//!
//! When a table is dropped, its tablet directories eventually show up as
//! deletion candidates. Once the last of them is gone, the table's own
//! root directory is empty and can be removed too.
//!
//! [`TableDirectoryTracker`] collects, over one pass:
//!
//! - table ids for which a tablet **directory** was deleted, and
//! - table ids for which some candidate was **retained** (still
//!   referenced, under an active bulk load, or failed to delete).
//!
//! At the end of the pass, a table's root directory is eligible for
//! removal when a directory was deleted under it, the table no longer
//! exists, nothing was retained under it, and no reference targets it.


use std::collections::{BTreeSet, HashSet};

use crate::path::TabletPath;
use crate::reference::ReferenceIndex;

#[derive(Debug, Default)]
pub struct TableDirectoryTracker {
    deleted_dirs: BTreeSet<String>,
    retained: HashSet<String>,
}

impl TableDirectoryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a candidate confirmed deleted this pass.
    pub fn record_deleted(&mut self, key: &TabletPath) {
        if key.is_directory() && !self.deleted_dirs.contains(key.table_id()) {
            self.deleted_dirs.insert(key.table_id().to_string());
        }
    }

    /// Records a candidate that stays in the log after this pass.
    pub fn record_retained(&mut self, key: &TabletPath) {
        if !self.retained.contains(key.table_id()) {
            self.retained.insert(key.table_id().to_string());
        }
    }

    /// Table ids whose root directory should be removed, sorted and deduplicated.
    pub fn tables_to_remove(
        &self,
        live_tables: &HashSet<String>,
        references: &ReferenceIndex,
    ) -> Vec<String> {
        self.deleted_dirs
            .iter()
            .filter(|table| !live_tables.contains(*table))
            .filter(|table| !self.retained.contains(*table))
            .filter(|table| !references.references_table(table))
            .cloned()
            .collect()
    }
}
