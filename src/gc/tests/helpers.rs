use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::ops::Bound;

use tracing_subscriber::EnvFilter;

use crate::env::{Candidate, DeleteOutcome, EnvError, GcEnvironment, Scan};
use crate::gc::{GcAlgorithm, PassConfig};
use crate::metadata::{
    DIRECTORY_QUALIFIER, FILE_FAMILY, MetadataEntry, SCAN_FAMILY, SERVER_FAMILY, tablet_row,
};

/// Initialize tracing subscriber controlled by `RUST_LOG` env var.
/// Safe to call multiple times; only the first call takes effect.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Algorithm with default settings.
pub fn algorithm() -> GcAlgorithm {
    init_tracing();
    GcAlgorithm::new(PassConfig::default())
}

/// Algorithm with a custom config.
pub fn algorithm_with(config: PassConfig) -> GcAlgorithm {
    init_tracing();
    GcAlgorithm::new(config)
}

/// `(row, family, qualifier)`: identity of a metadata entry.
type EntryKey = (String, String, String);

/// In-memory environment. The candidate log hands out pages of at most
/// `page_size` entries, so even small scenarios span several pages.
pub struct TestEnv {
    pub candidates: BTreeSet<String>,
    pub blips: Vec<String>,
    pub references: BTreeMap<EntryKey, String>,
    pub table_ids: HashSet<String>,

    /// Every literal passed to a successful delete, in call order.
    pub deletes: Vec<String>,
    pub table_dirs_to_delete: Vec<String>,

    pub page_size: usize,
    /// Remaining number of times deleting a literal should fail.
    pub delete_failures: HashMap<String, u32>,
    /// Collaborator operation that should return an error.
    pub fail_op: Option<&'static str>,
    /// Fail the candidate fetch after this many pages were served.
    pub fail_candidates_after_pages: Option<usize>,
    /// Ignore the cursor and always serve the first page.
    pub ignore_cursor: bool,
    /// End the reference scan with an error item instead of finishing cleanly.
    pub truncate_reference_scan: bool,

    pub delete_calls: usize,
    pub reference_scans: usize,
    pub blip_scans: usize,
    pub pages_served: usize,
    pub candidates_stat: u64,
    pub in_use_stat: u64,
}

impl Default for TestEnv {
    fn default() -> Self {
        Self {
            candidates: BTreeSet::new(),
            blips: Vec::new(),
            references: BTreeMap::new(),
            table_ids: HashSet::new(),
            deletes: Vec::new(),
            table_dirs_to_delete: Vec::new(),
            page_size: 3,
            delete_failures: HashMap::new(),
            fail_op: None,
            fail_candidates_after_pages: None,
            ignore_cursor: false,
            truncate_reference_scan: false,
            delete_calls: 0,
            reference_scans: 0,
            blip_scans: 0,
            pages_served: 0,
            candidates_stat: 0,
            in_use_stat: 0,
        }
    }
}

impl TestEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_candidates(&mut self, paths: &[&str]) {
        for path in paths {
            self.candidates.insert(path.to_string());
        }
    }

    pub fn add_file_reference(&mut self, table_id: &str, end_row: Option<&str>, file: &str) {
        self.references.insert(
            (tablet_row(table_id, end_row), FILE_FAMILY.into(), file.into()),
            "0,0".into(),
        );
    }

    pub fn remove_file_reference(&mut self, table_id: &str, end_row: Option<&str>, file: &str) {
        let removed = self
            .references
            .remove(&(tablet_row(table_id, end_row), FILE_FAMILY.to_string(), file.to_string()));
        assert!(removed.is_some(), "no file reference {table_id} {file}");
    }

    pub fn add_scan_reference(&mut self, table_id: &str, end_row: Option<&str>, file: &str) {
        self.references.insert(
            (tablet_row(table_id, end_row), SCAN_FAMILY.into(), file.into()),
            String::new(),
        );
    }

    pub fn add_dir_reference(&mut self, table_id: &str, end_row: Option<&str>, dir: &str) {
        self.references.insert(
            (
                tablet_row(table_id, end_row),
                SERVER_FAMILY.into(),
                DIRECTORY_QUALIFIER.into(),
            ),
            dir.into(),
        );
    }

    pub fn remove_dir_reference(&mut self, table_id: &str, end_row: Option<&str>) {
        let removed = self.references.remove(&(
            tablet_row(table_id, end_row),
            SERVER_FAMILY.to_string(),
            DIRECTORY_QUALIFIER.to_string(),
        ));
        assert!(removed.is_some(), "no dir reference for {table_id}");
    }

    /// Asserts that exactly `expected` were deleted since the last call,
    /// then forgets them.
    pub fn assert_removed(&mut self, expected: &[&str]) {
        for path in expected {
            let pos = self
                .deletes
                .iter()
                .position(|d| d == *path)
                .unwrap_or_else(|| panic!("{path} was not deleted; deletes = {:?}", self.deletes));
            self.deletes.remove(pos);
        }
        assert!(
            self.deletes.is_empty(),
            "unexpected deletes: {:?}",
            self.deletes
        );
    }

    fn check(&self, op: &'static str) -> Result<(), EnvError> {
        if self.fail_op == Some(op) {
            return Err(EnvError::Unavailable(format!("injected {op} failure")));
        }
        Ok(())
    }
}

impl GcEnvironment for TestEnv {
    fn candidates(&mut self, after: &str, limit: usize) -> Result<Vec<String>, EnvError> {
        self.check("candidates")?;
        if self
            .fail_candidates_after_pages
            .is_some_and(|n| self.pages_served >= n)
        {
            return Err(EnvError::Unavailable("candidate log went away".into()));
        }

        let lower = if self.ignore_cursor {
            Bound::Unbounded
        } else {
            Bound::Excluded(after.to_string())
        };
        let page: Vec<String> = self
            .candidates
            .range((lower, Bound::Unbounded))
            .take(limit.min(self.page_size))
            .cloned()
            .collect();

        if !page.is_empty() {
            self.pages_served += 1;
        }
        Ok(page)
    }

    fn blips(&mut self) -> Result<Scan<'_, String>, EnvError> {
        self.check("blips")?;
        self.blip_scans += 1;
        Ok(Box::new(self.blips.iter().cloned().map(Ok)))
    }

    fn references(&mut self) -> Result<Scan<'_, MetadataEntry>, EnvError> {
        self.check("references")?;
        self.reference_scans += 1;
        let entries = self.references.iter().map(|((row, family, qualifier), value)| {
            Ok(MetadataEntry {
                row: row.clone(),
                family: family.clone(),
                qualifier: qualifier.clone(),
                value: value.clone(),
            })
        });
        let tail = self
            .truncate_reference_scan
            .then(|| Err(EnvError::Internal("scanner closed mid-batch".into())));
        Ok(Box::new(entries.chain(tail)))
    }

    fn table_ids(&mut self) -> Result<HashSet<String>, EnvError> {
        self.check("table_ids")?;
        Ok(self.table_ids.clone())
    }

    fn delete(&mut self, candidates: &[Candidate]) -> Result<DeleteOutcome, EnvError> {
        self.check("delete")?;
        self.delete_calls += 1;

        let mut failed = Vec::new();
        for candidate in candidates {
            if let Some(remaining) = self.delete_failures.get_mut(&candidate.literal) {
                if *remaining > 0 {
                    *remaining -= 1;
                    failed.push(candidate.literal.clone());
                    continue;
                }
            }
            self.deletes.push(candidate.literal.clone());
            self.candidates.remove(&candidate.literal);
        }
        Ok(DeleteOutcome::with_failures(failed))
    }

    fn delete_table_dir_if_empty(&mut self, table_id: &str) -> Result<(), EnvError> {
        self.check("delete_table_dir_if_empty")?;
        self.table_dirs_to_delete.push(table_id.to_string());
        Ok(())
    }

    fn increment_candidates_stat(&mut self, count: u64) {
        self.candidates_stat += count;
    }

    fn increment_in_use_stat(&mut self, count: u64) {
        self.in_use_stat += count;
    }
}
