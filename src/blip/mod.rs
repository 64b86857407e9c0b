//! # Bulk-Load Guard
//!
//! A *blip* is a marker naming a tablet directory that a bulk import is
//! currently writing into. The import creates the marker before writing
//! any file and removes it only after the load commits or aborts, so
//! anything under an active blip may be mid-write and must not be
//! collected, even when no metadata references it yet.
//!
//! [`BlipGuard`] holds the blips observed at the start of one pass.
//! Blips are normalized to directory keys, so protection covers the
//! directory itself and every file inside it, in both absolute and
//! relative spelling. Matching is structural: a blip on `4/b-0` does not
//! cover `4/b-01`.


use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::env::Candidate;
use crate::path::{PathError, PathNormalizer, PathShape, TabletPath};

/// Active bulk-load directories for one pass, grouped by table id.
#[derive(Debug, Default)]
pub struct BlipGuard {
    blips: BTreeMap<String, BTreeSet<String>>,
}

impl BlipGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalizes a blip path and starts protecting it.
    pub fn insert_path(&mut self, path: &str, normalizer: &PathNormalizer) -> Result<(), PathError> {
        let key = normalizer.normalize_as(path, PathShape::Directory)?;
        self.insert(key);
        Ok(())
    }

    /// Protects a tablet directory. File keys protect their enclosing directory.
    pub fn insert(&mut self, key: TabletPath) {
        self.blips
            .entry(key.table_id().to_string())
            .or_default()
            .insert(key.tablet_dir().to_string());
    }

    /// `true` if the key is the blip directory or nested under it.
    pub fn is_protected(&self, key: &TabletPath) -> bool {
        self.blips
            .get(key.table_id())
            .is_some_and(|dirs| dirs.contains(key.tablet_dir()))
    }

    /// Number of distinct blip directories.
    pub fn len(&self) -> usize {
        self.blips.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.blips.is_empty()
    }

    /// Removes protected candidates from `candidates`, returning them.
    pub fn retain_unprotected(&self, candidates: &mut Vec<Candidate>) -> Vec<Candidate> {
        if self.is_empty() {
            return Vec::new();
        }

        let mut protected = Vec::new();
        candidates.retain(|candidate| {
            if self.is_protected(&candidate.key) {
                debug!(
                    candidate = %candidate.literal,
                    folder = %candidate.key.parent_directory(),
                    "folder has bulk processing flag"
                );
                protected.push(candidate.clone());
                false
            } else {
                true
            }
        });
        protected
    }
}
