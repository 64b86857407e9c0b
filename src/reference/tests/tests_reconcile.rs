//! Reference index construction and page reconciliation.
//!
//! Coverage:
//! - File references protect exactly their file
//! - Directory references do not protect files beneath them
//! - File references protect their enclosing tablet directory
//! - Table-level bookkeeping for table-directory cleanup
//! - Order preservation in the reconciled split

#[cfg(test)]
mod tests {
    use crate::env::Candidate;
    use crate::metadata::Reference;
    use crate::path::{PathNormalizer, TabletPath};
    use crate::reference::ReferenceIndex;

    fn candidate(path: &str) -> Candidate {
        Candidate::new(path, PathNormalizer::default().normalize(path).unwrap())
    }

    fn literals(candidates: &[Candidate]) -> Vec<&str> {
        candidates.iter().map(|c| c.literal.as_str()).collect()
    }

    #[test]
    fn empty_index_references_nothing() {
        let index = ReferenceIndex::new();
        assert!(index.is_empty());
        assert!(!index.is_referenced(&TabletPath::file("4", "t0", "F.rf")));
        assert!(!index.is_referenced(&TabletPath::directory("4", "t0")));
        assert!(!index.references_table("4"));
    }

    #[test]
    fn file_reference_protects_only_that_file() {
        let index: ReferenceIndex =
            [Reference::File(TabletPath::file("4", "t0", "F000.rf"))]
                .into_iter()
                .collect();

        assert!(index.is_referenced(&TabletPath::file("4", "t0", "F000.rf")));
        assert!(!index.is_referenced(&TabletPath::file("4", "t0", "F001.rf")));
        assert!(!index.is_referenced(&TabletPath::file("5", "t0", "F000.rf")));
        assert_eq!(index.len(), 1);
    }

    /// # Scenario
    /// A directory reference exists for `(4, t0)`; a file candidate
    /// `4/t0/F002.rf` has no file reference.
    ///
    /// # Expected behavior
    /// The file is unreferenced; the directory is referenced.
    #[test]
    fn directory_reference_does_not_protect_files() {
        let index: ReferenceIndex = [Reference::Directory(TabletPath::directory("4", "t0"))]
            .into_iter()
            .collect();

        assert!(!index.is_referenced(&TabletPath::file("4", "t0", "F002.rf")));
        assert!(index.is_referenced(&TabletPath::directory("4", "t0")));
    }

    /// # Scenario
    /// Only a file reference `8/t-0/F00.rf` exists.
    ///
    /// # Expected behavior
    /// The tablet directory `8/t-0` holding it counts as referenced.
    #[test]
    fn file_reference_keeps_its_directory_alive() {
        let index: ReferenceIndex = [Reference::File(TabletPath::file("8", "t-0", "F00.rf"))]
            .into_iter()
            .collect();

        assert!(index.is_referenced(&TabletPath::directory("8", "t-0")));
        assert!(!index.is_referenced(&TabletPath::directory("8", "t-1")));
    }

    #[test]
    fn tables_targeted_by_references() {
        let index: ReferenceIndex = [
            Reference::File(TabletPath::file("4", "t0", "F.rf")),
            Reference::Directory(TabletPath::directory("7", "t-0")),
        ]
        .into_iter()
        .collect();

        assert!(index.references_table("4"));
        assert!(index.references_table("7"));
        assert!(!index.references_table("5"));
    }

    #[test]
    fn reconcile_splits_page_in_order() {
        let index: ReferenceIndex = [
            Reference::File(TabletPath::file("4", "t0", "F001.rf")),
            Reference::Directory(TabletPath::directory("6", "t-0")),
        ]
        .into_iter()
        .collect();

        let page = vec![
            candidate("/4/t0/F000.rf"),
            candidate("/4/t0/F001.rf"),
            candidate("/6/t-0"),
            candidate("hdfs://foo:6000/accumulo/tables/6/t-0/F9.rf"),
            candidate("hdfs://foo:6000/accumulo/tables/4/t0/F001.rf"),
        ];

        let reconciled = index.reconcile(page);
        assert_eq!(
            literals(&reconciled.unreferenced),
            vec!["/4/t0/F000.rf", "hdfs://foo:6000/accumulo/tables/6/t-0/F9.rf"]
        );
        assert_eq!(
            literals(&reconciled.in_use),
            vec![
                "/4/t0/F001.rf",
                "/6/t-0",
                "hdfs://foo:6000/accumulo/tables/4/t0/F001.rf"
            ]
        );
    }
}
