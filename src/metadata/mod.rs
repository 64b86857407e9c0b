//! # Metadata Reference Entries
//!
//! The reference scan yields raw metadata entries, already filtered to the
//! column families that can keep a file or directory alive:
//!
//! | family | qualifier      | value               | meaning                     |
//! |--------|----------------|---------------------|-----------------------------|
//! | `file` | file path      | `<size>,<entries>`  | data file of a tablet       |
//! | `scan` | file path      | unused              | file held by an active scan |
//! | `srv`  | `dir`          | directory path      | tablet directory            |
//!
//! Rows identify the owning tablet: `<tableId>;<endRow>`, or `<tableId><`
//! for the last (default) tablet of a table.
//!
//! File paths in qualifiers come in three spellings:
//!
//! - `/t-0/F00.rf`: relative to the owning table's directory,
//! - `../4/t-0/F00.rf`: relative to the tables directory (a file shared
//!   with another table, e.g. after a clone),
//! - an absolute URI.
//!
//! [`resolve`] turns an entry into a typed [`Reference`] keyed by
//! [`TabletPath`]. Any entry it cannot interpret is an error; the
//! collector never skips a reference it does not understand.


use thiserror::Error;

use crate::path::{PathError, PathNormalizer, PathShape, TabletPath};

pub const FILE_FAMILY: &str = "file";
pub const SCAN_FAMILY: &str = "scan";
pub const SERVER_FAMILY: &str = "srv";
pub const DIRECTORY_QUALIFIER: &str = "dir";

/// Separator between table id and end row in a tablet row.
const END_ROW_SEPARATOR: char = ';';
/// Marker that terminates the row of a table's default tablet.
const DEFAULT_TABLET_MARKER: char = '<';
/// Everything after this character in a file qualifier is a disambiguator.
const QUALIFIER_SUFFIX_SEPARATOR: char = '|';

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned when a metadata entry cannot be interpreted.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MetadataError {
    /// Row does not contain a table id.
    #[error("bad metadata row {0:?}")]
    BadRow(String),

    /// File qualifier is neither relative, parent-relative, nor absolute.
    #[error("bad file reference {0:?}")]
    BadFileReference(String),

    /// Directory value is neither absolute nor `/`-rooted.
    #[error("bad directory {0:?}")]
    BadDirectory(String),

    /// Entry from a column the reference scan should have filtered out.
    #[error("unexpected column {family}:{qualifier} in row {row:?}")]
    UnexpectedColumn {
        row: String,
        family: String,
        qualifier: String,
    },

    /// The resolved path did not normalize.
    #[error(transparent)]
    Path(#[from] PathError),
}

// ------------------------------------------------------------------------------------------------
// MetadataEntry
// ------------------------------------------------------------------------------------------------

/// One raw entry from the metadata reference scan.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct MetadataEntry {
    pub row: String,
    pub family: String,
    pub qualifier: String,
    pub value: String,
}

impl MetadataEntry {
    /// Data-file entry for the tablet `(table_id, end_row)`.
    pub fn file_reference(table_id: &str, end_row: Option<&str>, path: &str) -> Self {
        Self {
            row: tablet_row(table_id, end_row),
            family: FILE_FAMILY.to_string(),
            qualifier: path.to_string(),
            value: "0,0".to_string(),
        }
    }

    /// Scan-file entry for the tablet `(table_id, end_row)`.
    pub fn scan_reference(table_id: &str, end_row: Option<&str>, path: &str) -> Self {
        Self {
            row: tablet_row(table_id, end_row),
            family: SCAN_FAMILY.to_string(),
            qualifier: path.to_string(),
            value: String::new(),
        }
    }

    /// Directory entry for the tablet `(table_id, end_row)`.
    pub fn directory_reference(table_id: &str, end_row: Option<&str>, dir: &str) -> Self {
        Self {
            row: tablet_row(table_id, end_row),
            family: SERVER_FAMILY.to_string(),
            qualifier: DIRECTORY_QUALIFIER.to_string(),
            value: dir.to_string(),
        }
    }

    /// Id of the table owning the tablet this entry belongs to.
    pub fn owning_table(&self) -> Result<&str, MetadataError> {
        table_of_row(&self.row)
    }

    fn is_file_column(&self) -> bool {
        self.family == FILE_FAMILY || self.family == SCAN_FAMILY
    }

    fn is_directory_column(&self) -> bool {
        self.family == SERVER_FAMILY && self.qualifier == DIRECTORY_QUALIFIER
    }
}

/// Encodes a tablet row: `<tableId>;<endRow>` or `<tableId><`.
pub fn tablet_row(table_id: &str, end_row: Option<&str>) -> String {
    match end_row {
        Some(end) => format!("{table_id}{END_ROW_SEPARATOR}{end}"),
        None => format!("{table_id}{DEFAULT_TABLET_MARKER}"),
    }
}

/// Extracts the table id from a tablet row.
pub fn table_of_row(row: &str) -> Result<&str, MetadataError> {
    match row.find([END_ROW_SEPARATOR, DEFAULT_TABLET_MARKER]) {
        Some(0) | None => Err(MetadataError::BadRow(row.to_string())),
        Some(idx) => Ok(&row[..idx]),
    }
}

// ------------------------------------------------------------------------------------------------
// Reference resolution
// ------------------------------------------------------------------------------------------------

/// A live pointer from metadata, normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    File(TabletPath),
    Directory(TabletPath),
}

impl Reference {
    pub fn key(&self) -> &TabletPath {
        match self {
            Self::File(key) | Self::Directory(key) => key,
        }
    }
}

/// Interprets one metadata entry.
pub fn resolve(
    entry: &MetadataEntry,
    normalizer: &PathNormalizer,
) -> Result<Reference, MetadataError> {
    if entry.is_file_column() {
        let qualifier = strip_disambiguator(&entry.qualifier);
        let path = if qualifier.starts_with('/') {
            format!("/{}{}", entry.owning_table()?, qualifier)
        } else if qualifier.contains(':') || qualifier.starts_with("../") {
            qualifier.to_string()
        } else {
            return Err(MetadataError::BadFileReference(entry.qualifier.clone()));
        };

        let key = normalizer.normalize_as(&path, PathShape::File)?;
        Ok(Reference::File(key))
    } else if entry.is_directory_column() {
        let dir = entry.value.as_str();
        let path = if dir.contains(':') {
            dir.to_string()
        } else if dir.starts_with('/') {
            format!("/{}{}", entry.owning_table()?, dir)
        } else {
            return Err(MetadataError::BadDirectory(dir.to_string()));
        };

        let key = normalizer.normalize_as(&path, PathShape::Directory)?;
        Ok(Reference::Directory(key))
    } else {
        Err(MetadataError::UnexpectedColumn {
            row: entry.row.clone(),
            family: entry.family.clone(),
            qualifier: entry.qualifier.clone(),
        })
    }
}

fn strip_disambiguator(qualifier: &str) -> &str {
    qualifier
        .split_once(QUALIFIER_SUFFIX_SEPARATOR)
        .map_or(qualifier, |(path, _)| path)
}
