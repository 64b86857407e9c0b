//! # Path Normalization
//!
//! Every file or directory the collector reasons about lives under a
//! table's directory tree and can be spelled two ways:
//!
//! - **absolute**: `scheme://host:port/<base>/<tables>/<tableId>/<tabletDir>[/<file>]`
//! - **relative**: `/<tableId>/<tabletDir>[/<file>]`, optionally prefixed
//!   with `../` when written relative to another table's directory.
//!
//! [`PathNormalizer`] strips scheme, authority, and base directory and
//! produces a structural [`TabletPath`] key. Two spellings that name the
//! same logical target always produce equal keys, regardless of host
//! aliases or repeated/trailing slashes. That equality is what lets a
//! relative candidate be matched by an absolute reference and vice versa.
//!
//! ## Failure model
//!
//! Normalization never guesses. A path that does not decompose into at
//! least a table id and a tablet directory is rejected with a
//! [`PathError`]; the caller is expected to abort the pass.


use std::fmt;

use thiserror::Error;

/// Default name of the directory that holds one sub-directory per table.
pub const DEFAULT_TABLES_DIR: &str = "tables";

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned when a path cannot be decomposed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    /// The path was empty or contained only slashes.
    #[error("empty path")]
    Empty,

    /// Absolute path with no `<tables>/<tableId>/<tabletDir>` suffix.
    #[error("path {path:?} is not under a `{tables_dir}` directory")]
    NotUnderTablesDir { path: String, tables_dir: String },

    /// Relative path with the wrong number of segments.
    #[error("path {path:?} has {found} segment(s), expected {expected}")]
    WrongDepth {
        path: String,
        found: usize,
        expected: &'static str,
    },

    /// A `.` or `..` segment survived normalization.
    #[error("path {path:?} contains a relative segment")]
    RelativeSegment { path: String },
}

// ------------------------------------------------------------------------------------------------
// TabletPath
// ------------------------------------------------------------------------------------------------

/// Structural key of a table file or tablet directory.
///
/// Ordering is `(table_id, tablet_dir, file)` with `file = None` sorting
/// first, so a directory key always precedes the keys of files inside it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TabletPath {
    table_id: String,
    tablet_dir: String,
    file: Option<String>,
}

impl TabletPath {
    /// Key of a tablet directory.
    pub fn directory(table_id: impl Into<String>, tablet_dir: impl Into<String>) -> Self {
        Self {
            table_id: table_id.into(),
            tablet_dir: tablet_dir.into(),
            file: None,
        }
    }

    /// Key of a file inside a tablet directory.
    pub fn file(
        table_id: impl Into<String>,
        tablet_dir: impl Into<String>,
        file: impl Into<String>,
    ) -> Self {
        Self {
            table_id: table_id.into(),
            tablet_dir: tablet_dir.into(),
            file: Some(file.into()),
        }
    }

    pub fn table_id(&self) -> &str {
        &self.table_id
    }

    pub fn tablet_dir(&self) -> &str {
        &self.tablet_dir
    }

    pub fn file_name(&self) -> Option<&str> {
        self.file.as_deref()
    }

    /// `true` when this key names a tablet directory rather than a file.
    pub fn is_directory(&self) -> bool {
        self.file.is_none()
    }

    /// Key of the tablet directory this path lives in (itself for directories).
    pub fn parent_directory(&self) -> TabletPath {
        Self::directory(self.table_id.clone(), self.tablet_dir.clone())
    }
}

impl fmt::Display for TabletPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.file {
            Some(file) => write!(f, "{}/{}/{}", self.table_id, self.tablet_dir, file),
            None => write!(f, "{}/{}", self.table_id, self.tablet_dir),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PathShape
// ------------------------------------------------------------------------------------------------

/// Which decompositions a caller is willing to accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathShape {
    /// File or directory.
    Any,
    /// Must be `<tableId>/<tabletDir>/<file>`.
    File,
    /// Must be `<tableId>/<tabletDir>`.
    Directory,
}

impl PathShape {
    fn allows_file(self) -> bool {
        matches!(self, Self::Any | Self::File)
    }

    fn allows_directory(self) -> bool {
        matches!(self, Self::Any | Self::Directory)
    }

    fn expected(self) -> &'static str {
        match self {
            Self::Any => "2 or 3",
            Self::File => "3",
            Self::Directory => "2",
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PathNormalizer
// ------------------------------------------------------------------------------------------------

/// Canonicalizes absolute and relative paths into [`TabletPath`] keys.
#[derive(Debug, Clone)]
pub struct PathNormalizer {
    tables_dir: String,
}

impl Default for PathNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_TABLES_DIR)
    }
}

impl PathNormalizer {
    /// Creates a normalizer that recognizes `tables_dir` as the directory
    /// holding per-table sub-directories in absolute paths.
    pub fn new(tables_dir: impl Into<String>) -> Self {
        Self {
            tables_dir: tables_dir.into(),
        }
    }

    pub fn tables_dir(&self) -> &str {
        &self.tables_dir
    }

    /// Normalizes a path of either shape.
    pub fn normalize(&self, path: &str) -> Result<TabletPath, PathError> {
        self.normalize_as(path, PathShape::Any)
    }

    /// Normalizes a path, accepting only the given shape.
    pub fn normalize_as(&self, path: &str, shape: PathShape) -> Result<TabletPath, PathError> {
        if is_absolute(path) {
            self.normalize_absolute(path, shape)
        } else {
            normalize_relative(path, shape)
        }
    }

    fn normalize_absolute(&self, path: &str, shape: PathShape) -> Result<TabletPath, PathError> {
        let tokens = segments(path);
        let n = tokens.len();
        if n == 0 {
            return Err(PathError::Empty);
        }

        // The first segment is always the scheme (`hdfs:`), so the tables
        // directory can never be at index 0.
        if n > 4 && shape.allows_file() && tokens[n - 4] == self.tables_dir {
            check_segments(path, &tokens[n - 3..])?;
            return Ok(TabletPath::file(tokens[n - 3], tokens[n - 2], tokens[n - 1]));
        }
        if n > 3 && shape.allows_directory() && tokens[n - 3] == self.tables_dir {
            check_segments(path, &tokens[n - 2..])?;
            return Ok(TabletPath::directory(tokens[n - 2], tokens[n - 1]));
        }

        Err(PathError::NotUnderTablesDir {
            path: path.to_string(),
            tables_dir: self.tables_dir.clone(),
        })
    }
}

fn normalize_relative(path: &str, shape: PathShape) -> Result<TabletPath, PathError> {
    let trimmed = path.strip_prefix("../").unwrap_or(path);
    let tokens = segments(trimmed);
    check_segments(path, &tokens)?;

    match tokens.as_slice() {
        [] => Err(PathError::Empty),
        [table, dir, file] if shape.allows_file() => Ok(TabletPath::file(*table, *dir, *file)),
        [table, dir] if shape.allows_directory() => Ok(TabletPath::directory(*table, *dir)),
        _ => Err(PathError::WrongDepth {
            path: path.to_string(),
            found: tokens.len(),
            expected: shape.expected(),
        }),
    }
}

/// Absolute paths carry a scheme (`hdfs://`, `file:/`, `viewfs://`).
fn is_absolute(path: &str) -> bool {
    path.contains(':')
}

/// Splits on `/` and drops empty segments (`a//b/` → `[a, b]`).
fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn check_segments(path: &str, tokens: &[&str]) -> Result<(), PathError> {
    if tokens.iter().any(|t| *t == "." || *t == "..") {
        return Err(PathError::RelativeSegment {
            path: path.to_string(),
        });
    }
    Ok(())
}
