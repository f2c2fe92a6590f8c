use std::error::Error;
use std::fmt;
use std::path::PathBuf;

/// Domain failures raised while assembling sample sets and dispatching searches.
///
/// Fallible functions in this crate return `anyhow::Result`; these variants are
/// raised through it so callers can `downcast_ref::<SelectionError>()`.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectionError {
    /// A data line of a sample file has fewer than five tab-separated fields.
    MalformedSampleLine {
        path: PathBuf,
        line: usize,
        fields: usize,
    },
    /// A row index field could not be parsed as an unsigned integer.
    InvalidRowIndex {
        path: PathBuf,
        line: usize,
        value: String,
    },
    /// The text before the first underscore of a model key is not a column offset.
    InvalidModelKey(String),
    /// A key (or the `_full` key it is inverted against) is absent from a sample table.
    MissingSampleKey { table: String, key: String },
    /// Feature and target training rows of one key differ in length after inversion.
    AlignmentMismatch {
        key: String,
        feature_rows: usize,
        target_rows: usize,
    },
    TargetColumnOutOfRange {
        key: String,
        column: usize,
        ncols: usize,
    },
    RowOutOfRange {
        key: String,
        matrix: String,
        row: usize,
        nrows: usize,
    },
    ShapeMismatch {
        what: String,
        expected: usize,
        found: usize,
    },
    UnknownModelType(String),
    /// One or more jobs of a variant batch failed; the keys are listed in order.
    BatchFailed { variant: String, keys: Vec<String> },
}

impl fmt::Display for SelectionError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SelectionError::MalformedSampleLine { path, line, fields } => write!(
                f,
                "{}:{}: expected at least 5 tab-separated fields, found {}",
                path.display(),
                line,
                fields
            ),
            SelectionError::InvalidRowIndex { path, line, value } => write!(
                f,
                "{}:{}: invalid row index '{}'",
                path.display(),
                line,
                value
            ),
            SelectionError::InvalidModelKey(key) => write!(
                f,
                "Model key '{}' does not start with a numeric target column",
                key
            ),
            SelectionError::MissingSampleKey { table, key } => {
                write!(f, "Key '{}' not found in {} samples", key, table)
            }
            SelectionError::AlignmentMismatch {
                key,
                feature_rows,
                target_rows,
            } => write!(
                f,
                "Model key '{}' has {} feature rows but {} target rows after inversion",
                key, feature_rows, target_rows
            ),
            SelectionError::TargetColumnOutOfRange { key, column, ncols } => write!(
                f,
                "Model key '{}' selects target column {} but the target matrix has {} columns",
                key, column, ncols
            ),
            SelectionError::RowOutOfRange {
                key,
                matrix,
                row,
                nrows,
            } => write!(
                f,
                "Model key '{}' references row {} of the {} matrix, which has {} rows",
                key, row, matrix, nrows
            ),
            SelectionError::ShapeMismatch {
                what,
                expected,
                found,
            } => write!(f, "{}: expected {}, found {}", what, expected, found),
            SelectionError::UnknownModelType(name) => write!(
                f,
                "Unknown model type: {}. Expected one of: lr, sv, rf",
                name
            ),
            SelectionError::BatchFailed { variant, keys } => write!(
                f,
                "{} batch failed for {} model key(s): {}",
                variant,
                keys.len(),
                keys.join(", ")
            ),
        }
    }
}

impl Error for SelectionError {}
