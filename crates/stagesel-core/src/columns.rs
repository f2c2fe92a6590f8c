//! Target column identifiers and per-key target column resolution.
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::error::SelectionError;
use crate::keys::key_prefix;

/// Read a newline-delimited list, dropping trailing whitespace and blank lines.
pub fn load_list<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read list file: {}", path.display()))?;
    Ok(content
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// Target matrix column encoded in a model key's prefix.
pub fn target_column_index(key: &str) -> Result<usize, SelectionError> {
    key_prefix(key)
        .parse::<usize>()
        .map_err(|_| SelectionError::InvalidModelKey(key.to_string()))
}

/// Resolved target columns for the keys of one run.
#[derive(Debug, Clone)]
pub struct TargetColumns {
    names: Vec<String>,
    indices: BTreeMap<String, usize>,
}

impl TargetColumns {
    /// Resolve every key against a target matrix with `ncols` columns.
    ///
    /// `names` is the target column identifier list; it only labels columns
    /// and a length that disagrees with `ncols` is tolerated.
    pub fn resolve<'a, I>(names: Vec<String>, keys: I, ncols: usize) -> Result<Self>
    where
        I: IntoIterator<Item = &'a str>,
    {
        if !names.is_empty() && names.len() != ncols {
            log::warn!(
                "Target column list has {} entries but the target matrix has {} columns",
                names.len(),
                ncols
            );
        }

        let mut indices = BTreeMap::new();
        for key in keys {
            let column = target_column_index(key)?;
            if column >= ncols {
                return Err(SelectionError::TargetColumnOutOfRange {
                    key: key.to_string(),
                    column,
                    ncols,
                }
                .into());
            }
            indices.insert(key.to_string(), column);
        }

        Ok(Self { names, indices })
    }

    pub fn index_of(&self, key: &str) -> Option<usize> {
        self.indices.get(key).copied()
    }

    /// Identifier of a target column, if the list covers it.
    pub fn name_of(&self, column: usize) -> Option<&str> {
        self.names.get(column).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}
