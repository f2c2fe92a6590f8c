//! Fold inversion.
//!
//! Sample files list, per key, the rows *held out* for that fold. The search
//! must train on everything else, so for a fold key the training rows are the
//! rows of its `_full` key minus its own rows. Full keys train on their own
//! rows unchanged.
use std::collections::{BTreeMap, HashSet};

use anyhow::Result;

use crate::error::SelectionError;
use crate::keys::{full_key_for, is_full_key};
use crate::samples::SampleTable;

/// Training rows of one model key, for the feature and the target matrix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainingRows {
    pub feature_rows: Vec<usize>,
    pub target_rows: Vec<usize>,
}

/// Model key -> training rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InverseSampleTable {
    entries: BTreeMap<String, TrainingRows>,
}

impl InverseSampleTable {
    pub fn get(&self, key: &str) -> Option<&TrainingRows> {
        self.entries.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TrainingRows)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn lookup<'a>(table: &'a SampleTable, table_name: &str, key: &str) -> Result<&'a [usize], SelectionError> {
    table
        .get(key)
        .ok_or_else(|| SelectionError::MissingSampleKey {
            table: table_name.to_string(),
            key: key.to_string(),
        })
}

/// Training rows of `key` within one sample table.
///
/// The result keeps the order of the `_full` rows; exclusion is by exact
/// index equality and nothing else is deduplicated.
pub fn invert_rows(table: &SampleTable, table_name: &str, key: &str) -> Result<Vec<usize>, SelectionError> {
    let own = lookup(table, table_name, key)?;
    if is_full_key(key) {
        return Ok(own.to_vec());
    }

    let full = lookup(table, table_name, &full_key_for(key))?;
    let held_out: HashSet<usize> = own.iter().copied().collect();
    Ok(full
        .iter()
        .copied()
        .filter(|row| !held_out.contains(row))
        .collect())
}

/// Invert every key against both sample tables.
///
/// Feature and target rows of a key must come out with equal length, since
/// the search pairs them row by row.
pub fn invert_folds<'a, I>(
    feature_samples: &SampleTable,
    target_samples: &SampleTable,
    keys: I,
) -> Result<InverseSampleTable>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut entries = BTreeMap::new();
    for key in keys {
        let feature_rows = invert_rows(feature_samples, "feature", key)?;
        let target_rows = invert_rows(target_samples, "target", key)?;
        if feature_rows.len() != target_rows.len() {
            return Err(SelectionError::AlignmentMismatch {
                key: key.to_string(),
                feature_rows: feature_rows.len(),
                target_rows: target_rows.len(),
            }
            .into());
        }
        log::trace!("{}: {} training rows", key, feature_rows.len());
        entries.insert(
            key.to_string(),
            TrainingRows {
                feature_rows,
                target_rows,
            },
        );
    }
    Ok(InverseSampleTable { entries })
}
