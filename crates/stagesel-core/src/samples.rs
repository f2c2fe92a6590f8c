//! Sample-membership tables.
//!
//! A sample file lists, per model key, the matrix rows that belong to it.
//! Data lines are tab-separated: field 1 and field 3 form the key
//! (`<field1>_<field3>`), fields 4 onward are row indices. Lines starting
//! with `#` and blank lines are skipped.
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};

use crate::error::SelectionError;

const MIN_FIELDS: usize = 5;

/// Model key -> ordered row indices. Iterates in key order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SampleTable {
    entries: BTreeMap<String, Vec<usize>>,
}

impl SampleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the rows of `key`.
    pub fn insert(&mut self, key: impl Into<String>, rows: Vec<usize>) {
        self.entries.insert(key.into(), rows);
    }

    pub fn get(&self, key: &str) -> Option<&[usize]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, Vec<usize>)> for SampleTable {
    fn from_iter<I: IntoIterator<Item = (K, Vec<usize>)>>(iter: I) -> Self {
        let mut table = SampleTable::new();
        for (key, rows) in iter {
            table.insert(key, rows);
        }
        table
    }
}

/// Load a sample-membership file.
pub fn load_samples<P: AsRef<Path>>(path: P) -> Result<SampleTable> {
    let path = path.as_ref();
    let file = File::open(path)
        .with_context(|| format!("Failed to open sample file: {}", path.display()))?;
    parse_samples(BufReader::new(file), path)
}

/// Parse sample lines from any reader. `source` is only used in error messages.
pub fn parse_samples<R: BufRead>(reader: R, source: &Path) -> Result<SampleTable> {
    let mut table = SampleTable::new();

    for (line_idx, full_line) in reader.lines().enumerate() {
        let full_line =
            full_line.with_context(|| format!("Failed to read {}", source.display()))?;
        let line = full_line.trim_end();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < MIN_FIELDS {
            return Err(SelectionError::MalformedSampleLine {
                path: source.to_path_buf(),
                line: line_idx + 1,
                fields: fields.len(),
            }
            .into());
        }

        let rows = fields[4..]
            .iter()
            .map(|value| {
                value
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| SelectionError::InvalidRowIndex {
                        path: source.to_path_buf(),
                        line: line_idx + 1,
                        value: value.to_string(),
                    })
            })
            .collect::<Result<Vec<usize>, _>>()?;

        table.insert(format!("{}_{}", fields[1], fields[3]), rows);
    }

    log::debug!("Loaded {} sample keys from {}", table.len(), source.display());
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn parse(text: &str) -> Result<SampleTable> {
        parse_samples(Cursor::new(text), Path::new("inline"))
    }

    #[test]
    fn comment_and_blank_lines_are_skipped() {
        let table = parse("#comment\n\n5\tA\t0\tfull\t1\t2\t3\n").unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.get("A_full"), Some(&[1, 2, 3][..]));
    }

    #[test]
    fn trailing_whitespace_is_stripped() {
        let table = parse("x\t3\ty\tfold0\t7\t8  \r\n").unwrap();
        assert_eq!(table.get("3_fold0"), Some(&[7, 8][..]));
    }

    #[test]
    fn duplicate_rows_propagate() {
        let table = parse("x\t3\ty\tfull\t4\t4\t1\n").unwrap();
        assert_eq!(table.get("3_full"), Some(&[4, 4, 1][..]));
    }

    #[test]
    fn later_line_replaces_earlier_key() {
        let table = parse("x\t3\ty\tfull\t1\nx\t3\ty\tfull\t2\t5\n").unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.get("3_full"), Some(&[2, 5][..]));
    }

    #[test]
    fn short_line_reports_line_number() {
        let err = parse("#header\nx\t3\ty\tfull\n").unwrap_err();
        match err.downcast_ref::<SelectionError>() {
            Some(SelectionError::MalformedSampleLine { line, fields, .. }) => {
                assert_eq!(*line, 2);
                assert_eq!(*fields, 4);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn non_integer_row_is_rejected() {
        let err = parse("x\t3\ty\tfull\t1\tabc\n").unwrap_err();
        match err.downcast_ref::<SelectionError>() {
            Some(SelectionError::InvalidRowIndex { value, .. }) => assert_eq!(value, "abc"),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
