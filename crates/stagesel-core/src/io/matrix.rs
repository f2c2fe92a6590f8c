//! Numeric matrix readers.
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use ndarray::Array2;
use ndarray_npy::read_npy;

use crate::columns::load_list;
use crate::config::with_suffix;
use crate::error::SelectionError;

/// One imputed version of the feature matrix with its column names.
#[derive(Debug, Clone)]
pub struct ImputedMatrix {
    pub data: Array2<f64>,
    pub names: Vec<String>,
}

/// Read a 1-D numpy unicode string array (`<U` dtype), as written by
/// `np.save` for a list of column names. NUL padding is stripped.
pub fn load_names_npy<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read names file: {}", path.display()))?;
    let npy = npyz::NpyFile::new(&bytes[..])
        .with_context(|| format!("Invalid .npy header in {}", path.display()))?;
    if npy.shape().len() != 1 {
        bail!(
            "Expected a 1-D name array in {}, found shape {:?}",
            path.display(),
            npy.shape()
        );
    }
    let names: Vec<Vec<char>> = npy
        .into_vec()
        .with_context(|| format!("Expected a unicode string array in {}", path.display()))?;

    Ok(names
        .into_iter()
        .map(|chars| {
            let name: String = chars.into_iter().collect();
            name.trim_end_matches('\0').to_string()
        })
        .collect())
}

/// Read `<stem>.npy` (2-D, float64) and its column names.
///
/// Names come from `<stem>_names.npy` when present, otherwise from
/// `<stem>_names.txt` with one name per line.
pub fn load_imputed_matrix<P: AsRef<Path>>(stem: P) -> Result<ImputedMatrix> {
    let stem = stem.as_ref();
    let data_path = with_suffix(stem, ".npy");

    let data: Array2<f64> = read_npy(&data_path)
        .with_context(|| format!("Failed to read matrix: {}", data_path.display()))?;

    let npy_names = with_suffix(stem, "_names.npy");
    let (names_path, names) = if npy_names.is_file() {
        let names = load_names_npy(&npy_names)?;
        (npy_names, names)
    } else {
        let txt_names = with_suffix(stem, "_names.txt");
        let names = load_list(&txt_names)?;
        (txt_names, names)
    };

    if names.len() != data.ncols() {
        return Err(SelectionError::ShapeMismatch {
            what: format!("column names in {}", names_path.display()),
            expected: data.ncols(),
            found: names.len(),
        }
        .into());
    }

    log::debug!(
        "Loaded {} ({} rows x {} columns)",
        data_path.display(),
        data.nrows(),
        data.ncols()
    );
    Ok(ImputedMatrix { data, names })
}

/// Read the comma-delimited target matrix `<stem>.txt`. No header row.
pub fn load_target_matrix<P: AsRef<Path>>(stem: P) -> Result<Array2<f64>> {
    let path = with_suffix(stem.as_ref(), ".txt");
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b',')
        .has_headers(false)
        .trim(csv::Trim::All)
        .from_path(&path)
        .with_context(|| format!("Failed to open target matrix: {}", path.display()))?;

    let mut values = Vec::new();
    let mut ncols = 0;
    let mut nrows = 0;
    for (row_idx, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("Failed to read row {}", row_idx + 1))?;
        if row_idx == 0 {
            ncols = record.len();
        }
        for value in record.iter() {
            let parsed = value.parse::<f64>().with_context(|| {
                format!("Invalid value '{}' at row {} of {}", value, row_idx + 1, path.display())
            })?;
            values.push(parsed);
        }
        nrows += 1;
    }

    if nrows == 0 {
        return Err(anyhow!("Target matrix {} is empty", path.display()));
    }

    Array2::from_shape_vec((nrows, ncols), values)
        .with_context(|| format!("Failed to build target matrix from {}", path.display()))
}
