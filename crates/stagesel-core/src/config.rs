use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::SelectionError;

/// Model families the staged search is asked to evaluate.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CandidateModel {
    #[serde(rename = "lr")]
    LogisticRegression,
    #[serde(rename = "sv")]
    SupportVector,
    #[serde(rename = "rf")]
    RandomForest,
}

impl CandidateModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateModel::LogisticRegression => "lr",
            CandidateModel::SupportVector => "sv",
            CandidateModel::RandomForest => "rf",
        }
    }
}

impl fmt::Display for CandidateModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CandidateModel {
    type Err = SelectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "lr" => Ok(CandidateModel::LogisticRegression),
            "sv" | "svm" => Ok(CandidateModel::SupportVector),
            "rf" => Ok(CandidateModel::RandomForest),
            _ => Err(SelectionError::UnknownModelType(s.to_string())),
        }
    }
}

/// Which model keys are dispatched to the search.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CrossfoldMode {
    /// Only keys ending in `_full`. Use when a separate evaluation set exists.
    #[default]
    FullOnly,
    /// Every key: full keys train on their own rows, fold keys on the
    /// complement of the held-out fold.
    ModuloFold,
}

/// The two independently imputed versions of the feature matrix.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImputationVariant {
    #[serde(rename = "mImp")]
    MImp,
    #[serde(rename = "rImp")]
    RImp,
}

impl ImputationVariant {
    /// Batches run in this order.
    pub const ALL: [ImputationVariant; 2] = [ImputationVariant::MImp, ImputationVariant::RImp];

    pub fn as_str(&self) -> &'static str {
        match self {
            ImputationVariant::MImp => "mImp",
            ImputationVariant::RImp => "rImp",
        }
    }
}

impl fmt::Display for ImputationVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Paths and parameters for one feature-selection run. Built once, then only
/// borrowed.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct FeatureSelectionConfig {
    /// Directory receiving one `{model_key}-{variant}.txt` per search.
    pub feature_selection_storage: PathBuf,
    /// Stem of the mImp matrix: `<stem>.npy` and `<stem>_names.npy`.
    pub mimp_filename: PathBuf,
    /// Stem of the rImp matrix.
    pub rimp_filename: PathBuf,
    /// Sample file indexing rows of the imputed matrices.
    pub feature_samples_file: PathBuf,
    /// Sample file indexing rows of the target matrix; its keys are the model keys.
    pub target_samples_file: PathBuf,
    pub target_feature_columns_file: PathBuf,
    /// Stem of the comma-delimited target matrix (`<stem>.txt`).
    pub target_matrix_name: PathBuf,
    pub models_to_use: Vec<CandidateModel>,
    #[serde(default)]
    pub crossfold_mode: CrossfoldMode,
    /// Worker pool width. `None` uses the number of logical cores.
    #[serde(default)]
    pub num_workers: Option<usize>,
}

impl FeatureSelectionConfig {
    /// Standard experiment layout below `base_dir`.
    pub fn from_base_dir<P: AsRef<Path>>(base_dir: P) -> Self {
        let base_dir = base_dir.as_ref();
        let case_dir = base_dir.join("complete_feature_files_labeling_cases");
        let out_dir = base_dir.join("feature_matrix_storage_labeling_cases");

        Self {
            feature_selection_storage: out_dir.join("feature_selection_storage"),
            mimp_filename: out_dir.join("full_labeling_mImp"),
            rimp_filename: out_dir.join("full_labeling_rImp"),
            feature_samples_file: out_dir.join("feature_samples_out.txt"),
            target_samples_file: out_dir.join("target_samples_out.txt"),
            target_feature_columns_file: case_dir.join("target_feature_columns.txt"),
            target_matrix_name: case_dir.join("target_full_matrix"),
            models_to_use: vec![
                CandidateModel::LogisticRegression,
                CandidateModel::SupportVector,
                CandidateModel::RandomForest,
            ],
            crossfold_mode: CrossfoldMode::FullOnly,
            num_workers: None,
        }
    }

    /// Resolve relative paths against `base_dir`. Absolute paths are kept.
    pub fn relative_to<P: AsRef<Path>>(self, base_dir: P) -> Self {
        let base_dir = base_dir.as_ref();
        Self {
            feature_selection_storage: base_dir.join(self.feature_selection_storage),
            mimp_filename: base_dir.join(self.mimp_filename),
            rimp_filename: base_dir.join(self.rimp_filename),
            feature_samples_file: base_dir.join(self.feature_samples_file),
            target_samples_file: base_dir.join(self.target_samples_file),
            target_feature_columns_file: base_dir.join(self.target_feature_columns_file),
            target_matrix_name: base_dir.join(self.target_matrix_name),
            ..self
        }
    }

    pub fn matrix_stem(&self, variant: ImputationVariant) -> &Path {
        match variant {
            ImputationVariant::MImp => &self.mimp_filename,
            ImputationVariant::RImp => &self.rimp_filename,
        }
    }

    pub fn output_path(&self, model_key: &str, variant: ImputationVariant) -> PathBuf {
        self.feature_selection_storage
            .join(format!("{}-{}.txt", model_key, variant))
    }

    pub fn worker_count(&self) -> usize {
        self.num_workers.filter(|&n| n > 0).unwrap_or_else(num_cpus::get)
    }
}

/// Load a run configuration from a JSON file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<FeatureSelectionConfig> {
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config: {}", path.as_ref().display()))?;
    let config: FeatureSelectionConfig = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse config: {}", path.as_ref().display()))?;
    Ok(config)
}

/// Append `suffix` to the final component of a path stem (`a/b` + `.npy` -> `a/b.npy`).
pub(crate) fn with_suffix(stem: &Path, suffix: &str) -> PathBuf {
    let mut s = stem.as_os_str().to_owned();
    s.push(suffix);
    PathBuf::from(s)
}
