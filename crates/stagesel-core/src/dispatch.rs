//! Experiment dispatch: one staged search per (imputation variant, model key).
//!
//! Inputs are loaded once, keys are selected and inverted into training rows,
//! then each variant runs as a batch on its own worker pool. Jobs get owned,
//! already-sliced arrays and distinct output paths, so nothing is shared
//! between workers except the read-only inputs.
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;

use anyhow::{Context, Result};
use ndarray::{Array2, Axis};
use rayon::prelude::*;

use crate::columns::{load_list, TargetColumns};
use crate::config::{CrossfoldMode, FeatureSelectionConfig, ImputationVariant};
use crate::error::SelectionError;
use crate::feature_selection::{AttributeSets, FeatureSearch};
use crate::folds::invert_folds;
use crate::io::{load_imputed_matrix, load_target_matrix};
use crate::keys::is_full_key;
use crate::samples::{load_samples, SampleTable};

/// One imputed feature matrix with the attribute sets derived from its names.
#[derive(Debug, Clone)]
pub struct VariantData {
    pub variant: ImputationVariant,
    pub matrix: Array2<f64>,
    pub attribute_sets: AttributeSets,
}

/// Everything a run reads from disk.
#[derive(Debug, Clone)]
pub struct ExperimentData {
    /// In batch order.
    pub variants: Vec<VariantData>,
    pub feature_samples: SampleTable,
    pub target_samples: SampleTable,
    pub target_column_names: Vec<String>,
    pub target_matrix: Array2<f64>,
}

/// Training subset of one model key, shared by both variant batches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchJob {
    pub model_key: String,
    pub target_column: usize,
    pub feature_rows: Vec<usize>,
    pub target_rows: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Completed,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutcome {
    pub model_key: String,
    pub output_path: PathBuf,
    pub status: JobStatus,
}

/// Outcomes of every job of one variant batch, in job order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub variant: ImputationVariant,
    pub outcomes: Vec<JobOutcome>,
}

impl BatchReport {
    pub fn failed_keys(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, JobStatus::Failed(_)))
            .map(|o| o.model_key.clone())
            .collect()
    }

    pub fn is_success(&self) -> bool {
        self.outcomes
            .iter()
            .all(|o| o.status == JobStatus::Completed)
    }
}

/// Load both imputed matrices, the sample tables and the target matrix.
pub fn load_experiment(
    config: &FeatureSelectionConfig,
    search: &dyn FeatureSearch,
) -> Result<ExperimentData> {
    let mut variants = Vec::with_capacity(ImputationVariant::ALL.len());
    for variant in ImputationVariant::ALL {
        let imputed = load_imputed_matrix(config.matrix_stem(variant))
            .with_context(|| format!("Failed to load {} matrix", variant))?;
        let attribute_sets = search.determine_attribute_sets(&imputed.names);
        log::info!(
            "{}: {} rows, {} columns in {} attribute sets",
            variant,
            imputed.data.nrows(),
            imputed.data.ncols(),
            attribute_sets.len()
        );
        variants.push(VariantData {
            variant,
            matrix: imputed.data,
            attribute_sets,
        });
    }

    let target_samples = load_samples(&config.target_samples_file)?;
    let feature_samples = load_samples(&config.feature_samples_file)?;
    let target_column_names = load_list(&config.target_feature_columns_file)?;
    let target_matrix = load_target_matrix(&config.target_matrix_name)?;

    Ok(ExperimentData {
        variants,
        feature_samples,
        target_samples,
        target_column_names,
        target_matrix,
    })
}

/// Model keys to dispatch, taken from the target sample table.
pub fn select_model_keys(target_samples: &SampleTable, mode: CrossfoldMode) -> Vec<String> {
    target_samples
        .keys()
        .filter(|key| match mode {
            CrossfoldMode::FullOnly => is_full_key(key),
            CrossfoldMode::ModuloFold => true,
        })
        .map(str::to_string)
        .collect()
}

fn check_rows(key: &str, matrix: &str, rows: &[usize], nrows: usize) -> Result<(), SelectionError> {
    match rows.iter().find(|&&row| row >= nrows) {
        Some(&row) => Err(SelectionError::RowOutOfRange {
            key: key.to_string(),
            matrix: matrix.to_string(),
            row,
            nrows,
        }),
        None => Ok(()),
    }
}

/// Resolve target columns and training rows, then keep the selected keys.
///
/// Every key of the target sample table is resolved and inverted, whatever
/// the crossfold mode, so a key without a `_full` counterpart or with a
/// non-numeric prefix fails the run before any search starts. Row indices of
/// the selected keys are bounds-checked against every matrix.
pub fn plan_jobs(config: &FeatureSelectionConfig, data: &ExperimentData) -> Result<Vec<SearchJob>> {
    let columns = TargetColumns::resolve(
        data.target_column_names.clone(),
        data.target_samples.keys(),
        data.target_matrix.ncols(),
    )?;
    let inverse = invert_folds(
        &data.feature_samples,
        &data.target_samples,
        data.target_samples.keys(),
    )?;

    let keys = select_model_keys(&data.target_samples, config.crossfold_mode);
    let mut jobs = Vec::with_capacity(keys.len());
    for key in keys {
        let rows = inverse
            .get(&key)
            .ok_or_else(|| SelectionError::MissingSampleKey {
                table: "target".to_string(),
                key: key.clone(),
            })?;
        for variant in &data.variants {
            check_rows(&key, variant.variant.as_str(), &rows.feature_rows, variant.matrix.nrows())?;
        }
        check_rows(&key, "target", &rows.target_rows, data.target_matrix.nrows())?;

        let target_column = columns
            .index_of(&key)
            .ok_or_else(|| SelectionError::InvalidModelKey(key.clone()))?;
        log::debug!(
            "{}: {} training rows, target column {} ({})",
            key,
            rows.feature_rows.len(),
            target_column,
            columns.name_of(target_column).unwrap_or("unnamed")
        );
        jobs.push(SearchJob {
            target_column,
            feature_rows: rows.feature_rows.clone(),
            target_rows: rows.target_rows.clone(),
            model_key: key,
        });
    }
    log::info!(
        "Planned {} of {} model keys ({:?})",
        jobs.len(),
        inverse.len(),
        config.crossfold_mode
    );
    Ok(jobs)
}

fn run_job(
    config: &FeatureSelectionConfig,
    variant: &VariantData,
    target_matrix: &Array2<f64>,
    job: &SearchJob,
    search: &dyn FeatureSearch,
) -> JobOutcome {
    let output_path = config.output_path(&job.model_key, variant.variant);
    let x = variant.matrix.select(Axis(0), &job.feature_rows);
    let y = target_matrix
        .column(job.target_column)
        .select(Axis(0), &job.target_rows);

    log::debug!(
        "Searching {} on {} ({} x {})",
        job.model_key,
        variant.variant,
        x.nrows(),
        x.ncols()
    );
    let result = catch_unwind(AssertUnwindSafe(|| {
        search.staged_feature_inclusion(
            x,
            y,
            &variant.attribute_sets,
            &config.models_to_use,
            &output_path,
        )
    }));

    let status = match result {
        Ok(Ok(())) => JobStatus::Completed,
        Ok(Err(e)) => JobStatus::Failed(format!("{:#}", e)),
        Err(_) => JobStatus::Failed("search panicked".to_string()),
    };
    JobOutcome {
        model_key: job.model_key.clone(),
        output_path,
        status,
    }
}

/// Run every job for one variant on a fresh pool and collect all outcomes.
pub fn run_batch(
    config: &FeatureSelectionConfig,
    variant: &VariantData,
    target_matrix: &Array2<f64>,
    jobs: &[SearchJob],
    search: &dyn FeatureSearch,
) -> Result<BatchReport> {
    let workers = config.worker_count();
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .context("Failed to build worker pool")?;

    log::info!(
        "Starting {} batch: {} model keys on {} workers",
        variant.variant,
        jobs.len(),
        workers
    );
    let outcomes: Vec<JobOutcome> = pool.install(|| {
        jobs.par_iter()
            .map(|job| run_job(config, variant, target_matrix, job, search))
            .collect()
    });

    for outcome in &outcomes {
        if let JobStatus::Failed(reason) = &outcome.status {
            log::error!("{} ({}) failed: {}", outcome.model_key, variant.variant, reason);
        }
    }

    Ok(BatchReport {
        variant: variant.variant,
        outcomes,
    })
}

/// Plan and run all variant batches on already loaded data.
///
/// A batch with any failed job stops the run with `SelectionError::BatchFailed`
/// after all of its jobs have finished; later variants are not attempted.
pub fn dispatch_experiment(
    config: &FeatureSelectionConfig,
    data: &ExperimentData,
    search: &dyn FeatureSearch,
) -> Result<Vec<BatchReport>> {
    let jobs = plan_jobs(config, data)?;
    std::fs::create_dir_all(&config.feature_selection_storage).with_context(|| {
        format!(
            "Failed to create output directory: {}",
            config.feature_selection_storage.display()
        )
    })?;

    let mut reports = Vec::with_capacity(data.variants.len());
    for variant in &data.variants {
        let report = run_batch(config, variant, &data.target_matrix, &jobs, search)?;
        let failed = report.failed_keys();
        if !failed.is_empty() {
            return Err(SelectionError::BatchFailed {
                variant: variant.variant.to_string(),
                keys: failed,
            }
            .into());
        }
        log::info!("Finished {} batch: {} results written", variant.variant, report.outcomes.len());
        reports.push(report);
    }
    Ok(reports)
}

/// Run feature selection for every model key of an experiment.
pub fn run_feature_selection(
    config: &FeatureSelectionConfig,
    search: &dyn FeatureSearch,
) -> Result<Vec<BatchReport>> {
    let data = load_experiment(config, search)?;
    dispatch_experiment(config, &data, search)
}
