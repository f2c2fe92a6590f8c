//! Integration tests for experiment planning and parallel dispatch.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{bail, Result};
use ndarray::{Array1, Array2};
use ndarray_npy::write_npy;

use stagesel_core::config::{CandidateModel, CrossfoldMode, FeatureSelectionConfig, ImputationVariant};
use stagesel_core::dispatch::{
    dispatch_experiment, plan_jobs, select_model_keys, ExperimentData, JobStatus, VariantData,
};
use stagesel_core::error::SelectionError;
use stagesel_core::feature_selection::{AttributeSets, FeatureSearch, PrefixStagedSearch};
use stagesel_core::run_feature_selection;
use stagesel_core::samples::SampleTable;

/// Records every call instead of searching. Returns an error for keys in
/// `fail_on` and panics for keys in `panic_on`.
#[derive(Default)]
struct RecordingSearch {
    calls: Mutex<Vec<(PathBuf, usize, usize, Vec<f64>)>>,
    fail_on: Vec<String>,
    panic_on: Vec<String>,
}

impl FeatureSearch for RecordingSearch {
    fn determine_attribute_sets(&self, column_names: &[String]) -> AttributeSets {
        AttributeSets::from_groups(
            column_names
                .iter()
                .enumerate()
                .map(|(i, name)| (name.clone(), vec![i])),
        )
    }

    fn staged_feature_inclusion(
        &self,
        x: Array2<f64>,
        y: Array1<f64>,
        _attribute_sets: &AttributeSets,
        candidate_models: &[CandidateModel],
        output_path: &Path,
    ) -> Result<()> {
        assert_eq!(candidate_models.len(), 3);
        self.calls.lock().unwrap().push((
            output_path.to_path_buf(),
            x.nrows(),
            x.ncols(),
            y.to_vec(),
        ));
        let file_name = output_path.file_name().unwrap().to_string_lossy().to_string();
        let matches_key = |keys: &[String]| keys.iter().any(|key| file_name.starts_with(&format!("{}-", key)));
        if matches_key(&self.panic_on) {
            panic!("search blew up on {}", file_name);
        }
        if matches_key(&self.fail_on) {
            bail!("search failed for {}", file_name);
        }
        Ok(())
    }
}

fn samples(entries: Vec<(&str, Vec<usize>)>) -> SampleTable {
    entries.into_iter().collect()
}

/// Six rows, two target columns. Row i of the target matrix is (i, 10 * i).
fn experiment() -> ExperimentData {
    let matrix = Array2::from_shape_fn((6, 2), |(r, c)| (r * 2 + c) as f64);
    let target_matrix = Array2::from_shape_fn((6, 2), |(r, c)| if c == 0 { r as f64 } else { 10.0 * r as f64 });
    let search = RecordingSearch::default();
    let names = vec!["lab_a".to_string(), "lab_b".to_string()];

    ExperimentData {
        variants: ImputationVariant::ALL
            .iter()
            .map(|&variant| VariantData {
                variant,
                matrix: matrix.clone(),
                attribute_sets: search.determine_attribute_sets(&names),
            })
            .collect(),
        feature_samples: samples(vec![
            ("0_full", vec![0, 1, 2, 3]),
            ("0_fold0", vec![1, 2]),
            ("1_full", vec![2, 3, 4, 5]),
        ]),
        target_samples: samples(vec![
            ("0_full", vec![0, 1, 2, 3]),
            ("0_fold0", vec![1, 2]),
            ("1_full", vec![2, 3, 4, 5]),
        ]),
        target_column_names: vec!["sodium".to_string(), "potassium".to_string()],
        target_matrix,
    }
}

fn config(storage: &Path) -> FeatureSelectionConfig {
    let mut config = FeatureSelectionConfig::from_base_dir(storage);
    config.feature_selection_storage = storage.join("feature_selection_storage");
    config.num_workers = Some(2);
    config
}

// ---------------------------------------------------------------------------
// Key selection and planning
// ---------------------------------------------------------------------------

#[test]
fn full_only_keeps_full_keys() {
    let data = experiment();
    assert_eq!(
        select_model_keys(&data.target_samples, CrossfoldMode::FullOnly),
        vec!["0_full", "1_full"]
    );
    assert_eq!(
        select_model_keys(&data.target_samples, CrossfoldMode::ModuloFold),
        vec!["0_fold0", "0_full", "1_full"]
    );
}

#[test]
fn plan_resolves_columns_and_training_rows() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(dir.path());
    cfg.crossfold_mode = CrossfoldMode::ModuloFold;

    let jobs = plan_jobs(&cfg, &experiment()).unwrap();
    assert_eq!(jobs.len(), 3);

    let fold = jobs.iter().find(|j| j.model_key == "0_fold0").unwrap();
    assert_eq!(fold.target_column, 0);
    assert_eq!(fold.feature_rows, vec![0, 3]);
    assert_eq!(fold.target_rows, vec![0, 3]);

    let full = jobs.iter().find(|j| j.model_key == "1_full").unwrap();
    assert_eq!(full.target_column, 1);
    assert_eq!(full.feature_rows, vec![2, 3, 4, 5]);
}

#[test]
fn plan_rejects_rows_outside_the_matrix() {
    let dir = tempfile::tempdir().unwrap();
    let mut data = experiment();
    data.target_samples.insert("1_full", vec![2, 3, 4, 6]);

    let err = plan_jobs(&config(dir.path()), &data).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SelectionError>(),
        Some(SelectionError::RowOutOfRange { row: 6, nrows: 6, .. })
    ));
}

#[test]
fn plan_rejects_non_numeric_prefix() {
    let dir = tempfile::tempdir().unwrap();
    let mut data = experiment();
    data.target_samples.insert("A_full", vec![0]);
    data.feature_samples.insert("A_full", vec![0]);

    let err = plan_jobs(&config(dir.path()), &data).unwrap_err();
    assert_eq!(
        err.downcast_ref::<SelectionError>(),
        Some(&SelectionError::InvalidModelKey("A_full".to_string()))
    );
}

#[test]
fn full_only_still_requires_full_key_for_every_fold() {
    let dir = tempfile::tempdir().unwrap();
    let mut data = experiment();
    data.target_matrix = Array2::zeros((6, 4));
    data.target_samples.insert("3_fold0", vec![2]);
    data.feature_samples.insert("3_fold0", vec![2]);

    let cfg = config(dir.path());
    assert_eq!(cfg.crossfold_mode, CrossfoldMode::FullOnly);
    let err = plan_jobs(&cfg, &data).unwrap_err();
    assert_eq!(
        err.downcast_ref::<SelectionError>(),
        Some(&SelectionError::MissingSampleKey {
            table: "feature".to_string(),
            key: "3_full".to_string(),
        })
    );
}

#[test]
fn full_only_still_rejects_non_numeric_fold_prefix() {
    let dir = tempfile::tempdir().unwrap();
    let mut data = experiment();
    data.target_samples.insert("X_fold1", vec![1]);
    data.feature_samples.insert("X_fold1", vec![1]);

    let err = plan_jobs(&config(dir.path()), &data).unwrap_err();
    assert_eq!(
        err.downcast_ref::<SelectionError>(),
        Some(&SelectionError::InvalidModelKey("X_fold1".to_string()))
    );
}

#[test]
fn full_only_plans_only_full_keys() {
    let dir = tempfile::tempdir().unwrap();
    let jobs = plan_jobs(&config(dir.path()), &experiment()).unwrap();
    let keys: Vec<&str> = jobs.iter().map(|j| j.model_key.as_str()).collect();
    assert_eq!(keys, vec!["0_full", "1_full"]);
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

#[test]
fn one_call_per_full_key_and_variant() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    let search = RecordingSearch::default();

    let reports = dispatch_experiment(&cfg, &experiment(), &search).unwrap();
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].variant, ImputationVariant::MImp);
    assert_eq!(reports[1].variant, ImputationVariant::RImp);
    assert!(reports.iter().all(|r| r.is_success()));

    let calls = search.calls.lock().unwrap();
    assert_eq!(calls.len(), 2 * 2);
    let paths: HashSet<&PathBuf> = calls.iter().map(|c| &c.0).collect();
    assert_eq!(paths.len(), calls.len());
    assert!(paths.contains(&cfg.feature_selection_storage.join("0_full-mImp.txt")));
    assert!(paths.contains(&cfg.feature_selection_storage.join("1_full-rImp.txt")));
    assert!(cfg.feature_selection_storage.is_dir());
}

#[test]
fn jobs_receive_sliced_rows_and_target_column() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    let search = RecordingSearch::default();

    dispatch_experiment(&cfg, &experiment(), &search).unwrap();

    let calls = search.calls.lock().unwrap();
    let (_, nrows, ncols, y) = calls
        .iter()
        .find(|c| c.0.ends_with("1_full-mImp.txt"))
        .unwrap();
    assert_eq!((*nrows, *ncols), (4, 2));
    assert_eq!(y, &vec![20.0, 30.0, 40.0, 50.0]);
}

#[test]
fn failed_job_stops_before_second_variant() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    let search = RecordingSearch {
        fail_on: vec!["0_full".to_string()],
        ..Default::default()
    };

    let err = dispatch_experiment(&cfg, &experiment(), &search).unwrap_err();
    assert_eq!(
        err.downcast_ref::<SelectionError>(),
        Some(&SelectionError::BatchFailed {
            variant: "mImp".to_string(),
            keys: vec!["0_full".to_string()],
        })
    );

    // The other mImp job still ran; no rImp job was started.
    let calls = search.calls.lock().unwrap();
    assert_eq!(calls.len(), 2);
    assert!(calls.iter().all(|c| c.0.to_string_lossy().ends_with("-mImp.txt")));
}

#[test]
fn batch_report_marks_failures() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    let data = experiment();
    let jobs = plan_jobs(&cfg, &data).unwrap();
    let search = RecordingSearch {
        fail_on: vec!["1_full".to_string()],
        ..Default::default()
    };

    let report = stagesel_core::dispatch::run_batch(&cfg, &data.variants[1], &data.target_matrix, &jobs, &search)
        .unwrap();
    assert!(!report.is_success());
    assert_eq!(report.failed_keys(), vec!["1_full".to_string()]);
    assert_eq!(report.outcomes[0].status, JobStatus::Completed);
    assert!(matches!(&report.outcomes[1].status, JobStatus::Failed(msg) if msg.contains("1_full-rImp.txt")));
}

#[test]
fn panicking_search_is_recorded_as_failure() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    let data = experiment();
    let jobs = plan_jobs(&cfg, &data).unwrap();
    let search = RecordingSearch {
        panic_on: vec!["0_full".to_string()],
        ..Default::default()
    };

    let report = stagesel_core::dispatch::run_batch(&cfg, &data.variants[0], &data.target_matrix, &jobs, &search)
        .unwrap();
    assert_eq!(report.outcomes.len(), 2);
    assert_eq!(report.outcomes[0].status, JobStatus::Failed("search panicked".to_string()));
    assert_eq!(report.outcomes[1].status, JobStatus::Completed);
}

#[test]
fn panicking_search_fails_the_batch() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    let search = RecordingSearch {
        panic_on: vec!["1_full".to_string()],
        ..Default::default()
    };

    let err = dispatch_experiment(&cfg, &experiment(), &search).unwrap_err();
    assert_eq!(
        err.downcast_ref::<SelectionError>(),
        Some(&SelectionError::BatchFailed {
            variant: "mImp".to_string(),
            keys: vec!["1_full".to_string()],
        })
    );

    let calls = search.calls.lock().unwrap();
    assert_eq!(calls.len(), 2);
    assert!(calls.iter().all(|c| c.0.to_string_lossy().ends_with("-mImp.txt")));
}

// ---------------------------------------------------------------------------
// End to end from files
// ---------------------------------------------------------------------------

fn write_experiment_files(cfg: &FeatureSelectionConfig) {
    let out_dir = cfg.mimp_filename.parent().unwrap();
    let case_dir = cfg.target_matrix_name.parent().unwrap();
    std::fs::create_dir_all(out_dir).unwrap();
    std::fs::create_dir_all(case_dir).unwrap();

    // Column "trend_x" follows the first target column; "noise_y" does not.
    let noise = [0.3, -0.1, 0.2, 0.0, -0.2, 0.1, 0.3, -0.3];
    let data = Array2::from_shape_fn((8, 2), |(r, c)| if c == 0 { r as f64 + 0.5 } else { noise[r] });
    for stem in [&cfg.mimp_filename, &cfg.rimp_filename] {
        let mut npy = stem.clone().into_os_string();
        npy.push(".npy");
        write_npy(PathBuf::from(npy), &data).unwrap();
        let mut names = stem.clone().into_os_string();
        names.push("_names.txt");
        std::fs::write(PathBuf::from(names), "trend_x\nnoise_y\n").unwrap();
    }

    let rows = "0\t0\t0\tfull\t0\t1\t2\t3\t4\t5\t6\t7\n0\t0\t1\tfold1\t0\t1\n";
    std::fs::write(&cfg.feature_samples_file, rows).unwrap();
    std::fs::write(&cfg.target_samples_file, format!("#model\tcolumn\tfold\tlabel\trows\n{}", rows)).unwrap();
    std::fs::write(&cfg.target_feature_columns_file, "outcome\n").unwrap();

    let target: String = (0..8).map(|r| format!("{}\n", r)).collect();
    let mut target_path = cfg.target_matrix_name.clone().into_os_string();
    target_path.push(".txt");
    std::fs::write(PathBuf::from(target_path), target).unwrap();
}

#[test]
fn run_feature_selection_writes_one_file_per_key_and_variant() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = FeatureSelectionConfig::from_base_dir(dir.path());
    cfg.crossfold_mode = CrossfoldMode::ModuloFold;
    cfg.num_workers = Some(2);
    write_experiment_files(&cfg);

    let reports = run_feature_selection(&cfg, &PrefixStagedSearch::default()).unwrap();
    assert_eq!(reports.len(), 2);

    for key in ["0_full", "0_fold1"] {
        for variant in ImputationVariant::ALL {
            let path = cfg.output_path(key, variant);
            let report = std::fs::read_to_string(&path).unwrap();
            let first_stage = report.lines().find(|l| !l.starts_with('#')).unwrap();
            assert!(first_stage.starts_with("1\ttrend\t"), "{}: {}", path.display(), first_stage);
        }
    }
}

#[test]
fn run_feature_selection_fails_before_dispatch_on_bad_sample_file() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = FeatureSelectionConfig::from_base_dir(dir.path());
    write_experiment_files(&cfg);
    std::fs::write(&cfg.target_samples_file, "0\t0\t0\tfull\n").unwrap();

    let err = run_feature_selection(&cfg, &PrefixStagedSearch::default()).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SelectionError>(),
        Some(SelectionError::MalformedSampleLine { line: 1, .. })
    ));
    assert!(!cfg.feature_selection_storage.exists());
}
