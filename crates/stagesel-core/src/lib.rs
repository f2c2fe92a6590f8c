//! stagesel-core: sample-set assembly and parallel dispatch for staged
//! feature-selection experiments.
//!
//! A run reads two independently imputed feature matrices ("mImp" and
//! "rImp"), a target matrix and two sample-membership files. Every model key
//! is turned into a training subset (its `_full` rows, or the complement of a
//! held-out fold), and a [`feature_selection::FeatureSearch`] is invoked once
//! per (variant, model key) on a worker pool, each writing its own result file.
pub mod columns;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod feature_selection;
pub mod folds;
pub mod io;
pub mod keys;
pub mod samples;

pub use config::{CandidateModel, CrossfoldMode, FeatureSelectionConfig, ImputationVariant};
pub use dispatch::{run_feature_selection, BatchReport, JobOutcome, JobStatus};
pub use error::SelectionError;
