//! Feature-selection search seam.
//!
//! The dispatcher only knows the [`FeatureSearch`] trait. `staged` holds the
//! baseline implementation shipped with the binary, built on the univariate
//! scores in `univariate_selection`.
pub mod staged;
pub mod univariate_selection;

use std::path::Path;

use anyhow::Result;
use ndarray::{Array1, Array2};

use crate::config::CandidateModel;

pub use staged::PrefixStagedSearch;

/// Column-index groups searched as units, each with a display name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeSets {
    sets: Vec<Vec<usize>>,
    names: Vec<String>,
}

impl AttributeSets {
    pub fn from_groups<I>(groups: I) -> Self
    where
        I: IntoIterator<Item = (String, Vec<usize>)>,
    {
        let (names, sets) = groups.into_iter().unzip();
        Self { sets, names }
    }

    pub fn sets(&self) -> &[Vec<usize>] {
        &self.sets
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[usize])> {
        self.names
            .iter()
            .map(String::as_str)
            .zip(self.sets.iter().map(Vec::as_slice))
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}

/// A staged feature-inclusion search.
///
/// `staged_feature_inclusion` is called concurrently from pool workers, each
/// with its own arrays and a distinct `output_path`.
pub trait FeatureSearch: Send + Sync {
    /// Group matrix columns into attribute sets. Must be pure.
    fn determine_attribute_sets(&self, column_names: &[String]) -> AttributeSets;

    /// Run the search on one training subset and write the result to `output_path`.
    fn staged_feature_inclusion(
        &self,
        x: Array2<f64>,
        y: Array1<f64>,
        attribute_sets: &AttributeSets,
        candidate_models: &[CandidateModel],
        output_path: &Path,
    ) -> Result<()>;

    fn name(&self) -> &str {
        "feature_search"
    }
}
