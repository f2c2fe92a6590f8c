//! Baseline staged search: columns grouped by name prefix, groups ranked by
//! their best univariate F-score and included while significant.
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use itertools_num::ItertoolsNum;
use ndarray::{Array1, Array2};

use crate::config::CandidateModel;
use crate::feature_selection::univariate_selection::f_regression;
use crate::feature_selection::{AttributeSets, FeatureSearch};

/// One ranked attribute set in a search report.
#[derive(Debug, Clone, PartialEq)]
pub struct StageResult {
    pub stage: usize,
    pub name: String,
    pub best_f: f64,
    pub p_value: f64,
    pub included: bool,
    pub columns: Vec<usize>,
}

#[derive(Debug, Clone)]
pub struct PrefixStagedSearch {
    /// Significance level a set's best column must reach to be included.
    pub alpha: f64,
}

impl Default for PrefixStagedSearch {
    fn default() -> Self {
        Self { alpha: 0.05 }
    }
}

impl PrefixStagedSearch {
    pub fn new(alpha: f64) -> Self {
        Self { alpha }
    }

    /// Rank the attribute sets of one training subset.
    pub fn rank_sets(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        attribute_sets: &AttributeSets,
    ) -> Result<Vec<StageResult>> {
        for (name, columns) in attribute_sets.iter() {
            if let Some(&col) = columns.iter().find(|&&c| c >= x.ncols()) {
                bail!(
                    "Attribute set '{}' references column {} but the matrix has {} columns",
                    name,
                    col,
                    x.ncols()
                );
            }
        }

        let (f_scores, p_values) = f_regression(x, y, true, true)?;

        let mut scored: Vec<(usize, f64, f64)> = attribute_sets
            .sets()
            .iter()
            .enumerate()
            .map(|(set_idx, columns)| {
                columns
                    .iter()
                    .map(|&c| (f_scores[c], p_values[c]))
                    .fold((set_idx, 0.0, 1.0), |best, (f, p)| {
                        if f > best.1 {
                            (set_idx, f, p)
                        } else {
                            best
                        }
                    })
            })
            .collect();
        // Stable: ties keep attribute-set order.
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let mut still_including = true;
        let results = scored
            .into_iter()
            .enumerate()
            .map(|(rank, (set_idx, best_f, p_value))| {
                still_including &= p_value < self.alpha;
                StageResult {
                    stage: rank + 1,
                    name: attribute_sets.names()[set_idx].clone(),
                    best_f,
                    p_value,
                    included: still_including,
                    columns: attribute_sets.sets()[set_idx].clone(),
                }
            })
            .collect();
        Ok(results)
    }
}

impl FeatureSearch for PrefixStagedSearch {
    /// Group columns by the text before their first underscore, in order of
    /// first appearance.
    fn determine_attribute_sets(&self, column_names: &[String]) -> AttributeSets {
        let mut groups: Vec<(String, Vec<usize>)> = Vec::new();
        for (idx, name) in column_names.iter().enumerate() {
            let prefix = name.split('_').next().unwrap_or(name);
            match groups.iter_mut().find(|(p, _)| p == prefix) {
                Some((_, columns)) => columns.push(idx),
                None => groups.push((prefix.to_string(), vec![idx])),
            }
        }
        AttributeSets::from_groups(groups)
    }

    fn staged_feature_inclusion(
        &self,
        x: Array2<f64>,
        y: Array1<f64>,
        attribute_sets: &AttributeSets,
        candidate_models: &[CandidateModel],
        output_path: &Path,
    ) -> Result<()> {
        let results = self.rank_sets(&x, &y, attribute_sets)?;

        let file = File::create(output_path)
            .with_context(|| format!("Failed to create {}", output_path.display()))?;
        let mut out = BufWriter::new(file);

        let models: Vec<&str> = candidate_models.iter().map(CandidateModel::as_str).collect();
        let included_columns: Vec<usize> = results
            .iter()
            .filter(|r| r.included)
            .map(|r| r.columns.len())
            .cumsum()
            .collect();
        writeln!(out, "# models\t{}", models.join(","))?;
        writeln!(out, "# samples\t{}\tcolumns\t{}", x.nrows(), x.ncols())?;
        writeln!(out, "# alpha\t{}", self.alpha)?;
        writeln!(out, "#stage\tset\tbest_f\tp_value\tincluded\tcumulative_columns\tcolumns")?;
        for (i, r) in results.iter().enumerate() {
            let cumulative = if r.included { included_columns[i] } else { 0 };
            let columns: Vec<String> = r.columns.iter().map(usize::to_string).collect();
            writeln!(
                out,
                "{}\t{}\t{:.6e}\t{:.6e}\t{}\t{}\t{}",
                r.stage,
                r.name,
                r.best_f,
                r.p_value,
                r.included,
                cumulative,
                columns.join(",")
            )?;
        }
        out.flush()
            .with_context(|| format!("Failed to write {}", output_path.display()))?;
        Ok(())
    }

    fn name(&self) -> &str {
        "prefix_staged_search"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn sets_follow_first_appearance() {
        let search = PrefixStagedSearch::default();
        let sets = search.determine_attribute_sets(&names(&[
            "lab_sodium",
            "vital_hr",
            "lab_potassium",
            "age",
        ]));
        assert_eq!(sets.names(), &["lab", "vital", "age"]);
        assert_eq!(sets.sets(), &[vec![0, 2], vec![1], vec![3]]);
    }

    #[test]
    fn correlated_set_is_ranked_first_and_included() {
        let search = PrefixStagedSearch::default();
        let x = Array2::from_shape_vec(
            (8, 3),
            vec![
                0.3, 5.0, 1.1,
                -0.1, 5.0, 2.0,
                0.2, 5.0, 2.9,
                0.0, 5.0, 4.2,
                -0.2, 5.0, 5.0,
                0.1, 5.0, 6.1,
                0.3, 5.0, 7.0,
                -0.3, 5.0, 7.9,
            ],
        )
        .unwrap();
        let y = Array1::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        let sets = search.determine_attribute_sets(&names(&["noise_a", "const_b", "trend_c"]));

        let ranked = search.rank_sets(&x, &y, &sets).unwrap();
        assert_eq!(ranked[0].name, "trend");
        assert!(ranked[0].included);
        assert!(ranked.iter().filter(|r| r.name != "trend").all(|r| !r.included));
    }

    #[test]
    fn report_lists_every_set() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("0_full-mImp.txt");
        let search = PrefixStagedSearch::default();
        let x = Array2::from_shape_vec((4, 2), vec![1.0, 0.0, 2.0, 1.0, 3.0, 0.0, 4.0, 1.0]).unwrap();
        let y = Array1::from_vec(vec![1.0, 2.0, 3.0, 4.0]);
        let sets = search.determine_attribute_sets(&names(&["a_1", "b_1"]));

        search
            .staged_feature_inclusion(x, y, &sets, &[CandidateModel::RandomForest], &out)
            .unwrap();

        let report = std::fs::read_to_string(&out).unwrap();
        assert!(report.starts_with("# models\trf\n"));
        let data_lines: Vec<&str> = report.lines().filter(|l| !l.starts_with('#')).collect();
        assert_eq!(data_lines.len(), 2);
        assert!(data_lines[0].starts_with("1\ta\t"));
    }

    #[test]
    fn column_outside_matrix_is_rejected() {
        let search = PrefixStagedSearch::default();
        let x = Array2::<f64>::zeros((4, 1));
        let y = Array1::from_vec(vec![1.0, 2.0, 3.0, 4.0]);
        let sets = AttributeSets::from_groups(vec![("a".to_string(), vec![0, 1])]);
        assert!(search.rank_sets(&x, &y, &sets).is_err());
    }
}
