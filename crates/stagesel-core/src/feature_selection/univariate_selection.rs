//! Univariate regression scores following scikit-learn's `r_regression` /
//! `f_regression`.
//!
//! See: https://scikit-learn.org/stable/modules/feature_selection.html#univariate-feature-selection

use anyhow::{anyhow, bail, Result};
use ndarray::{Array1, Array2, ArrayBase, Axis, Data, Ix2};
use statrs::distribution::{ContinuousCDF, FisherSnedecor};

/// Row-wise (squared) Euclidean norms of a 2D array.
pub fn row_norms<S>(x: &ArrayBase<S, Ix2>, squared: bool) -> Array1<f64>
where
    S: Data<Elem = f64>,
{
    x.axis_iter(Axis(0))
        .map(|row| {
            let sum_of_squares: f64 = row.iter().map(|&val| val * val).sum();
            if squared {
                sum_of_squares
            } else {
                sum_of_squares.sqrt()
            }
        })
        .collect()
}

/// Pearson's r between each column of `x` and `y`.
///
/// # Parameters
///
/// * `x` - (n_samples, n_features) data matrix.
/// * `y` - (n_samples,) target vector.
/// * `center` - Subtract column and target means first.
/// * `force_finite` - Replace non-finite coefficients (constant columns) with 0.0.
pub fn r_regression(
    x: &Array2<f64>,
    y: &Array1<f64>,
    center: bool,
    force_finite: bool,
) -> Result<Array1<f64>> {
    if x.nrows() != y.len() {
        bail!(
            "Feature matrix has {} rows but target has {} values",
            x.nrows(),
            y.len()
        );
    }
    if y.is_empty() {
        bail!("Cannot score features on an empty sample set");
    }

    let n_samples = x.nrows() as f64;
    let n_features = x.ncols();

    let mut y_centered = y.to_owned();
    let mut x_means = Array1::zeros(n_features);
    let x_norms = if center {
        let y_mean = y.mean().unwrap_or(0.0);
        y_centered -= y_mean;
        if let Some(means) = x.mean_axis(Axis(0)) {
            x_means = means;
        }
        // Centered column norms via moments: sqrt(sum(x^2) - n * mean^2)
        let x_squared_norms = row_norms(&x.t(), true);
        (&x_squared_norms - &(x_means.mapv(|m| m * m) * n_samples)).mapv(|v| v.max(0.0).sqrt())
    } else {
        row_norms(&x.t(), false)
    };

    let mut correlation_coefficient = Array1::zeros(n_features);
    for (i, col) in x.columns().into_iter().enumerate() {
        let mean = x_means[i];
        correlation_coefficient[i] = col
            .iter()
            .zip(y_centered.iter())
            .map(|(&xv, &yv)| (xv - mean) * yv)
            .sum::<f64>();
    }

    let y_norm = y_centered.dot(&y_centered).sqrt();
    correlation_coefficient /= &x_norms;
    correlation_coefficient /= y_norm;
    // Rounding can push |r| just past 1.
    correlation_coefficient.mapv_inplace(|v| v.clamp(-1.0, 1.0));

    if force_finite {
        correlation_coefficient.mapv_inplace(|v| if v.is_finite() { v } else { 0.0 });
    }

    Ok(correlation_coefficient)
}

/// Univariate linear regression F-statistics and p-values per column.
///
/// Returns `(f_statistic, p_values)`, both of shape (n_features,).
pub fn f_regression(
    x: &Array2<f64>,
    y: &Array1<f64>,
    center: bool,
    force_finite: bool,
) -> Result<(Array1<f64>, Array1<f64>)> {
    let correlation_coefficient = r_regression(x, y, center, force_finite)?;
    let deg_of_freedom = y.len() as f64 - if center { 2.0 } else { 1.0 };
    if deg_of_freedom <= 0.0 {
        bail!(
            "Need more than {} samples for an F-test, got {}",
            if center { 2 } else { 1 },
            y.len()
        );
    }

    let corr_coef_squared = correlation_coefficient.mapv(|r| r * r);
    let mut f_statistic = &corr_coef_squared / &corr_coef_squared.mapv(|r2| 1.0 - r2) * deg_of_freedom;

    let f_dist = FisherSnedecor::new(1.0, deg_of_freedom)
        .map_err(|e| anyhow!("Invalid F distribution: {}", e))?;
    let mut p_values = f_statistic.mapv(|f| if f.is_nan() { f64::NAN } else { 1.0 - f_dist.cdf(f) });

    if force_finite {
        for (f, p) in f_statistic.iter_mut().zip(p_values.iter_mut()) {
            if f.is_infinite() {
                *f = f64::MAX;
                *p = 0.0;
            } else if f.is_nan() {
                *f = 0.0;
                *p = 1.0;
            }
        }
    }

    Ok((f_statistic, p_values))
}
