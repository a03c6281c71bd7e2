//! Ridge regression (L2-regularized least squares).
//!
//! Solves `(XᵀX + αI) w = Xᵀy` in closed form. With `fit_intercept` the
//! features and target are centered first so the intercept is not penalized.

use crate::grid::ParamSet;

use super::{
    check_known, check_rows, check_training_input, param_bool, param_f64, Model, ModelError,
};

#[derive(Debug, Clone)]
pub struct RidgeRegression {
    alpha: f64,
    fit_intercept: bool,
    coefficients: Option<Vec<f64>>,
    intercept: f64,
}

impl Default for RidgeRegression {
    fn default() -> Self {
        Self::new(1.0, true)
    }
}

impl RidgeRegression {
    pub fn new(alpha: f64, fit_intercept: bool) -> Self {
        Self {
            alpha,
            fit_intercept,
            coefficients: None,
            intercept: 0.0,
        }
    }

    /// Factory entry point. Accepts `alpha` (>= 0) and `fit_intercept`.
    pub fn from_params(params: &ParamSet) -> Result<Box<dyn Model>, ModelError> {
        check_known(params, &["alpha", "fit_intercept"])?;
        let alpha = param_f64(params, "alpha", 1.0)?;
        if !alpha.is_finite() || alpha < 0.0 {
            return Err(ModelError::InvalidParameter {
                name: "alpha".to_string(),
                reason: format!("must be a finite value >= 0, got {}", alpha),
            });
        }
        let fit_intercept = param_bool(params, "fit_intercept", true)?;
        Ok(Box::new(Self::new(alpha, fit_intercept)))
    }

    pub fn coefficients(&self) -> Option<&[f64]> {
        self.coefficients.as_deref()
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }
}

impl Model for RidgeRegression {
    fn fit(&mut self, features: &[Vec<f64>], targets: &[f64]) -> Result<(), ModelError> {
        let width = check_training_input(features, targets)?;
        let n = features.len() as f64;

        let (x_means, y_mean) = if self.fit_intercept {
            let mut means = vec![0.0; width];
            for row in features {
                for (mean, value) in means.iter_mut().zip(row) {
                    *mean += value / n;
                }
            }
            (means, targets.iter().sum::<f64>() / n)
        } else {
            (vec![0.0; width], 0.0)
        };

        // Normal equations on centered data
        let mut gram = vec![vec![0.0; width]; width];
        let mut rhs = vec![0.0; width];
        for (row, target) in features.iter().zip(targets) {
            let centered: Vec<f64> = row.iter().zip(&x_means).map(|(v, m)| v - m).collect();
            let y = target - y_mean;
            for i in 0..width {
                rhs[i] += centered[i] * y;
                for j in i..width {
                    gram[i][j] += centered[i] * centered[j];
                }
            }
        }
        for i in 0..width {
            for j in 0..i {
                gram[i][j] = gram[j][i];
            }
            gram[i][i] += self.alpha;
        }

        let coefficients = solve(gram, rhs)?;
        self.intercept = y_mean
            - coefficients
                .iter()
                .zip(&x_means)
                .map(|(w, m)| w * m)
                .sum::<f64>();
        self.coefficients = Some(coefficients);
        Ok(())
    }

    fn predict(&self, features: &[Vec<f64>]) -> Result<Vec<f64>, ModelError> {
        let coefficients = self.coefficients.as_ref().ok_or(ModelError::NotFitted)?;
        check_rows(features, coefficients.len())?;
        Ok(features
            .iter()
            .map(|row| {
                self.intercept + row.iter().zip(coefficients).map(|(x, w)| x * w).sum::<f64>()
            })
            .collect())
    }
}

/// Gaussian elimination with partial pivoting.
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Result<Vec<f64>, ModelError> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
            .unwrap_or(col);
        if a[pivot][col].abs() < 1e-12 {
            return Err(ModelError::Singular(format!(
                "zero pivot in column {}; try alpha > 0",
                col
            )));
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in (col + 1)..n {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = ((row + 1)..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Ok(x)
}
