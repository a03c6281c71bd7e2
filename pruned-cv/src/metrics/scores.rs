//! Score functions and target post-processing.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Names of the built-in score functions.
pub const BUILTIN_SCORES: &[&str] = &[
    "mean_squared_error",
    "mean_absolute_error",
    "median_absolute_error",
    "r2_score",
    "max_error",
];

type ScoreFn = dyn Fn(&[f64], &[f64]) -> f64 + Send + Sync;

/// A named score function `(y_true, y_pred) -> value`.
#[derive(Clone)]
pub struct Scorer {
    name: String,
    func: Arc<ScoreFn>,
}

impl Scorer {
    pub fn new<F>(name: &str, func: F) -> Self
    where
        F: Fn(&[f64], &[f64]) -> f64 + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            func: Arc::new(func),
        }
    }

    /// Look up a built-in score by name.
    pub fn builtin(name: &str) -> Option<Self> {
        let func: fn(&[f64], &[f64]) -> f64 = match name {
            "mean_squared_error" => mean_squared_error,
            "mean_absolute_error" => mean_absolute_error,
            "median_absolute_error" => median_absolute_error,
            "r2_score" => r2_score,
            "max_error" => max_error,
            _ => return None,
        };
        Some(Self::new(name, func))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn score(&self, y_true: &[f64], y_pred: &[f64]) -> f64 {
        (self.func)(y_true, y_pred)
    }
}

impl fmt::Debug for Scorer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scorer").field("name", &self.name).finish()
    }
}

/// Inverse target transform applied to both truth and predictions before
/// scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetTransform {
    #[default]
    Identity,
    /// Undo a `ln` target transform.
    Exp,
    /// Undo a `ln(1 + y)` target transform.
    Expm1,
}

impl TargetTransform {
    pub fn apply(&self, values: &[f64]) -> Vec<f64> {
        match self {
            Self::Identity => values.to_vec(),
            Self::Exp => values.iter().map(|v| v.exp()).collect(),
            Self::Expm1 => values.iter().map(|v| v.exp_m1()).collect(),
        }
    }
}

pub fn mean_squared_error(y_true: &[f64], y_pred: &[f64]) -> f64 {
    mean(y_true.iter().zip(y_pred).map(|(t, p)| (t - p).powi(2)))
}

pub fn mean_absolute_error(y_true: &[f64], y_pred: &[f64]) -> f64 {
    mean(y_true.iter().zip(y_pred).map(|(t, p)| (t - p).abs()))
}

pub fn median_absolute_error(y_true: &[f64], y_pred: &[f64]) -> f64 {
    let mut errors: Vec<f64> = y_true.iter().zip(y_pred).map(|(t, p)| (t - p).abs()).collect();
    if errors.is_empty() {
        return f64::NAN;
    }
    errors.sort_by(|a, b| a.total_cmp(b));
    let mid = errors.len() / 2;
    if errors.len() % 2 == 0 {
        (errors[mid - 1] + errors[mid]) / 2.0
    } else {
        errors[mid]
    }
}

/// Coefficient of determination. A constant `y_true` scores 1 for a perfect
/// fit and 0 otherwise.
pub fn r2_score(y_true: &[f64], y_pred: &[f64]) -> f64 {
    if y_true.is_empty() {
        return f64::NAN;
    }
    let y_mean = y_true.iter().sum::<f64>() / y_true.len() as f64;
    let ss_res: f64 = y_true.iter().zip(y_pred).map(|(t, p)| (t - p).powi(2)).sum();
    let ss_tot: f64 = y_true.iter().map(|t| (t - y_mean).powi(2)).sum();
    if ss_tot == 0.0 {
        return if ss_res == 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}

pub fn max_error(y_true: &[f64], y_pred: &[f64]) -> f64 {
    y_true
        .iter()
        .zip(y_pred)
        .map(|(t, p)| (t - p).abs())
        .fold(f64::NAN, f64::max)
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}
