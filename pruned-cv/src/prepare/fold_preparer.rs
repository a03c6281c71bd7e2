//! Configurable fold preparer.
//!
//! Steps, in order (each optional):
//! 1. Drop training rows whose target is outside the open interval `(lo, hi)`
//! 2. Replace `NaN` features with the training column mean
//! 3. Standardize features with the training mean and standard deviation
//! 4. Replace targets with their natural logarithm
//!
//! Validation rows are never dropped.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::data::Dataset;

use super::{DataPreparer, FittedStats, PreparationError, PreparedFold};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FoldPreparer {
    /// Keep only training rows with `lo < target < hi`.
    pub target_range: Option<(f64, f64)>,
    /// Impute missing features with training means.
    pub mean_imputation: bool,
    /// Scale features to zero mean and unit variance.
    pub standardize: bool,
    /// Fit on `ln(target)`.
    pub log_target: bool,
}

impl FoldPreparer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_target_range(mut self, lo: f64, hi: f64) -> Self {
        self.target_range = Some((lo, hi));
        self
    }

    pub fn with_mean_imputation(mut self) -> Self {
        self.mean_imputation = true;
        self
    }

    pub fn with_standardization(mut self) -> Self {
        self.standardize = true;
        self
    }

    pub fn with_log_target(mut self) -> Self {
        self.log_target = true;
        self
    }
}

impl DataPreparer for FoldPreparer {
    fn prepare(&self, train: &Dataset, valid: &Dataset) -> Result<PreparedFold, PreparationError> {
        if train.n_features() != valid.n_features() {
            return Err(PreparationError::WidthMismatch {
                train: train.n_features(),
                valid: valid.n_features(),
            });
        }
        if valid.is_empty() {
            return Err(PreparationError::EmptyValidationFold);
        }

        let mut stats = FittedStats::default();

        let (mut train_features, mut train_targets): (Vec<Vec<f64>>, Vec<f64>) =
            match self.target_range {
                Some((lo, hi)) => train
                    .features()
                    .iter()
                    .zip(train.targets())
                    .filter(|(_, &y)| y > lo && y < hi)
                    .map(|(row, &y)| (row.clone(), y))
                    .unzip(),
                None => (train.features().to_vec(), train.targets().to_vec()),
            };
        stats.train_rows_dropped = train.len() - train_targets.len();

        if train_targets.is_empty() {
            return Err(PreparationError::EmptyTrainingFold);
        }

        let mut valid_features = valid.features().to_vec();
        let mut valid_targets = valid.targets().to_vec();
        let names = train.feature_names();

        if self.mean_imputation || self.standardize {
            let means = column_means(&train_features, names.len());
            for (name, mean) in names.iter().zip(&means) {
                stats.means.insert(name.clone(), *mean);
            }

            if self.mean_imputation {
                fill_missing(&mut train_features, &means);
                fill_missing(&mut valid_features, &means);
            }

            if self.standardize {
                let stds = column_stds(&train_features, &means);
                for (name, std) in names.iter().zip(&stds) {
                    stats.stds.insert(name.clone(), *std);
                }
                scale(&mut train_features, &means, &stds);
                scale(&mut valid_features, &means, &stds);
            }
        }

        if self.log_target {
            log_in_place(&mut train_targets)?;
            log_in_place(&mut valid_targets)?;
        }

        trace!(
            "Prepared fold: {} train rows ({} dropped), {} validation rows",
            train_targets.len(),
            stats.train_rows_dropped,
            valid_targets.len()
        );

        Ok(PreparedFold {
            train_features,
            train_targets,
            valid_features,
            valid_targets,
            stats,
        })
    }
}

/// Mean of the non-missing values of each column; 0 for all-missing columns.
fn column_means(rows: &[Vec<f64>], width: usize) -> Vec<f64> {
    let mut sums = vec![0.0; width];
    let mut counts = vec![0usize; width];
    for row in rows {
        for (j, value) in row.iter().enumerate() {
            if !value.is_nan() {
                sums[j] += value;
                counts[j] += 1;
            }
        }
    }
    sums.iter()
        .zip(&counts)
        .map(|(sum, &count)| if count > 0 { sum / count as f64 } else { 0.0 })
        .collect()
}

/// Population standard deviation per column; 1 where it would be 0.
fn column_stds(rows: &[Vec<f64>], means: &[f64]) -> Vec<f64> {
    let mut sq = vec![0.0; means.len()];
    let mut counts = vec![0usize; means.len()];
    for row in rows {
        for (j, value) in row.iter().enumerate() {
            if !value.is_nan() {
                sq[j] += (value - means[j]).powi(2);
                counts[j] += 1;
            }
        }
    }
    sq.iter()
        .zip(&counts)
        .map(|(s, &count)| {
            let std = if count > 0 { (s / count as f64).sqrt() } else { 0.0 };
            if std > 0.0 {
                std
            } else {
                1.0
            }
        })
        .collect()
}

fn fill_missing(rows: &mut [Vec<f64>], means: &[f64]) {
    for row in rows {
        for (value, mean) in row.iter_mut().zip(means) {
            if value.is_nan() {
                *value = *mean;
            }
        }
    }
}

fn scale(rows: &mut [Vec<f64>], means: &[f64], stds: &[f64]) {
    for row in rows {
        for ((value, mean), std) in row.iter_mut().zip(means).zip(stds) {
            *value = (*value - mean) / std;
        }
    }
}

fn log_in_place(targets: &mut [f64]) -> Result<(), PreparationError> {
    for (row, target) in targets.iter_mut().enumerate() {
        if *target <= 0.0 {
            return Err(PreparationError::NonPositiveTarget { row, value: *target });
        }
        *target = target.ln();
    }
    Ok(())
}
