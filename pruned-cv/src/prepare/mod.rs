//! Fold preparation.
//!
//! A `DataPreparer` turns the raw rows of one fold into model-ready matrices.
//! Any statistic it needs (imputation means, scaling factors) must be fitted
//! on the training side only and then applied unchanged to the validation
//! side.

pub mod fold_preparer;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::{Dataset, DatasetError};

pub use fold_preparer::FoldPreparer;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PreparationError {
    #[error("Training fold is empty after filtering")]
    EmptyTrainingFold,

    #[error("Validation fold is empty")]
    EmptyValidationFold,

    #[error("Target {value} at row {row} cannot be log-transformed")]
    NonPositiveTarget { row: usize, value: f64 },

    #[error("Feature width mismatch: train has {train}, validation has {valid}")]
    WidthMismatch { train: usize, valid: usize },

    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),

    #[error("{0}")]
    Other(String),
}

/// Train-only statistics fitted while preparing a fold.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FittedStats {
    /// Column means used for imputation and centering.
    pub means: BTreeMap<String, f64>,
    /// Column standard deviations used for scaling.
    pub stds: BTreeMap<String, f64>,
    /// Training rows removed by filtering.
    pub train_rows_dropped: usize,
}

/// Model-ready matrices for one fold.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedFold {
    pub train_features: Vec<Vec<f64>>,
    pub train_targets: Vec<f64>,
    pub valid_features: Vec<Vec<f64>>,
    pub valid_targets: Vec<f64>,
    pub stats: FittedStats,
}

/// Turns a raw train/validation pair into a `PreparedFold`.
pub trait DataPreparer: Send + Sync {
    fn prepare(&self, train: &Dataset, valid: &Dataset) -> Result<PreparedFold, PreparationError>;
}

/// Passes rows through untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityPreparer;

impl DataPreparer for IdentityPreparer {
    fn prepare(&self, train: &Dataset, valid: &Dataset) -> Result<PreparedFold, PreparationError> {
        if train.is_empty() {
            return Err(PreparationError::EmptyTrainingFold);
        }
        Ok(PreparedFold {
            train_features: train.features().to_vec(),
            train_targets: train.targets().to_vec(),
            valid_features: valid.features().to_vec(),
            valid_targets: valid.targets().to_vec(),
            stats: FittedStats::default(),
        })
    }
}
