//! Fold generation for cross-validation.
//!
//! A `FoldSplitter` turns a dataset into an ordered list of train/validation
//! index sets. Within each fold the two sets must be disjoint and every
//! index must address a row of the dataset.

pub mod kfold;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::Dataset;

pub use kfold::{KFold, StratifiedKFold};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SplitError {
    #[error("Number of splits must be at least 2, got {0}")]
    TooFewSplits(usize),

    #[error("Cannot make {n_splits} splits from {n_samples} samples")]
    TooManySplits { n_splits: usize, n_samples: usize },

    #[error("Every class has fewer than {n_splits} members (largest has {largest})")]
    ClassesTooSmall { n_splits: usize, largest: usize },

    #[error("Fold {fold} has an empty {side} set")]
    EmptyFold { fold: usize, side: &'static str },

    #[error("Fold {fold} uses index {index} in both train and validation sets")]
    Overlap { fold: usize, index: usize },

    #[error("Fold {fold} references index {index} but dataset has {len} rows")]
    OutOfRange { fold: usize, index: usize, len: usize },
}

/// One train/validation split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fold {
    pub train: Vec<usize>,
    pub valid: Vec<usize>,
}

impl Fold {
    pub fn new(train: Vec<usize>, valid: Vec<usize>) -> Self {
        Self { train, valid }
    }

    /// Averaging weight of this fold: the number of training samples.
    pub fn weight(&self) -> usize {
        self.train.len()
    }
}

/// Produces the ordered folds of a cross-validation scheme.
pub trait FoldSplitter: Send + Sync {
    /// Number of folds `split` yields.
    fn n_splits(&self) -> usize;

    fn split(&self, dataset: &Dataset) -> Result<Vec<Fold>, SplitError>;
}

/// Check that every fold is non-empty, in range, and train/valid disjoint.
pub fn validate_folds(folds: &[Fold], n_samples: usize) -> Result<(), SplitError> {
    for (i, fold) in folds.iter().enumerate() {
        let fold_num = i + 1;
        if fold.train.is_empty() {
            return Err(SplitError::EmptyFold {
                fold: fold_num,
                side: "train",
            });
        }
        if fold.valid.is_empty() {
            return Err(SplitError::EmptyFold {
                fold: fold_num,
                side: "validation",
            });
        }

        let train: HashSet<usize> = fold.train.iter().copied().collect();
        for &index in fold.train.iter().chain(&fold.valid) {
            if index >= n_samples {
                return Err(SplitError::OutOfRange {
                    fold: fold_num,
                    index,
                    len: n_samples,
                });
            }
        }
        if let Some(&index) = fold.valid.iter().find(|i| train.contains(i)) {
            return Err(SplitError::Overlap {
                fold: fold_num,
                index,
            });
        }
    }
    Ok(())
}
