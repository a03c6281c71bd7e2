//! Core data types for cross-validated model search.
//!
//! A `Dataset` is a dense, row-major table of `f64` features plus one target
//! value per row. Missing feature values are stored as `NaN` and left for a
//! preparer to handle.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DatasetError {
    #[error("Row count mismatch: {features} feature rows, {targets} targets")]
    LengthMismatch { features: usize, targets: usize },

    #[error("Row {row} has {found} features, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("Index {index} out of bounds for dataset with {len} rows")]
    IndexOutOfBounds { index: usize, len: usize },
}

/// An ordered collection of samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    feature_names: Vec<String>,
    features: Vec<Vec<f64>>,
    targets: Vec<f64>,
}

impl Dataset {
    /// Create a dataset, checking that every row has one value per feature name
    /// and that there is one target per row.
    pub fn new(
        feature_names: Vec<String>,
        features: Vec<Vec<f64>>,
        targets: Vec<f64>,
    ) -> Result<Self, DatasetError> {
        if features.len() != targets.len() {
            return Err(DatasetError::LengthMismatch {
                features: features.len(),
                targets: targets.len(),
            });
        }

        let expected = feature_names.len();
        if let Some((row, values)) = features
            .iter()
            .enumerate()
            .find(|(_, values)| values.len() != expected)
        {
            return Err(DatasetError::RaggedRow {
                row,
                expected,
                found: values.len(),
            });
        }

        Ok(Self {
            feature_names,
            features,
            targets,
        })
    }

    /// Create a dataset with generated feature names (`x0`, `x1`, ...).
    pub fn from_rows(features: Vec<Vec<f64>>, targets: Vec<f64>) -> Result<Self, DatasetError> {
        let width = features.first().map(Vec::len).unwrap_or(0);
        let names = (0..width).map(|i| format!("x{}", i)).collect();
        Self::new(names, features, targets)
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn features(&self) -> &[Vec<f64>] {
        &self.features
    }

    pub fn targets(&self) -> &[f64] {
        &self.targets
    }

    /// Copy the rows at `indices` (in that order) into a new dataset.
    pub fn subset(&self, indices: &[usize]) -> Result<Self, DatasetError> {
        let mut features = Vec::with_capacity(indices.len());
        let mut targets = Vec::with_capacity(indices.len());

        for &index in indices {
            if index >= self.len() {
                return Err(DatasetError::IndexOutOfBounds {
                    index,
                    len: self.len(),
                });
            }
            features.push(self.features[index].clone());
            targets.push(self.targets[index]);
        }

        Ok(Self {
            feature_names: self.feature_names.clone(),
            features,
            targets,
        })
    }

    /// Count of missing (`NaN`) feature values per column.
    pub fn missing_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.n_features()];
        for row in &self.features {
            for (count, value) in counts.iter_mut().zip(row) {
                if value.is_nan() {
                    *count += 1;
                }
            }
        }
        counts
    }
}
