//! k-nearest-neighbour regression with Euclidean distance.

use crate::grid::ParamSet;

use super::{
    check_known, check_rows, check_training_input, param_str, param_usize, Model, ModelError,
};

/// How neighbours are weighted when averaging their targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NeighborWeights {
    #[default]
    Uniform,
    /// Inverse distance. Exact matches (distance 0) take all the weight.
    Distance,
}

#[derive(Debug, Clone)]
pub struct KNeighborsRegressor {
    n_neighbors: usize,
    weights: NeighborWeights,
    features: Vec<Vec<f64>>,
    targets: Vec<f64>,
}

impl KNeighborsRegressor {
    pub fn new(n_neighbors: usize, weights: NeighborWeights) -> Self {
        Self {
            n_neighbors,
            weights,
            features: Vec::new(),
            targets: Vec::new(),
        }
    }

    /// Factory entry point. Accepts `n_neighbors` (>= 1) and `weights`:
    /// `uniform` | `distance`.
    pub fn from_params(params: &ParamSet) -> Result<Box<dyn Model>, ModelError> {
        check_known(params, &["n_neighbors", "weights"])?;
        let n_neighbors = param_usize(params, "n_neighbors", 5)?;
        if n_neighbors == 0 {
            return Err(ModelError::InvalidParameter {
                name: "n_neighbors".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        let weights = match param_str(params, "weights", "uniform")? {
            "uniform" => NeighborWeights::Uniform,
            "distance" => NeighborWeights::Distance,
            other => {
                return Err(ModelError::InvalidParameter {
                    name: "weights".to_string(),
                    reason: format!("unknown weighting {}", other),
                })
            }
        };
        Ok(Box::new(Self::new(n_neighbors, weights)))
    }

    fn predict_row(&self, row: &[f64]) -> f64 {
        let mut distances: Vec<(f64, f64)> = self
            .features
            .iter()
            .zip(&self.targets)
            .map(|(train, &target)| {
                let d2: f64 = train.iter().zip(row).map(|(a, b)| (a - b).powi(2)).sum();
                (d2.sqrt(), target)
            })
            .collect();
        distances.sort_by(|a, b| a.0.total_cmp(&b.0));
        let nearest = &distances[..self.n_neighbors];

        match self.weights {
            NeighborWeights::Uniform => {
                nearest.iter().map(|(_, t)| t).sum::<f64>() / nearest.len() as f64
            }
            NeighborWeights::Distance => {
                let exact: Vec<f64> = nearest
                    .iter()
                    .filter(|(d, _)| *d == 0.0)
                    .map(|(_, t)| *t)
                    .collect();
                if !exact.is_empty() {
                    return exact.iter().sum::<f64>() / exact.len() as f64;
                }
                let (weighted, total) = nearest
                    .iter()
                    .fold((0.0, 0.0), |(acc, total), (d, t)| (acc + t / d, total + 1.0 / d));
                weighted / total
            }
        }
    }
}

impl Model for KNeighborsRegressor {
    fn fit(&mut self, features: &[Vec<f64>], targets: &[f64]) -> Result<(), ModelError> {
        check_training_input(features, targets)?;
        if self.n_neighbors > features.len() {
            return Err(ModelError::InvalidParameter {
                name: "n_neighbors".to_string(),
                reason: format!(
                    "{} neighbours requested but only {} training samples",
                    self.n_neighbors,
                    features.len()
                ),
            });
        }
        self.features = features.to_vec();
        self.targets = targets.to_vec();
        Ok(())
    }

    fn predict(&self, features: &[Vec<f64>]) -> Result<Vec<f64>, ModelError> {
        let width = self.features.first().ok_or(ModelError::NotFitted)?.len();
        check_rows(features, width)?;
        Ok(features.iter().map(|row| self.predict_row(row)).collect())
    }
}
