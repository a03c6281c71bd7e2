//! Constant-prediction baseline.

use crate::grid::ParamSet;

use super::{check_known, check_rows, check_training_input, param_str, Model, ModelError};

/// Statistic used as the constant prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DummyStrategy {
    #[default]
    Mean,
    Median,
}

/// Predicts the training-target mean (or median) for every row.
#[derive(Debug, Clone, Default)]
pub struct DummyRegressor {
    strategy: DummyStrategy,
    constant: Option<f64>,
    n_features: usize,
}

impl DummyRegressor {
    pub fn new(strategy: DummyStrategy) -> Self {
        Self {
            strategy,
            constant: None,
            n_features: 0,
        }
    }

    /// Factory entry point. Accepts `strategy`: `mean` | `median`.
    pub fn from_params(params: &ParamSet) -> Result<Box<dyn Model>, ModelError> {
        check_known(params, &["strategy"])?;
        let strategy = match param_str(params, "strategy", "mean")? {
            "mean" => DummyStrategy::Mean,
            "median" => DummyStrategy::Median,
            other => {
                return Err(ModelError::InvalidParameter {
                    name: "strategy".to_string(),
                    reason: format!("unknown strategy {}", other),
                })
            }
        };
        Ok(Box::new(Self::new(strategy)))
    }

    pub fn constant(&self) -> Option<f64> {
        self.constant
    }
}

impl Model for DummyRegressor {
    fn fit(&mut self, features: &[Vec<f64>], targets: &[f64]) -> Result<(), ModelError> {
        self.n_features = check_training_input(features, targets)?;

        let constant = match self.strategy {
            DummyStrategy::Mean => targets.iter().sum::<f64>() / targets.len() as f64,
            DummyStrategy::Median => {
                let mut sorted = targets.to_vec();
                sorted.sort_by(|a, b| a.total_cmp(b));
                let mid = sorted.len() / 2;
                if sorted.len() % 2 == 0 {
                    (sorted[mid - 1] + sorted[mid]) / 2.0
                } else {
                    sorted[mid]
                }
            }
        };
        self.constant = Some(constant);
        Ok(())
    }

    fn predict(&self, features: &[Vec<f64>]) -> Result<Vec<f64>, ModelError> {
        let constant = self.constant.ok_or(ModelError::NotFitted)?;
        check_rows(features, self.n_features)?;
        Ok(vec![constant; features.len()])
    }
}
