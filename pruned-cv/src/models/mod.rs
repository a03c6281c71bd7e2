//! Model abstraction and the model registry.
//!
//! A model family is registered under an identifier (e.g.
//! `linear_model.Ridge`) as a `ModelFactory`. The search resolves identifiers
//! through a `ModelRegistry` supplied by the caller and builds one fresh model
//! per fold from a configuration's `ParamSet`.
//!
//! Built-in families:
//! - `dummy.DummyRegressor`: mean or median baseline
//! - `linear_model.Ridge`: L2-regularized least squares
//! - `neighbors.KNeighborsRegressor`: k-nearest-neighbour regression

pub mod dummy;
pub mod knn;
pub mod ridge;

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::grid::{ParamSet, ParamValue};

pub use dummy::DummyRegressor;
pub use knn::{KNeighborsRegressor, NeighborWeights};
pub use ridge::RidgeRegression;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("Invalid value for parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("Unknown parameter: {0}")]
    UnknownParameter(String),

    #[error("Model has not been fitted")]
    NotFitted,

    #[error("Training set is empty")]
    EmptyTrainingSet,

    #[error("Shape mismatch: expected {expected}, found {found}")]
    ShapeMismatch { expected: usize, found: usize },

    #[error("Input contains non-finite values")]
    NonFinite,

    #[error("Singular system: {0}")]
    Singular(String),

    #[error("{0}")]
    Other(String),
}

/// A regression model: fit on a training fold, predict a validation fold.
pub trait Model: Send {
    fn fit(&mut self, features: &[Vec<f64>], targets: &[f64]) -> Result<(), ModelError>;

    fn predict(&self, features: &[Vec<f64>]) -> Result<Vec<f64>, ModelError>;
}

/// Builds models of one family from hyperparameter assignments.
pub trait ModelFactory: Send + Sync {
    fn build(&self, params: &ParamSet) -> Result<Box<dyn Model>, ModelError>;
}

impl<F> ModelFactory for F
where
    F: Fn(&ParamSet) -> Result<Box<dyn Model>, ModelError> + Send + Sync,
{
    fn build(&self, params: &ParamSet) -> Result<Box<dyn Model>, ModelError> {
        self(params)
    }
}

/// Identifier → factory catalog.
#[derive(Clone, Default)]
pub struct ModelRegistry {
    factories: HashMap<String, Arc<dyn ModelFactory>>,
}

impl ModelRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in model families.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register("dummy.DummyRegressor", DummyRegressor::from_params);
        registry.register("linear_model.Ridge", RidgeRegression::from_params);
        registry.register("neighbors.KNeighborsRegressor", KNeighborsRegressor::from_params);
        registry
    }

    /// Register (or replace) a factory under `id`.
    pub fn register<F>(&mut self, id: &str, factory: F) -> &mut Self
    where
        F: ModelFactory + 'static,
    {
        self.factories.insert(id.to_string(), Arc::new(factory));
        self
    }

    pub fn resolve(&self, id: &str) -> Option<Arc<dyn ModelFactory>> {
        self.factories.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.factories.contains_key(id)
    }

    /// Registered identifiers, sorted.
    pub fn identifiers(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("identifiers", &self.identifiers())
            .finish()
    }
}

/// Reject parameter names a family does not understand.
pub fn check_known(params: &ParamSet, known: &[&str]) -> Result<(), ModelError> {
    match params.names().find(|name| !known.contains(name)) {
        Some(name) => Err(ModelError::UnknownParameter(name.to_string())),
        None => Ok(()),
    }
}

pub fn param_f64(params: &ParamSet, name: &str, default: f64) -> Result<f64, ModelError> {
    read_param(params, name, default, ParamValue::as_f64, "a number")
}

pub fn param_usize(params: &ParamSet, name: &str, default: usize) -> Result<usize, ModelError> {
    read_param(params, name, default, ParamValue::as_usize, "a non-negative integer")
}

pub fn param_bool(params: &ParamSet, name: &str, default: bool) -> Result<bool, ModelError> {
    read_param(params, name, default, ParamValue::as_bool, "a boolean")
}

pub fn param_str<'a>(
    params: &'a ParamSet,
    name: &str,
    default: &'a str,
) -> Result<&'a str, ModelError> {
    match params.get(name) {
        None | Some(ParamValue::Null) => Ok(default),
        Some(value) => value.as_str().ok_or_else(|| ModelError::InvalidParameter {
            name: name.to_string(),
            reason: format!("expected a string, got {}", value),
        }),
    }
}

fn read_param<T>(
    params: &ParamSet,
    name: &str,
    default: T,
    read: impl Fn(&ParamValue) -> Option<T>,
    expected: &str,
) -> Result<T, ModelError> {
    match params.get(name) {
        None | Some(ParamValue::Null) => Ok(default),
        Some(value) => read(value).ok_or_else(|| ModelError::InvalidParameter {
            name: name.to_string(),
            reason: format!("expected {}, got {}", expected, value),
        }),
    }
}

/// Shape and finiteness checks shared by the built-in models.
pub(crate) fn check_training_input(
    features: &[Vec<f64>],
    targets: &[f64],
) -> Result<usize, ModelError> {
    if features.is_empty() {
        return Err(ModelError::EmptyTrainingSet);
    }
    if features.len() != targets.len() {
        return Err(ModelError::ShapeMismatch {
            expected: features.len(),
            found: targets.len(),
        });
    }
    let width = features[0].len();
    check_rows(features, width)?;
    if targets.iter().any(|t| !t.is_finite()) {
        return Err(ModelError::NonFinite);
    }
    Ok(width)
}

pub(crate) fn check_rows(features: &[Vec<f64>], width: usize) -> Result<(), ModelError> {
    for row in features {
        if row.len() != width {
            return Err(ModelError::ShapeMismatch {
                expected: width,
                found: row.len(),
            });
        }
        if row.iter().any(|v| !v.is_finite()) {
            return Err(ModelError::NonFinite);
        }
    }
    Ok(())
}
