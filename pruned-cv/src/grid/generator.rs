//! Expansion of model specs into named configurations.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::models::{ModelFactory, ModelRegistry};
use crate::search::{SearchError, SearchResult};

use super::params::{ModelSpec, ParamSet};

/// One concrete hyperparameter assignment for one model family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    /// Short model name (last segment of the identifier).
    pub model: String,
    /// Zero-based position in the model's enumeration order.
    pub ordinal: usize,
    /// `<model>_<ordinal>`.
    pub name: String,
    pub params: ParamSet,
}

impl Configuration {
    pub fn new(model: &str, ordinal: usize, params: ParamSet) -> Self {
        Self {
            model: model.to_string(),
            ordinal,
            name: format!("{}_{}", model, ordinal),
            params,
        }
    }
}

/// All configurations of one model, with its resolved factory.
#[derive(Clone)]
pub struct ModelConfigurations {
    pub model_id: String,
    pub model_name: String,
    pub factory: Arc<dyn ModelFactory>,
    pub configurations: Vec<Configuration>,
}

impl std::fmt::Debug for ModelConfigurations {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelConfigurations")
            .field("model_id", &self.model_id)
            .field("model_name", &self.model_name)
            .field("configurations", &self.configurations)
            .finish()
    }
}

/// Resolves model identifiers and enumerates their grids.
pub struct ConfigurationGenerator<'a> {
    registry: &'a ModelRegistry,
}

impl<'a> ConfigurationGenerator<'a> {
    pub fn new(registry: &'a ModelRegistry) -> Self {
        Self { registry }
    }

    /// Expand one model spec.
    ///
    /// Every generated configuration is built once through the factory so a
    /// grid naming an unknown parameter or an invalid value fails here,
    /// before any fold is evaluated.
    pub fn expand(&self, spec: &ModelSpec) -> SearchResult<ModelConfigurations> {
        let factory = self
            .registry
            .resolve(&spec.model)
            .ok_or_else(|| SearchError::UnresolvableModel(spec.model.clone()))?;

        if spec.grid.is_empty() {
            return Err(invalid_grid(spec, "hyperparameter grid is empty".to_string()));
        }
        if let Some((name, _)) = spec.grid.iter().find(|(_, values)| values.is_empty()) {
            return Err(invalid_grid(
                spec,
                format!("parameter {} has no candidate values", name),
            ));
        }

        let model_name = spec.name().to_string();
        let configurations: Vec<Configuration> = spec
            .grid
            .combinations()
            .into_iter()
            .enumerate()
            .map(|(ordinal, params)| Configuration::new(&model_name, ordinal, params))
            .collect();

        for configuration in &configurations {
            if let Err(e) = factory.build(&configuration.params) {
                return Err(invalid_grid(
                    spec,
                    format!("{} {} is not constructible: {}", configuration.name, configuration.params, e),
                ));
            }
        }

        Ok(ModelConfigurations {
            model_id: spec.model.clone(),
            model_name,
            factory,
            configurations,
        })
    }

    /// Expand all specs, keeping their order.
    pub fn expand_all(&self, specs: &[ModelSpec]) -> SearchResult<Vec<ModelConfigurations>> {
        let mut seen = HashSet::new();
        let mut expanded = Vec::with_capacity(specs.len());

        for spec in specs {
            if !seen.insert(spec.name().to_string()) {
                return Err(invalid_grid(
                    spec,
                    format!("model name {} is used more than once", spec.name()),
                ));
            }
            expanded.push(self.expand(spec)?);
        }

        Ok(expanded)
    }
}

fn invalid_grid(spec: &ModelSpec, reason: String) -> SearchError {
    SearchError::InvalidGrid {
        model: spec.model.clone(),
        reason,
    }
}
