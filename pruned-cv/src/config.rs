//! JSON search configuration.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::grid::ModelSpec;
use crate::metrics::{ScoreSet, TargetTransform};
use crate::models::ModelRegistry;
use crate::prepare::FoldPreparer;
use crate::search::{ExecutionMode, PruningPolicy, SearchError, SearchOrchestrator, SearchResult};
use crate::split::{FoldSplitter, KFold, StratifiedKFold};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Inconsistent configuration: {0}")]
    Inconsistent(String),

    #[error(transparent)]
    Search(#[from] SearchError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FoldKind {
    #[default]
    KFold,
    /// Stratify on the target values.
    Stratified,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FoldSettings {
    pub kind: FoldKind,
    pub n_splits: usize,
    pub shuffle: bool,
    pub seed: Option<u64>,
}

impl Default for FoldSettings {
    fn default() -> Self {
        Self {
            kind: FoldKind::KFold,
            n_splits: 5,
            shuffle: false,
            seed: None,
        }
    }
}

impl FoldSettings {
    pub fn splitter(&self) -> Box<dyn FoldSplitter> {
        match self.kind {
            FoldKind::KFold => {
                let mut splitter = KFold::new(self.n_splits).with_shuffle(self.shuffle);
                if let Some(seed) = self.seed {
                    splitter = splitter.with_random_state(seed);
                }
                Box::new(splitter)
            }
            FoldKind::Stratified => {
                let mut splitter = StratifiedKFold::new(self.n_splits).with_shuffle(self.shuffle);
                if let Some(seed) = self.seed {
                    splitter = splitter.with_random_state(seed);
                }
                Box::new(splitter)
            }
        }
    }
}

fn default_scores() -> Vec<String> {
    vec!["mean_squared_error".to_string()]
}

/// Scores where lower is better. The search always keeps the highest
/// average, so ranking or pruning on one of these favours the worst fits.
const ERROR_SCORES: &[&str] = &[
    "mean_squared_error",
    "mean_absolute_error",
    "median_absolute_error",
    "max_error",
];

/// Everything needed to run one search, minus the data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Candidate models, evaluated in this order.
    pub models: Vec<ModelSpec>,
    #[serde(default = "default_scores")]
    pub scores: Vec<String>,
    /// Score that drives pruning and ranking; higher is better.
    pub primary_score: String,
    #[serde(default)]
    pub folds: FoldSettings,
    #[serde(default)]
    pub pruning: PruningPolicy,
    #[serde(default)]
    pub preparation: FoldPreparer,
    /// Applied to truth and predictions before scoring. Defaults to the
    /// inverse of the preparer's target transform.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postprocess: Option<TargetTransform>,
    #[serde(default)]
    pub execution: ExecutionMode,
    #[serde(default)]
    pub fail_fast: bool,
}

impl SearchConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check thresholds, score names and the target transform pairing
    /// without touching any data.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pruning.validate()?;
        self.score_set()?;

        match (self.postprocess, self.preparation.log_target) {
            (Some(TargetTransform::Exp | TargetTransform::Expm1), false) => {
                return Err(ConfigError::Inconsistent(
                    "postprocess undoes a log transform but preparation.log_target is off"
                        .to_string(),
                ));
            }
            (Some(TargetTransform::Expm1), true) => {
                return Err(ConfigError::Inconsistent(
                    "preparation.log_target is inverted by exp, not expm1".to_string(),
                ));
            }
            _ => {}
        }

        if ERROR_SCORES.contains(&self.primary_score.as_str()) {
            warn!(
                "Primary score {} is lower-is-better; ranking and pruning keep the highest average",
                self.primary_score
            );
        }
        Ok(())
    }

    /// Explicit postprocess, or `exp` when the preparer log-transforms targets.
    pub fn postprocess(&self) -> TargetTransform {
        self.postprocess.unwrap_or(if self.preparation.log_target {
            TargetTransform::Exp
        } else {
            TargetTransform::Identity
        })
    }

    pub fn score_set(&self) -> SearchResult<ScoreSet> {
        ScoreSet::from_names(&self.scores, &self.primary_score)
    }

    pub fn splitter(&self) -> Box<dyn FoldSplitter> {
        self.folds.splitter()
    }

    /// Build an orchestrator over `registry` with these settings.
    pub fn orchestrator(&self, registry: ModelRegistry) -> SearchResult<SearchOrchestrator> {
        Ok(SearchOrchestrator::new(registry, self.score_set()?)
            .with_policy(self.pruning)?
            .with_postprocess(self.postprocess())
            .with_execution(self.execution)
            .with_fail_fast(self.fail_fast))
    }
}
