//! Error taxonomy for the search engine.

use thiserror::Error;

use crate::data::DatasetError;
use crate::models::ModelError;
use crate::prepare::PreparationError;
use crate::split::SplitError;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Invalid grid for {model}: {reason}")]
    InvalidGrid { model: String, reason: String },

    #[error("Unresolvable model: {0}")]
    UnresolvableModel(String),

    #[error("Fit failed for {configuration} on fold {fold}: {source}")]
    Fit {
        configuration: String,
        fold: usize,
        #[source]
        source: ModelError,
    },

    #[error("Preparation failed for {configuration} on fold {fold}: {source}")]
    Preparation {
        configuration: String,
        fold: usize,
        #[source]
        source: PreparationError,
    },

    #[error("Unknown score function: {0}")]
    UnknownScore(String),

    #[error("Primary score {0} is not among the configured scores")]
    MissingPrimaryScore(String),

    #[error("Score name {0} is reserved")]
    ReservedScoreName(String),

    #[error("Score {0} is listed more than once")]
    DuplicateScore(String),

    #[error("Invalid pruning thresholds: {0}")]
    InvalidThreshold(String),

    #[error("Split error: {0}")]
    Split(#[from] SplitError),

    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),
}

impl SearchError {
    /// Errors that abort only the configuration being evaluated.
    pub fn is_configuration_local(&self) -> bool {
        matches!(self, Self::Fit { .. } | Self::Preparation { .. })
    }
}

pub type SearchResult<T> = Result<T, SearchError>;
