//! Regression scores used to evaluate folds.
//!
//! Provides:
//! - Built-in regression scores (MSE, MAE, median AE, R², max error)
//! - Target post-processing applied before scoring
//! - `ScoreSet`: the ordered scores of one search plus its primary score

pub mod scores;

use crate::search::{SearchError, SearchResult};

pub use scores::{Scorer, TargetTransform, BUILTIN_SCORES};

/// Keys every configuration record uses besides the score names.
pub const RESERVED_KEYS: &[&str] = &["weight", "parameters", "skipped", "status", "error"];

/// The ordered score functions of a search and the name of the primary one.
#[derive(Debug, Clone)]
pub struct ScoreSet {
    scorers: Vec<Scorer>,
    primary: String,
}

impl ScoreSet {
    /// Build from scorers, checking names are unique, not reserved, and
    /// include `primary`.
    pub fn new(scorers: Vec<Scorer>, primary: &str) -> SearchResult<Self> {
        for (i, scorer) in scorers.iter().enumerate() {
            if RESERVED_KEYS.contains(&scorer.name()) {
                return Err(SearchError::ReservedScoreName(scorer.name().to_string()));
            }
            if scorers[..i].iter().any(|s| s.name() == scorer.name()) {
                return Err(SearchError::DuplicateScore(scorer.name().to_string()));
            }
        }

        if !scorers.iter().any(|s| s.name() == primary) {
            return Err(SearchError::MissingPrimaryScore(primary.to_string()));
        }

        Ok(Self {
            scorers,
            primary: primary.to_string(),
        })
    }

    /// Build from built-in score names.
    pub fn from_names<S: AsRef<str>>(names: &[S], primary: &str) -> SearchResult<Self> {
        let scorers = names
            .iter()
            .map(|name| {
                Scorer::builtin(name.as_ref())
                    .ok_or_else(|| SearchError::UnknownScore(name.as_ref().to_string()))
            })
            .collect::<SearchResult<Vec<_>>>()?;
        Self::new(scorers, primary)
    }

    pub fn primary(&self) -> &str {
        &self.primary
    }

    pub fn names(&self) -> Vec<&str> {
        self.scorers.iter().map(Scorer::name).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Scorer> {
        self.scorers.iter()
    }

    pub fn len(&self) -> usize {
        self.scorers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scorers.is_empty()
    }
}
