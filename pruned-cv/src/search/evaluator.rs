//! Single-fold model evaluation.

use indexmap::IndexMap;

use crate::grid::ParamSet;
use crate::metrics::{ScoreSet, TargetTransform};
use crate::models::{ModelError, ModelFactory};
use crate::prepare::PreparedFold;

/// Fits a fresh model on a prepared fold and scores its predictions.
#[derive(Debug, Clone)]
pub struct Evaluator {
    scores: ScoreSet,
    postprocess: TargetTransform,
}

impl Evaluator {
    pub fn new(scores: ScoreSet, postprocess: TargetTransform) -> Self {
        Self {
            scores,
            postprocess,
        }
    }

    pub fn scores(&self) -> &ScoreSet {
        &self.scores
    }

    pub fn postprocess(&self) -> TargetTransform {
        self.postprocess
    }

    /// Build, fit and score one model.
    ///
    /// Every score is reported as `sqrt(score(post(y_valid), post(y_hat)))`,
    /// keyed by score name in the order of the score set.
    pub fn evaluate(
        &self,
        fold: &PreparedFold,
        factory: &dyn ModelFactory,
        params: &ParamSet,
    ) -> Result<IndexMap<String, f64>, ModelError> {
        let mut model = factory.build(params)?;
        model.fit(&fold.train_features, &fold.train_targets)?;
        let predictions = model.predict(&fold.valid_features)?;

        if predictions.len() != fold.valid_targets.len() {
            return Err(ModelError::ShapeMismatch {
                expected: fold.valid_targets.len(),
                found: predictions.len(),
            });
        }

        let y_true = self.postprocess.apply(&fold.valid_targets);
        let y_pred = self.postprocess.apply(&predictions);

        Ok(self
            .scores
            .iter()
            .map(|scorer| {
                (
                    scorer.name().to_string(),
                    scorer.score(&y_true, &y_pred).sqrt(),
                )
            })
            .collect())
    }
}
