//! Early termination of unpromising configurations.
//!
//! A configuration's folds are evaluated in split order. After each fold the
//! weighted running average of the primary score is compared against a
//! fraction of the best final average seen so far in the search. Every fold
//! that lands below `thresh_percentage * global_best` bumps a skip counter
//! that is never reset; once the counter equals `thresh_skip`, the remaining
//! folds are abandoned and the configuration is marked as skipped.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::data::Dataset;
use crate::grid::Configuration;
use crate::models::ModelFactory;
use crate::prepare::DataPreparer;
use crate::split::Fold;

use super::error::{SearchError, SearchResult};
use super::evaluator::Evaluator;
use super::observer::{FoldProgress, SearchObserver};
use super::report::{ConfigurationRecord, FoldResult};

/// Skip threshold and percentage of the global best.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PruningPolicy {
    /// Bad folds tolerated before pruning. `0` disables pruning.
    pub thresh_skip: usize,
    /// Fraction of the global best a running average must reach. `0` disables
    /// pruning and freezes the global best at zero.
    pub thresh_percentage: f64,
}

impl PruningPolicy {
    pub fn new(thresh_skip: usize, thresh_percentage: f64) -> SearchResult<Self> {
        let policy = Self {
            thresh_skip,
            thresh_percentage,
        };
        policy.validate()?;
        Ok(policy)
    }

    pub fn validate(&self) -> SearchResult<()> {
        if !self.thresh_percentage.is_finite() || self.thresh_percentage < 0.0 {
            return Err(SearchError::InvalidThreshold(format!(
                "thresh_percentage must be a finite non-negative number, got {}",
                self.thresh_percentage
            )));
        }
        Ok(())
    }

    /// Whether the policy can ever prune anything.
    pub fn is_active(&self) -> bool {
        self.thresh_skip != 0 && self.thresh_percentage != 0.0
    }

    pub fn counts_as_bad(&self, running_average: f64, global_best: f64) -> bool {
        running_average < self.thresh_percentage * global_best
    }

    /// Checked before each fold.
    pub fn should_prune(&self, skip_count: usize) -> bool {
        self.thresh_skip != 0 && skip_count == self.thresh_skip
    }
}

/// Highest final primary-score average of the search so far.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GlobalBest(f64);

impl GlobalBest {
    pub fn new() -> Self {
        Self(0.0)
    }

    /// Start from a known value, e.g. to resume a search.
    pub fn starting_at(value: f64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    /// Offer a configuration's final average. Ties replace the current value.
    /// Returns whether the value moved.
    pub fn observe(&mut self, average: f64, policy: &PruningPolicy) -> bool {
        if policy.thresh_percentage != 0.0 && average >= self.0 {
            self.0 = average;
            true
        } else {
            false
        }
    }
}

/// `Σ vᵢwᵢ / Σ wᵢ`, or `None` when there is no weight.
pub fn weighted_average(values: &[f64], weights: &[usize]) -> Option<f64> {
    let total: usize = weights.iter().sum();
    if total == 0 {
        return None;
    }
    let sum: f64 = values
        .iter()
        .zip(weights)
        .map(|(v, &w)| v * w as f64)
        .sum();
    Some(sum / total as f64)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PruningState {
    Init,
    Evaluating,
    Pruned,
    Completed,
    Failed,
}

/// Outcome of one configuration's fold loop, not yet applied to the global
/// best.
#[derive(Debug)]
pub struct ConfigurationRun {
    pub record: ConfigurationRecord,
    pub state: PruningState,
    pub skip_count: usize,
    /// Weighted primary-score average over the recorded folds.
    pub final_average: Option<f64>,
    pub error: Option<SearchError>,
}

impl ConfigurationRun {
    /// Offer the final average to `best`. Failed runs are ignored.
    pub fn apply_to(&self, best: &mut GlobalBest, policy: &PruningPolicy) -> bool {
        match (self.state, self.final_average) {
            (PruningState::Pruned | PruningState::Completed, Some(avg)) => {
                best.observe(avg, policy)
            }
            _ => false,
        }
    }
}

/// Drives the fold loop of single configurations against a fixed fold set.
pub struct PruningController<'a> {
    policy: PruningPolicy,
    evaluator: &'a Evaluator,
    preparer: &'a dyn DataPreparer,
    dataset: &'a Dataset,
    folds: &'a [Fold],
}

impl<'a> PruningController<'a> {
    pub fn new(
        policy: PruningPolicy,
        evaluator: &'a Evaluator,
        preparer: &'a dyn DataPreparer,
        dataset: &'a Dataset,
        folds: &'a [Fold],
    ) -> Self {
        Self {
            policy,
            evaluator,
            preparer,
            dataset,
            folds,
        }
    }

    pub fn policy(&self) -> &PruningPolicy {
        &self.policy
    }

    /// Evaluate one configuration and fold its result into `best`.
    pub fn run(
        &self,
        configuration: &Configuration,
        factory: &dyn ModelFactory,
        best: &mut GlobalBest,
        observer: &dyn SearchObserver,
    ) -> ConfigurationRun {
        let run = self.evaluate(configuration, factory, best.value(), observer);
        if run.apply_to(best, &self.policy) {
            debug!("{} raised global best to {:.6}", configuration.name, best.value());
        }
        run
    }

    /// Evaluate one configuration against a fixed global best.
    pub fn evaluate(
        &self,
        configuration: &Configuration,
        factory: &dyn ModelFactory,
        global_best: f64,
        observer: &dyn SearchObserver,
    ) -> ConfigurationRun {
        let scores = self.evaluator.scores();
        let primary = scores.primary();
        let n_folds = self.folds.len();

        let mut record = ConfigurationRecord::new(&scores.names(), configuration.params.clone());
        let mut state = PruningState::Init;
        let mut skip_count = 0usize;

        for (i, fold) in self.folds.iter().enumerate() {
            let fold_no = i + 1;

            if self.policy.should_prune(skip_count) {
                state = PruningState::Pruned;
                break;
            }
            state = PruningState::Evaluating;

            let result = match self.evaluate_fold(configuration, factory, fold, fold_no) {
                Ok(result) => result,
                Err(e) => {
                    warn!("{}", e);
                    record.fail(e.to_string());
                    let final_average = record.weighted_average(primary);
                    return ConfigurationRun {
                        record,
                        state: PruningState::Failed,
                        skip_count,
                        final_average,
                        error: Some(e),
                    };
                }
            };
            record.push(&result);

            let running_average = record.weighted_average(primary).unwrap_or(f64::NAN);
            if self.policy.counts_as_bad(running_average, global_best) {
                skip_count += 1;
            }

            trace!(
                "{} fold {}/{}: running {:.6}, best {:.6}, skip {}",
                configuration.name,
                fold_no,
                n_folds,
                running_average,
                global_best,
                skip_count
            );
            observer.on_fold_end(&FoldProgress {
                configuration: &configuration.name,
                fold: fold_no,
                n_folds,
                skip_count,
                running_average,
                global_best,
            });
        }

        let pruned = state == PruningState::Pruned;
        if !pruned {
            state = PruningState::Completed;
        }
        record.finish(pruned);

        ConfigurationRun {
            final_average: record.weighted_average(primary),
            record,
            state,
            skip_count,
            error: None,
        }
    }

    fn evaluate_fold(
        &self,
        configuration: &Configuration,
        factory: &dyn ModelFactory,
        fold: &Fold,
        fold_no: usize,
    ) -> SearchResult<FoldResult> {
        let train = self.dataset.subset(&fold.train)?;
        let valid = self.dataset.subset(&fold.valid)?;

        let prepared = self
            .preparer
            .prepare(&train, &valid)
            .map_err(|source| SearchError::Preparation {
                configuration: configuration.name.clone(),
                fold: fold_no,
                source,
            })?;

        let scores = self
            .evaluator
            .evaluate(&prepared, factory, &configuration.params)
            .map_err(|source| SearchError::Fit {
                configuration: configuration.name.clone(),
                fold: fold_no,
                source,
            })?;

        Ok(FoldResult {
            scores,
            weight: fold.weight(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use proptest::prelude::*;

    use crate::grid::ParamSet;
    use crate::metrics::{ScoreSet, Scorer, TargetTransform};
    use crate::models::{param_f64, param_usize, Model, ModelError};
    use crate::prepare::{IdentityPreparer, PreparationError, PreparedFold};
    use crate::search::observer::NoopObserver;
    use crate::search::report::RecordStatus;

    /// Predicts `x[0] * scale`; fails to fit on fewer than `min_train` rows.
    struct Scripted {
        scale: f64,
        min_train: usize,
    }

    impl Model for Scripted {
        fn fit(&mut self, features: &[Vec<f64>], _: &[f64]) -> Result<(), ModelError> {
            if features.len() < self.min_train {
                return Err(ModelError::Other("not enough rows".to_string()));
            }
            Ok(())
        }

        fn predict(&self, features: &[Vec<f64>]) -> Result<Vec<f64>, ModelError> {
            Ok(features.iter().map(|row| row[0] * self.scale).collect())
        }
    }

    fn scripted(params: &ParamSet) -> Result<Box<dyn Model>, ModelError> {
        Ok(Box::new(Scripted {
            scale: param_f64(params, "scale", 1.0)?,
            min_train: param_usize(params, "min_train", 0)?,
        }))
    }

    /// Reports the first prediction, so each fold scores `sqrt(scale)`.
    fn evaluator() -> Evaluator {
        let scores = ScoreSet::new(vec![Scorer::new("score", |_, p| p[0])], "score").unwrap();
        Evaluator::new(scores, TargetTransform::Identity)
    }

    fn dataset() -> Dataset {
        Dataset::from_rows(vec![vec![1.0]; 5], vec![0.0, 1.0, 2.0, 3.0, 4.0]).unwrap()
    }

    /// Leave-one-out folds over five rows.
    fn folds() -> Vec<Fold> {
        (0..5)
            .map(|k| Fold::new((0..5).filter(|&i| i != k).collect(), vec![k]))
            .collect()
    }

    fn config(ordinal: usize, score: f64) -> Configuration {
        Configuration::new("M", ordinal, ParamSet::new().with("scale", score * score))
    }

    #[derive(Default)]
    struct RecordingObserver {
        bests: Mutex<Vec<(String, f64)>>,
    }

    impl SearchObserver for RecordingObserver {
        fn on_fold_end(&self, progress: &FoldProgress<'_>) {
            self.bests
                .lock()
                .unwrap()
                .push((progress.configuration.to_string(), progress.global_best));
        }
    }

    #[test]
    fn test_policy_rules() {
        let policy = PruningPolicy::new(2, 0.9).unwrap();
        assert!(policy.is_active());
        assert!(policy.counts_as_bad(8.0, 10.0));
        assert!(!policy.counts_as_bad(9.0, 10.0));
        assert!(!policy.should_prune(1));
        assert!(policy.should_prune(2));

        assert!(!PruningPolicy::new(0, 0.9).unwrap().should_prune(0));
        assert!(PruningPolicy::new(2, -0.1).is_err());
        assert!(PruningPolicy::new(2, f64::NAN).is_err());
    }

    #[test]
    fn test_global_best_ties_update() {
        let policy = PruningPolicy::new(2, 0.5).unwrap();
        let mut best = GlobalBest::starting_at(3.0);
        assert!(best.observe(3.0, &policy));
        assert!(!best.observe(2.0, &policy));
        assert!(best.observe(4.0, &policy));
        assert_eq!(best.value(), 4.0);
    }

    #[test]
    fn test_global_best_frozen_without_percentage() {
        let policy = PruningPolicy::new(3, 0.0).unwrap();
        let mut best = GlobalBest::new();
        assert!(!best.observe(10.0, &policy));
        assert_eq!(best.value(), 0.0);
    }

    #[test]
    fn test_weighted_average() {
        assert_eq!(weighted_average(&[1.0, 4.0], &[1, 3]), Some(3.25));
        assert_eq!(weighted_average(&[], &[]), None);
        assert_eq!(weighted_average(&[1.0], &[0]), None);
    }

    #[test]
    fn test_pruned_configuration_and_successor() {
        let evaluator = evaluator();
        let data = dataset();
        let folds = folds();
        let policy = PruningPolicy::new(2, 0.9).unwrap();
        let controller = PruningController::new(policy, &evaluator, &IdentityPreparer, &data, &folds);
        let observer = RecordingObserver::default();

        // An earlier configuration left the best at 10
        let mut best = GlobalBest::starting_at(10.0);

        // A scores 8 < 0.9 * 10 on folds 1 and 2
        let a = controller.run(&config(0, 8.0), &scripted, &mut best, &observer);
        assert_eq!(a.state, PruningState::Pruned);
        assert!(a.record.skipped());
        assert_eq!(a.record.folds_recorded(), 2);
        assert_eq!(a.record.weights(), &[4, 4]);
        assert_eq!(a.skip_count, 2);
        assert_eq!(best.value(), 10.0);

        // B scores 11 and is compared against the best A left behind
        let b = controller.run(&config(1, 11.0), &scripted, &mut best, &observer);
        assert_eq!(b.state, PruningState::Completed);
        assert!(!b.record.skipped());
        assert_eq!(b.record.folds_recorded(), 5);
        assert_eq!(b.skip_count, 0);
        assert!((best.value() - 11.0).abs() < 1e-12);

        let bests = observer.bests.lock().unwrap();
        assert_eq!(bests.len(), 7);
        assert!(bests
            .iter()
            .filter(|(name, _)| name == "M_1")
            .all(|(_, b)| *b == 10.0));
    }

    #[test]
    fn test_pruned_average_can_raise_best() {
        let evaluator = evaluator();
        let data = dataset();
        let folds = folds();
        // Above 1 the threshold sits over the best itself
        let policy = PruningPolicy::new(1, 1.5).unwrap();
        let controller = PruningController::new(policy, &evaluator, &IdentityPreparer, &data, &folds);

        // 12 < 1.5 * 10 on fold 1, then pruned with a partial average of 12
        let mut best = GlobalBest::starting_at(10.0);
        let run = controller.run(&config(0, 12.0), &scripted, &mut best, &NoopObserver);
        assert_eq!(run.state, PruningState::Pruned);
        assert_eq!(run.record.folds_recorded(), 1);
        assert!((best.value() - 12.0).abs() < 1e-12);

        // The next configuration is judged against the pruned average
        let observer = RecordingObserver::default();
        controller.run(&config(1, 17.0), &scripted, &mut best, &observer);
        let bests = observer.bests.lock().unwrap();
        assert!(bests.iter().all(|(_, b)| (*b - 12.0).abs() < 1e-12));
    }

    #[test]
    fn test_zero_percentage_never_prunes() {
        let evaluator = evaluator();
        let data = dataset();
        let folds = folds();
        let policy = PruningPolicy::new(1, 0.0).unwrap();
        let controller = PruningController::new(policy, &evaluator, &IdentityPreparer, &data, &folds);

        let mut best = GlobalBest::new();
        for (i, score) in [5.0, 1.0, 3.0].into_iter().enumerate() {
            let run = controller.run(&config(i, score), &scripted, &mut best, &NoopObserver);
            assert_eq!(run.state, PruningState::Completed);
            assert_eq!(run.record.folds_recorded(), 5);
            assert_eq!(best.value(), 0.0);
        }
    }

    #[test]
    fn test_threshold_reached_on_last_fold_completes() {
        let evaluator = evaluator();
        let data = dataset();
        let folds = folds();
        let policy = PruningPolicy::new(5, 0.9).unwrap();
        let controller = PruningController::new(policy, &evaluator, &IdentityPreparer, &data, &folds);

        let run = controller.evaluate(&config(0, 1.0), &scripted, 10.0, &NoopObserver);
        assert_eq!(run.skip_count, 5);
        assert_eq!(run.state, PruningState::Completed);
        assert!(!run.record.skipped());
        assert_eq!(run.record.folds_recorded(), 5);
    }

    #[test]
    fn test_skip_counter_is_cumulative() {
        // Folds carry different first features so the score changes per fold
        let data = Dataset::from_rows(
            vec![vec![1.0], vec![100.0], vec![1.0], vec![100.0], vec![1.0]],
            vec![0.0; 5],
        )
        .unwrap();
        let evaluator = evaluator();
        let folds = folds();
        let policy = PruningPolicy::new(3, 0.9).unwrap();
        let controller = PruningController::new(policy, &evaluator, &IdentityPreparer, &data, &folds);

        // Scores 1, 10, 1: running averages 1, 5.5, 4, all below 9
        let configuration = Configuration::new("M", 0, ParamSet::new().with("scale", 1.0));
        let run = controller.evaluate(&configuration, &scripted, 10.0, &NoopObserver);
        assert_eq!(run.state, PruningState::Pruned);
        assert_eq!(run.record.folds_recorded(), 3);
        assert_eq!(run.record.scores("score").unwrap(), &[1.0, 10.0, 1.0]);
        assert!((run.final_average.unwrap() - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_fit_failure_marks_record_failed() {
        let evaluator = evaluator();
        let data = dataset();
        let mut folds = folds();
        folds[2] = Fold::new(vec![0, 1], vec![2]);
        let policy = PruningPolicy::new(2, 0.9).unwrap();
        let controller = PruningController::new(policy, &evaluator, &IdentityPreparer, &data, &folds);

        let configuration = Configuration::new(
            "M",
            0,
            ParamSet::new().with("scale", 4.0).with("min_train", 3),
        );
        let mut best = GlobalBest::starting_at(1.0);
        let run = controller.run(&configuration, &scripted, &mut best, &NoopObserver);

        assert_eq!(run.state, PruningState::Failed);
        assert_eq!(run.record.status(), RecordStatus::Failed);
        assert!(!run.record.skipped());
        assert_eq!(run.record.folds_recorded(), 2);
        assert_eq!(run.record.scores("score").unwrap().len(), 2);
        assert!(run.record.error().unwrap().contains("fold 3"));
        assert!(matches!(
            run.error,
            Some(SearchError::Fit { fold: 3, .. })
        ));
        // Failed configurations never move the best
        assert_eq!(best.value(), 1.0);
    }

    struct RecordingPreparer {
        seen: Mutex<Vec<(Vec<f64>, Vec<f64>)>>,
    }

    impl DataPreparer for RecordingPreparer {
        fn prepare(
            &self,
            train: &Dataset,
            valid: &Dataset,
        ) -> Result<PreparedFold, PreparationError> {
            self.seen
                .lock()
                .unwrap()
                .push((train.targets().to_vec(), valid.targets().to_vec()));
            IdentityPreparer.prepare(train, valid)
        }
    }

    #[test]
    fn test_validation_side_is_held_out_rows() {
        let evaluator = evaluator();
        let data = dataset();
        let folds = folds();
        let preparer = RecordingPreparer {
            seen: Mutex::new(Vec::new()),
        };
        let controller =
            PruningController::new(PruningPolicy::default(), &evaluator, &preparer, &data, &folds);

        controller.evaluate(&config(0, 1.0), &scripted, 0.0, &NoopObserver);

        let seen = preparer.seen.lock().unwrap();
        assert_eq!(seen.len(), 5);
        for (k, (train, valid)) in seen.iter().enumerate() {
            assert_eq!(valid, &vec![k as f64]);
            assert_eq!(train.len(), 4);
            assert!(!train.contains(&(k as f64)));
        }
    }

    #[test]
    fn test_preparation_failure_is_configuration_local() {
        struct Failing;
        impl DataPreparer for Failing {
            fn prepare(&self, _: &Dataset, _: &Dataset) -> Result<PreparedFold, PreparationError> {
                Err(PreparationError::EmptyValidationFold)
            }
        }

        let evaluator = evaluator();
        let data = dataset();
        let folds = folds();
        let controller =
            PruningController::new(PruningPolicy::default(), &evaluator, &Failing, &data, &folds);

        let run = controller.evaluate(&config(0, 1.0), &scripted, 0.0, &NoopObserver);
        assert_eq!(run.state, PruningState::Failed);
        assert_eq!(run.record.folds_recorded(), 0);
        let error = run.error.unwrap();
        assert!(error.is_configuration_local());
        assert!(matches!(error, SearchError::Preparation { fold: 1, .. }));
    }

    proptest! {
        #[test]
        fn prop_weighted_average_matches_definition(
            pairs in prop::collection::vec((0.0f64..100.0, 1usize..50), 1..20)
        ) {
            let (values, weights): (Vec<f64>, Vec<usize>) = pairs.into_iter().unzip();
            let avg = weighted_average(&values, &weights).unwrap();

            let num: f64 = values.iter().zip(&weights).map(|(v, w)| v * *w as f64).sum();
            let den: f64 = weights.iter().map(|w| *w as f64).sum();
            prop_assert!((avg - num / den).abs() < 1e-9);

            let lo = values.iter().cloned().fold(f64::INFINITY, f64::min);
            let hi = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            prop_assert!(avg >= lo - 1e-9 && avg <= hi + 1e-9);
        }

        #[test]
        fn prop_record_sequences_stay_parallel(
            scores in prop::collection::vec(0.1f64..20.0, 1..6),
            thresh_skip in 0usize..4,
            pct in 0.0f64..1.5,
        ) {
            let n = scores.len();
            let features: Vec<Vec<f64>> = scores.iter().map(|s| vec![s * s]).collect();
            let data = Dataset::from_rows(features, vec![0.0; n]).unwrap();
            let folds: Vec<Fold> = (0..n)
                .map(|k| Fold::new((0..n).filter(|&i| i != k).collect(), vec![k]))
                .collect();
            let evaluator = evaluator();
            let policy = PruningPolicy::new(thresh_skip, pct).unwrap();
            let controller =
                PruningController::new(policy, &evaluator, &IdentityPreparer, &data, &folds);

            let configuration = Configuration::new("M", 0, ParamSet::new());
            let run = controller.evaluate(&configuration, &scripted, 10.0, &NoopObserver);
            let record = &run.record;

            prop_assert_eq!(record.scores("score").unwrap().len(), record.weights().len());
            prop_assert!(record.folds_recorded() <= n);
            prop_assert_eq!(record.folds_recorded() == n, !record.skipped());
            if record.skipped() {
                prop_assert_eq!(run.skip_count, thresh_skip);
            }
        }
    }
}
