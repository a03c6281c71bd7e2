//! Model × configuration × fold search driver.

use chrono::Utc;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::data::Dataset;
use crate::grid::{Configuration, ConfigurationGenerator, ModelConfigurations, ModelSpec};
use crate::metrics::{ScoreSet, TargetTransform};
use crate::models::ModelRegistry;
use crate::prepare::DataPreparer;
use crate::split::{validate_folds, FoldSplitter};

use super::error::SearchResult;
use super::evaluator::Evaluator;
use super::observer::{NoopObserver, SearchObserver};
use super::pruning::{ConfigurationRun, GlobalBest, PruningController, PruningPolicy, PruningState};
use super::report::{PerformanceReport, RunMetadata, SearchRun};

/// How the configurations of one model are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// One configuration at a time; each sees every earlier final average.
    #[default]
    Sequential,
    /// Configurations of a model run concurrently against the global best
    /// as it stood when the model started. Final averages are applied in
    /// enumeration order afterwards.
    ParallelFrozenBest,
}

/// Runs the pruned cross-validation search.
#[derive(Debug)]
pub struct SearchOrchestrator {
    registry: ModelRegistry,
    evaluator: Evaluator,
    policy: PruningPolicy,
    execution: ExecutionMode,
    fail_fast: bool,
}

impl SearchOrchestrator {
    /// Scores are computed on the prepared targets as-is until
    /// `with_postprocess` says otherwise.
    pub fn new(registry: ModelRegistry, scores: ScoreSet) -> Self {
        Self {
            registry,
            evaluator: Evaluator::new(scores, TargetTransform::Identity),
            policy: PruningPolicy::default(),
            execution: ExecutionMode::default(),
            fail_fast: false,
        }
    }

    pub fn with_policy(mut self, policy: PruningPolicy) -> SearchResult<Self> {
        policy.validate()?;
        self.policy = policy;
        Ok(self)
    }

    pub fn with_postprocess(mut self, postprocess: TargetTransform) -> Self {
        self.evaluator = Evaluator::new(self.evaluator.scores().clone(), postprocess);
        self
    }

    pub fn with_execution(mut self, execution: ExecutionMode) -> Self {
        self.execution = execution;
        self
    }

    /// Propagate the first fit or preparation error instead of recording the
    /// configuration as failed.
    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn policy(&self) -> &PruningPolicy {
        &self.policy
    }

    /// Enumerate every configuration without evaluating anything.
    pub fn plan(&self, specs: &[ModelSpec]) -> SearchResult<Vec<ModelConfigurations>> {
        ConfigurationGenerator::new(&self.registry).expand_all(specs)
    }

    pub fn run(
        &self,
        dataset: &Dataset,
        specs: &[ModelSpec],
        splitter: &dyn FoldSplitter,
        preparer: &dyn DataPreparer,
    ) -> SearchResult<PerformanceReport> {
        self.run_observed(dataset, specs, splitter, preparer, &NoopObserver)
            .map(|run| run.report)
    }

    /// Run the search, reporting progress to `observer`.
    ///
    /// Grids are expanded and folds computed before any model is fitted, so
    /// grid, resolution and split errors abort the search up front.
    pub fn run_observed(
        &self,
        dataset: &Dataset,
        specs: &[ModelSpec],
        splitter: &dyn FoldSplitter,
        preparer: &dyn DataPreparer,
        observer: &dyn SearchObserver,
    ) -> SearchResult<SearchRun> {
        let started_at = Utc::now();

        let models = self.plan(specs)?;
        let folds = splitter.split(dataset)?;
        validate_folds(&folds, dataset.len())?;

        let n_configurations: usize = models.iter().map(|m| m.configurations.len()).sum();
        info!(
            "Searching {} configurations of {} models over {} folds (thresh_skip={}, thresh_percentage={})",
            n_configurations,
            models.len(),
            folds.len(),
            self.policy.thresh_skip,
            self.policy.thresh_percentage
        );
        observer.on_search_start(n_configurations, folds.len());

        let controller =
            PruningController::new(self.policy, &self.evaluator, preparer, dataset, &folds);
        let mut best = GlobalBest::new();
        let mut report = PerformanceReport::new();

        for model in &models {
            info!(
                "Model {} ({}): {} configurations",
                model.model_name,
                model.model_id,
                model.configurations.len()
            );
            observer.on_model_start(&model.model_name, model.configurations.len());
            report.add_model(&model.model_name);

            match self.execution {
                ExecutionMode::Sequential => {
                    for configuration in &model.configurations {
                        observer.on_configuration_start(configuration);
                        let run = controller.run(
                            configuration,
                            model.factory.as_ref(),
                            &mut best,
                            observer,
                        );
                        self.record(&mut report, configuration, run, observer)?;
                    }
                }
                ExecutionMode::ParallelFrozenBest => {
                    let frozen = best.value();
                    let runs: Vec<ConfigurationRun> = model
                        .configurations
                        .par_iter()
                        .map(|configuration| {
                            observer.on_configuration_start(configuration);
                            controller.evaluate(
                                configuration,
                                model.factory.as_ref(),
                                frozen,
                                observer,
                            )
                        })
                        .collect();

                    for (configuration, run) in model.configurations.iter().zip(runs) {
                        run.apply_to(&mut best, &self.policy);
                        self.record(&mut report, configuration, run, observer)?;
                    }
                }
            }

            info!("Model {} done, global best {:.6}", model.model_name, best.value());
        }

        let counts = report.status_counts();
        info!(
            "Search finished: {} completed, {} pruned, {} failed, global best {:.6}",
            counts.completed,
            counts.pruned,
            counts.failed,
            best.value()
        );

        Ok(SearchRun {
            metadata: RunMetadata {
                started_at,
                finished_at: Utc::now(),
                n_folds: folds.len(),
                primary_score: self.evaluator.scores().primary().to_string(),
                thresh_skip: self.policy.thresh_skip,
                thresh_percentage: self.policy.thresh_percentage,
                global_best: best.value(),
                counts,
            },
            report,
        })
    }

    fn record(
        &self,
        report: &mut PerformanceReport,
        configuration: &Configuration,
        run: ConfigurationRun,
        observer: &dyn SearchObserver,
    ) -> SearchResult<()> {
        debug!(
            "{} {}: {:?} after {} folds, average {}",
            configuration.name,
            configuration.params,
            run.state,
            run.record.folds_recorded(),
            run.final_average
                .map(|avg| format!("{:.6}", avg))
                .unwrap_or_else(|| "-".to_string())
        );
        observer.on_configuration_end(configuration, &run.record);

        if let (PruningState::Failed, Some(error)) = (run.state, run.error) {
            if self.fail_fast {
                return Err(error);
            }
        }
        report.insert(&configuration.model, &configuration.name, run.record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::grid::{HyperparameterGrid, ParamSet, ParamValue};
    use crate::metrics::Scorer;
    use crate::models::{param_f64, Model, ModelError};
    use crate::prepare::IdentityPreparer;
    use crate::search::report::{ConfigurationRecord, RecordStatus};
    use crate::search::SearchError;
    use crate::split::KFold;

    /// Predicts the constant `level`; refuses to fit when `level` is negative.
    struct Constant(f64);

    impl Model for Constant {
        fn fit(&mut self, _: &[Vec<f64>], _: &[f64]) -> Result<(), ModelError> {
            if self.0 < 0.0 {
                return Err(ModelError::Other("negative level".to_string()));
            }
            Ok(())
        }

        fn predict(&self, features: &[Vec<f64>]) -> Result<Vec<f64>, ModelError> {
            Ok(vec![self.0; features.len()])
        }
    }

    fn constant(params: &ParamSet) -> Result<Box<dyn Model>, ModelError> {
        Ok(Box::new(Constant(param_f64(params, "level", 0.0)?)))
    }

    fn registry() -> ModelRegistry {
        let mut registry = ModelRegistry::with_builtin();
        registry.register("testing.Constant", constant);
        registry
    }

    /// Scores each fold as `sqrt(level²) = |level|`.
    fn scores() -> ScoreSet {
        ScoreSet::new(
            vec![
                Scorer::new("level", |_, p| p[0] * p[0]),
                Scorer::new("mean_squared_error", crate::metrics::scores::mean_squared_error),
            ],
            "level",
        )
        .unwrap()
    }

    fn dataset() -> Dataset {
        let features: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64, (i % 3) as f64]).collect();
        let targets: Vec<f64> = (0..10).map(|i| 1.0 + 0.5 * i as f64).collect();
        Dataset::from_rows(features, targets).unwrap()
    }

    fn levels(values: &[f64]) -> ModelSpec {
        ModelSpec::new(
            "testing.Constant",
            HyperparameterGrid::new().with("level", values.iter().copied()),
        )
    }

    fn orchestrator() -> SearchOrchestrator {
        SearchOrchestrator::new(registry(), scores())
            .with_postprocess(TargetTransform::Identity)
    }

    #[test]
    fn test_report_shape() {
        let specs = vec![
            ModelSpec::new(
                "linear_model.Ridge",
                HyperparameterGrid::new().with("alpha", [0.1, 1.0, 10.0]),
            ),
            ModelSpec::new(
                "neighbors.KNeighborsRegressor",
                HyperparameterGrid::new().with("n_neighbors", [1i64, 3]),
            ),
        ];
        let scores =
            ScoreSet::from_names(&["mean_squared_error", "r2_score"], "mean_squared_error").unwrap();
        let orchestrator = SearchOrchestrator::new(ModelRegistry::with_builtin(), scores)
            .with_postprocess(TargetTransform::Identity);

        let report = orchestrator
            .run(&dataset(), &specs, &KFold::new(5), &IdentityPreparer)
            .unwrap();

        assert_eq!(report.len(), 2);
        let ridge: Vec<&String> = report.get("Ridge").unwrap().keys().collect();
        assert_eq!(ridge, vec!["Ridge_0", "Ridge_1", "Ridge_2"]);
        let knn: Vec<&String> = report.get("KNeighborsRegressor").unwrap().keys().collect();
        assert_eq!(knn, vec!["KNeighborsRegressor_0", "KNeighborsRegressor_1"]);

        let json = serde_json::to_value(&report).unwrap();
        for configs in json.as_object().unwrap().values() {
            for record in configs.as_object().unwrap().values() {
                for key in ["mean_squared_error", "r2_score", "weight", "parameters", "skipped"] {
                    assert!(record.get(key).is_some(), "missing {}", key);
                }
                assert_eq!(record["weight"], serde_json::json!([8, 8, 8, 8, 8]));
            }
        }
    }

    #[test]
    fn test_sequential_pruning_sees_earlier_results() {
        let orchestrator = orchestrator()
            .with_policy(PruningPolicy::new(2, 0.9).unwrap())
            .unwrap();
        let specs = vec![levels(&[10.0, 5.0, 9.5])];

        let run = orchestrator
            .run_observed(&dataset(), &specs, &KFold::new(5), &IdentityPreparer, &NoopObserver)
            .unwrap();
        let report = &run.report;

        let first = report.record("Constant", "Constant_0").unwrap();
        assert_eq!(first.status(), RecordStatus::Completed);
        assert_eq!(first.folds_recorded(), 5);

        // 5 < 0.9 * 10 twice, then pruned
        let second = report.record("Constant", "Constant_1").unwrap();
        assert!(second.skipped());
        assert_eq!(second.folds_recorded(), 2);

        let third = report.record("Constant", "Constant_2").unwrap();
        assert_eq!(third.status(), RecordStatus::Completed);

        assert_eq!(run.metadata.global_best, 10.0);
        assert_eq!(run.metadata.counts.pruned, 1);
        assert_eq!(run.metadata.n_folds, 5);
        assert_eq!(report.best("level").unwrap().configuration, "Constant_0");
    }

    #[test]
    fn test_parallel_mode_freezes_best_per_model() {
        let specs = vec![
            levels(&[10.0, 5.0]),
            ModelSpec::new(
                "dummy.DummyRegressor",
                HyperparameterGrid::new().with("strategy", ["mean"]),
            ),
        ];
        let policy = PruningPolicy::new(2, 0.9).unwrap();

        let sequential = orchestrator()
            .with_policy(policy)
            .unwrap()
            .run(&dataset(), &specs, &KFold::new(5), &IdentityPreparer)
            .unwrap();
        assert!(sequential.record("Constant", "Constant_1").unwrap().skipped());

        // Both siblings start from a best of 0, so neither is pruned
        let parallel = orchestrator()
            .with_policy(policy)
            .unwrap()
            .with_execution(ExecutionMode::ParallelFrozenBest)
            .run_observed(&dataset(), &specs, &KFold::new(5), &IdentityPreparer, &NoopObserver)
            .unwrap();
        let report = &parallel.report;
        assert!(!report.record("Constant", "Constant_1").unwrap().skipped());
        assert_eq!(report.record("Constant", "Constant_1").unwrap().folds_recorded(), 5);
        assert_eq!(parallel.metadata.global_best, 10.0);

        let names: Vec<&str> = report.models().collect();
        assert_eq!(names, vec!["Constant", "DummyRegressor"]);
    }

    #[test]
    fn test_zero_percentage_is_plain_cross_validation() {
        let orchestrator = orchestrator()
            .with_policy(PruningPolicy::new(1, 0.0).unwrap())
            .unwrap();
        let run = orchestrator
            .run_observed(
                &dataset(),
                &[levels(&[10.0, 1.0, 3.0])],
                &KFold::new(4),
                &IdentityPreparer,
                &NoopObserver,
            )
            .unwrap();

        assert_eq!(run.metadata.global_best, 0.0);
        assert_eq!(run.metadata.counts.completed, 3);
        for (_, _, record) in run.report.records() {
            assert_eq!(record.folds_recorded(), 4);
        }
    }

    #[test]
    fn test_failed_configuration_is_recorded() {
        let orchestrator = orchestrator()
            .with_policy(PruningPolicy::new(2, 0.9).unwrap())
            .unwrap();
        let report = orchestrator
            .run(
                &dataset(),
                &[levels(&[-1.0, 2.0])],
                &KFold::new(5),
                &IdentityPreparer,
            )
            .unwrap();

        let failed = report.record("Constant", "Constant_0").unwrap();
        assert_eq!(failed.status(), RecordStatus::Failed);
        assert!(!failed.skipped());
        assert_eq!(failed.folds_recorded(), 0);
        assert!(failed.error().unwrap().contains("negative level"));

        let next = report.record("Constant", "Constant_1").unwrap();
        assert_eq!(next.status(), RecordStatus::Completed);
    }

    #[test]
    fn test_fail_fast_propagates() {
        let orchestrator = orchestrator().with_fail_fast(true);
        let err = orchestrator
            .run(&dataset(), &[levels(&[-1.0])], &KFold::new(5), &IdentityPreparer)
            .unwrap_err();
        assert!(matches!(err, SearchError::Fit { fold: 1, .. }));
    }

    #[test]
    fn test_grid_errors_abort_before_fitting() {
        let orchestrator = orchestrator();

        let unknown = ModelSpec::new(
            "ensemble.RandomForestRegressor",
            HyperparameterGrid::new().with("n_estimators", [10i64]),
        );
        assert!(matches!(
            orchestrator.run(&dataset(), &[unknown], &KFold::new(5), &IdentityPreparer),
            Err(SearchError::UnresolvableModel(_))
        ));

        let empty = ModelSpec::new("testing.Constant", HyperparameterGrid::new());
        assert!(matches!(
            orchestrator.run(&dataset(), &[empty], &KFold::new(5), &IdentityPreparer),
            Err(SearchError::InvalidGrid { .. })
        ));

        assert!(matches!(
            orchestrator.run(&dataset(), &[levels(&[1.0])], &KFold::new(11), &IdentityPreparer),
            Err(SearchError::Split(_))
        ));
    }

    #[derive(Default)]
    struct Events(Mutex<Vec<String>>);

    impl SearchObserver for Events {
        fn on_search_start(&self, n_configurations: usize, n_folds: usize) {
            self.0
                .lock()
                .unwrap()
                .push(format!("search {} {}", n_configurations, n_folds));
        }

        fn on_model_start(&self, model: &str, _: usize) {
            self.0.lock().unwrap().push(format!("model {}", model));
        }

        fn on_configuration_end(&self, configuration: &Configuration, record: &ConfigurationRecord) {
            self.0.lock().unwrap().push(format!(
                "end {} {}",
                configuration.name,
                record.folds_recorded()
            ));
        }
    }

    #[test]
    fn test_observer_events() {
        let events = Events::default();
        orchestrator()
            .run_observed(
                &dataset(),
                &[levels(&[1.0, 2.0])],
                &KFold::new(2),
                &IdentityPreparer,
                &events,
            )
            .unwrap();

        let events = events.0.into_inner().unwrap();
        assert_eq!(
            events,
            vec![
                "search 2 2",
                "model Constant",
                "end Constant_0 2",
                "end Constant_1 2"
            ]
        );
    }

    #[test]
    fn test_plan_lists_configurations() {
        let planned = orchestrator().plan(&[levels(&[1.0, 2.0, 3.0])]).unwrap();
        assert_eq!(planned.len(), 1);
        assert_eq!(planned[0].configurations.len(), 3);
        assert_eq!(
            planned[0].configurations[2].params.get("level"),
            Some(&ParamValue::Float(3.0))
        );
    }
}
