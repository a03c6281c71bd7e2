pub mod config;
pub mod data;
pub mod grid;
pub mod metrics;
pub mod models;
pub mod prepare;
pub mod search;
pub mod split;

// Re-export commonly used types
pub use config::{ConfigError, FoldKind, FoldSettings, SearchConfig};
pub use data::{Dataset, DatasetLoader};
pub use grid::{Configuration, HyperparameterGrid, ModelSpec, ParamSet, ParamValue};
pub use metrics::{ScoreSet, Scorer, TargetTransform};
pub use models::{Model, ModelError, ModelFactory, ModelRegistry};
pub use prepare::{DataPreparer, FoldPreparer, IdentityPreparer, PreparedFold};
pub use search::{
    ConfigurationRecord, ExecutionMode, GlobalBest, PerformanceReport, PruningPolicy,
    SearchError, SearchObserver, SearchOrchestrator, SearchResult, SearchRun,
};
pub use split::{Fold, FoldSplitter, KFold, StratifiedKFold};
