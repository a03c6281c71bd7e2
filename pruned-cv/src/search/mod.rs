//! Pruned cross-validation search.
//!
//! - `SearchOrchestrator`: iterates models and configurations, owns the
//!   global best
//! - `PruningController`: the per-configuration fold loop and skip rule
//! - `Evaluator`: fits one model on one prepared fold and scores it
//! - `PerformanceReport`: nested model → configuration → record output

pub mod error;
pub mod evaluator;
pub mod observer;
pub mod orchestrator;
pub mod pruning;
pub mod report;

pub use error::{SearchError, SearchResult};
pub use evaluator::Evaluator;
pub use observer::{FoldProgress, NoopObserver, SearchObserver};
pub use orchestrator::{ExecutionMode, SearchOrchestrator};
pub use pruning::{
    weighted_average, ConfigurationRun, GlobalBest, PruningController, PruningPolicy, PruningState,
};
pub use report::{
    ConfigurationRecord, FoldResult, PerformanceReport, RankedConfiguration, RecordStatus,
    RunMetadata, SearchRun, StatusCounts,
};
