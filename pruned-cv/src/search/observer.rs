//! Progress hooks for long-running searches.

use crate::grid::Configuration;

use super::report::ConfigurationRecord;

/// Snapshot taken after one fold of one configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct FoldProgress<'a> {
    pub configuration: &'a str,
    /// One-based fold number.
    pub fold: usize,
    pub n_folds: usize,
    pub skip_count: usize,
    pub running_average: f64,
    /// Global best the configuration is compared against.
    pub global_best: f64,
}

/// Receives search events. Every method defaults to a no-op.
///
/// Observers are shared across rayon workers in parallel mode, so events
/// from sibling configurations may interleave.
pub trait SearchObserver: Send + Sync {
    fn on_search_start(&self, _n_configurations: usize, _n_folds: usize) {}

    fn on_model_start(&self, _model: &str, _n_configurations: usize) {}

    fn on_configuration_start(&self, _configuration: &Configuration) {}

    fn on_fold_end(&self, _progress: &FoldProgress<'_>) {}

    fn on_configuration_end(&self, _configuration: &Configuration, _record: &ConfigurationRecord) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl SearchObserver for NoopObserver {}
