//! Per-configuration records and the nested performance report.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use statrs::statistics::Statistics;

use crate::grid::ParamSet;

use super::pruning::weighted_average;

/// Scores and weight of one evaluated fold.
#[derive(Debug, Clone, PartialEq)]
pub struct FoldResult {
    pub scores: IndexMap<String, f64>,
    /// Training-sample count of the fold.
    pub weight: usize,
}

/// Per-fold values of one score. Non-finite values are written as `null` by
/// serde_json, so `null` reads back as `NaN`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
struct FoldScores(Vec<f64>);

impl<'de> Deserialize<'de> for FoldScores {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let values = Vec::<Option<f64>>::deserialize(deserializer)?;
        Ok(Self(
            values
                .into_iter()
                .map(|v| v.unwrap_or(f64::NAN))
                .collect(),
        ))
    }
}

/// Terminal status of a configuration's fold loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    /// Still accepting folds.
    Running,
    Completed,
    Pruned,
    Failed,
}

/// Everything recorded for one configuration.
///
/// Serializes as one flat object: every score name maps to its per-fold
/// values, next to `weight`, `parameters`, `skipped`, `status` and (for
/// failed configurations) `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationRecord {
    #[serde(flatten)]
    scores: IndexMap<String, FoldScores>,
    #[serde(rename = "weight")]
    weights: Vec<usize>,
    parameters: ParamSet,
    skipped: bool,
    status: RecordStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ConfigurationRecord {
    /// Start an empty record for the given score names.
    pub fn new<S: AsRef<str>>(score_names: &[S], parameters: ParamSet) -> Self {
        Self {
            scores: score_names
                .iter()
                .map(|name| (name.as_ref().to_string(), FoldScores::default()))
                .collect(),
            weights: Vec::new(),
            parameters,
            skipped: false,
            status: RecordStatus::Running,
            error: None,
        }
    }

    /// Append one fold. Scores missing from `result` are recorded as `NaN`
    /// so every sequence stays as long as `weights`.
    pub fn push(&mut self, result: &FoldResult) {
        for (name, values) in self.scores.iter_mut() {
            values
                .0
                .push(result.scores.get(name).copied().unwrap_or(f64::NAN));
        }
        self.weights.push(result.weight);
    }

    /// Close the record after the fold loop ended normally or by pruning.
    pub fn finish(&mut self, pruned: bool) {
        self.skipped = pruned;
        self.status = if pruned {
            RecordStatus::Pruned
        } else {
            RecordStatus::Completed
        };
    }

    /// Close the record after a fold failed.
    pub fn fail(&mut self, error: String) {
        self.skipped = false;
        self.status = RecordStatus::Failed;
        self.error = Some(error);
    }

    pub fn folds_recorded(&self) -> usize {
        self.weights.len()
    }

    pub fn weights(&self) -> &[usize] {
        &self.weights
    }

    pub fn scores(&self, name: &str) -> Option<&[f64]> {
        self.scores.get(name).map(|values| values.0.as_slice())
    }

    pub fn score_names(&self) -> impl Iterator<Item = &str> {
        self.scores.keys().map(String::as_str)
    }

    pub fn parameters(&self) -> &ParamSet {
        &self.parameters
    }

    pub fn skipped(&self) -> bool {
        self.skipped
    }

    pub fn status(&self) -> RecordStatus {
        self.status
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Weighted average of a score over the recorded folds.
    pub fn weighted_average(&self, name: &str) -> Option<f64> {
        weighted_average(self.scores(name)?, &self.weights)
    }

    /// Standard deviation of a score across the recorded folds.
    pub fn score_std(&self, name: &str) -> Option<f64> {
        let values = self.scores(name)?;
        if values.len() < 2 {
            return None;
        }
        Some(values.std_dev())
    }
}

/// Model name → configuration name → record, in evaluation order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PerformanceReport(IndexMap<String, IndexMap<String, ConfigurationRecord>>);

/// A configuration picked out of a report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedConfiguration {
    pub model: String,
    pub configuration: String,
    pub score: f64,
    pub parameters: ParamSet,
}

impl PerformanceReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model so it appears even before its first record.
    pub fn add_model(&mut self, model: &str) {
        self.0.entry(model.to_string()).or_default();
    }

    pub fn insert(&mut self, model: &str, configuration: &str, record: ConfigurationRecord) {
        self.0
            .entry(model.to_string())
            .or_default()
            .insert(configuration.to_string(), record);
    }

    pub fn get(&self, model: &str) -> Option<&IndexMap<String, ConfigurationRecord>> {
        self.0.get(model)
    }

    pub fn record(&self, model: &str, configuration: &str) -> Option<&ConfigurationRecord> {
        self.0.get(model)?.get(configuration)
    }

    pub fn models(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Number of models.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate `(model, configuration, record)` in evaluation order.
    pub fn records(&self) -> impl Iterator<Item = (&str, &str, &ConfigurationRecord)> {
        self.0.iter().flat_map(|(model, configs)| {
            configs
                .iter()
                .map(move |(name, record)| (model.as_str(), name.as_str(), record))
        })
    }

    pub fn n_configurations(&self) -> usize {
        self.0.values().map(IndexMap::len).sum()
    }

    /// Count of records per terminal status.
    pub fn status_counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for (_, _, record) in self.records() {
            match record.status() {
                RecordStatus::Completed => counts.completed += 1,
                RecordStatus::Pruned => counts.pruned += 1,
                RecordStatus::Failed => counts.failed += 1,
                RecordStatus::Running => {}
            }
        }
        counts
    }

    /// Completed configurations ordered by weighted-average `score`, highest
    /// first. Pruned and failed configurations are left out.
    pub fn ranking(&self, score: &str) -> Vec<RankedConfiguration> {
        let mut ranked: Vec<RankedConfiguration> = self
            .records()
            .filter(|(_, _, record)| record.status() == RecordStatus::Completed)
            .filter_map(|(model, name, record)| {
                let avg = record.weighted_average(score)?;
                if avg.is_nan() {
                    return None;
                }
                Some(RankedConfiguration {
                    model: model.to_string(),
                    configuration: name.to_string(),
                    score: avg,
                    parameters: record.parameters().clone(),
                })
            })
            .collect();
        ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        ranked
    }

    /// Highest weighted-average `score` among non-skipped configurations.
    pub fn best(&self, score: &str) -> Option<RankedConfiguration> {
        self.ranking(score).into_iter().next()
    }

    /// Plain-text table of every configuration.
    pub fn summary(&self, score: &str) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "| {:<24} | {:>6} | {:>14} | {:>10} | {:<9} | parameters\n",
            "configuration", "folds", score, "std", "status"
        ));
        out.push_str(&format!(
            "|{:-<26}|{:-<8}|{:-<16}|{:-<12}|{:-<11}|-----------\n",
            "", "", "", "", ""
        ));

        for (_, name, record) in self.records() {
            let avg = record
                .weighted_average(score)
                .map(|v| format!("{:.4}", v))
                .unwrap_or_else(|| "-".to_string());
            let std = record
                .score_std(score)
                .map(|v| format!("{:.4}", v))
                .unwrap_or_else(|| "-".to_string());
            let status = match record.status() {
                RecordStatus::Completed => "completed",
                RecordStatus::Pruned => "pruned",
                RecordStatus::Failed => "failed",
                RecordStatus::Running => "running",
            };
            out.push_str(&format!(
                "| {:<24} | {:>6} | {:>14} | {:>10} | {:<9} | {}\n",
                name,
                record.folds_recorded(),
                avg,
                std,
                status,
                record.parameters()
            ));
        }

        let counts = self.status_counts();
        out.push_str(&format!(
            "\n{} configurations: {} completed, {} pruned, {} failed\n",
            self.n_configurations(),
            counts.completed,
            counts.pruned,
            counts.failed
        ));
        if let Some(best) = self.best(score) {
            out.push_str(&format!(
                "Best: {} ({}) {} = {:.4} {}\n",
                best.configuration, best.model, score, best.score, best.parameters
            ));
        }
        out
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub completed: usize,
    pub pruned: usize,
    pub failed: usize,
}

/// Settings and outcome of one search run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub n_folds: usize,
    pub primary_score: String,
    pub thresh_skip: usize,
    pub thresh_percentage: f64,
    /// Global best when the search ended.
    pub global_best: f64,
    pub counts: StatusCounts,
}

/// A report together with its run metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRun {
    pub metadata: RunMetadata,
    pub report: PerformanceReport,
}
