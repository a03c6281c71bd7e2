//! Pruned cross-validation search CLI
//!
//! Usage:
//!   # Run a search and write the report
//!   pruned-cv run --config search.json --data train.csv --target price --output report.json
//!
//!   # List the configurations a search would evaluate
//!   pruned-cv grid --config search.json
//!
//!   # Rank the configurations of a saved report
//!   pruned-cv summarize --report report.json --primary mean_squared_error

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use tracing::info;

use pruned_cv::grid::Configuration;
use pruned_cv::search::{ConfigurationRecord, RecordStatus, SearchObserver};
use pruned_cv::{DatasetLoader, ModelRegistry, PerformanceReport, SearchConfig, SearchRun};

#[derive(Parser)]
#[command(name = "pruned-cv")]
#[command(about = "Hyperparameter search with pruned k-fold cross-validation")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a search over a dataset
    Run {
        /// Path to the JSON search configuration
        #[arg(short, long)]
        config: PathBuf,

        /// Path to a CSV or Parquet dataset
        #[arg(short, long)]
        data: PathBuf,

        /// Name of the target column
        #[arg(short, long)]
        target: String,

        /// Columns to ignore, comma separated
        #[arg(long = "drop", value_delimiter = ',')]
        drop_columns: Vec<String>,

        /// Where to write the JSON report
        #[arg(short, long, default_value = "report.json")]
        output: PathBuf,
    },

    /// List the configurations of every model
    Grid {
        /// Path to the JSON search configuration
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Print a ranking of a saved report
    Summarize {
        /// Path to a report written by `run`
        #[arg(short, long)]
        report: PathBuf,

        /// Score to rank by
        #[arg(short, long)]
        primary: Option<String>,
    },
}

/// Advances one tick per finished configuration.
struct ProgressObserver {
    bar: ProgressBar,
}

impl ProgressObserver {
    fn new() -> Result<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")?
                .progress_chars("=>-"),
        );
        Ok(Self { bar })
    }
}

impl SearchObserver for ProgressObserver {
    fn on_search_start(&self, n_configurations: usize, _n_folds: usize) {
        self.bar.set_length(n_configurations as u64);
    }

    fn on_model_start(&self, model: &str, _n_configurations: usize) {
        self.bar.set_message(model.to_string());
    }

    fn on_configuration_end(&self, configuration: &Configuration, record: &ConfigurationRecord) {
        let tag = match record.status() {
            RecordStatus::Pruned => " (pruned)",
            RecordStatus::Failed => " (failed)",
            _ => "",
        };
        self.bar.set_message(format!("{}{}", configuration.name, tag));
        self.bar.inc(1);
    }
}

/// `run` writes a full `SearchRun`; a bare report is accepted too.
#[derive(Deserialize)]
#[serde(untagged)]
enum ReportFile {
    Run(SearchRun),
    Report(PerformanceReport),
}

fn cmd_run(
    config_path: PathBuf,
    data: PathBuf,
    target: String,
    drop_columns: Vec<String>,
    output: PathBuf,
) -> Result<()> {
    let config = SearchConfig::from_file(&config_path)
        .with_context(|| format!("Failed to load config {}", config_path.display()))?;

    let dataset = DatasetLoader::new(&target)
        .with_dropped_columns(drop_columns)
        .load(&data)
        .with_context(|| format!("Failed to load dataset {}", data.display()))?;

    let orchestrator = config.orchestrator(ModelRegistry::with_builtin())?;
    let splitter = config.splitter();
    let observer = ProgressObserver::new()?;

    let run = orchestrator.run_observed(
        &dataset,
        &config.models,
        splitter.as_ref(),
        &config.preparation,
        &observer,
    );
    observer.bar.finish_and_clear();
    let run = run.context("Search failed")?;

    let json = serde_json::to_string_pretty(&run)?;
    fs::write(&output, json)
        .with_context(|| format!("Failed to write report {}", output.display()))?;
    info!("Report written to {}", output.display());

    println!("{}", run.report.summary(&run.metadata.primary_score));
    Ok(())
}

fn cmd_grid(config_path: PathBuf) -> Result<()> {
    let config = SearchConfig::from_file(&config_path)
        .with_context(|| format!("Failed to load config {}", config_path.display()))?;
    let orchestrator = config.orchestrator(ModelRegistry::with_builtin())?;

    let mut total = 0;
    for model in orchestrator.plan(&config.models)? {
        println!("{} ({})", model.model_name, model.model_id);
        for configuration in &model.configurations {
            println!("  {:<28} {}", configuration.name, configuration.params);
        }
        total += model.configurations.len();
    }
    println!(
        "\n{} configurations x {} folds",
        total,
        config.splitter().n_splits()
    );
    Ok(())
}

fn cmd_summarize(report_path: PathBuf, primary: Option<String>) -> Result<()> {
    let content = fs::read_to_string(&report_path)
        .with_context(|| format!("Failed to read report {}", report_path.display()))?;
    let file: ReportFile = serde_json::from_str(&content).context("Invalid report file")?;

    let (report, recorded_primary) = match file {
        ReportFile::Run(run) => (run.report, Some(run.metadata.primary_score)),
        ReportFile::Report(report) => (report, None),
    };
    let primary = primary
        .or(recorded_primary)
        .context("No primary score given and none recorded in the report")?;

    println!("{}", report.summary(&primary));
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("pruned_cv={}", level).parse()?),
        )
        .init();

    match cli.command {
        Commands::Run {
            config,
            data,
            target,
            drop_columns,
            output,
        } => cmd_run(config, data, target, drop_columns, output),
        Commands::Grid { config } => cmd_grid(config),
        Commands::Summarize { report, primary } => cmd_summarize(report, primary),
    }
}
