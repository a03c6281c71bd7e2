//! Dataset loader for CSV and Parquet files.
//!
//! Reads a tabular file through polars, picks one column as the regression
//! target and turns every other (numeric) column into an `f64` feature.
//! Null feature cells become `NaN`; null targets are rejected.

use std::path::Path;

use polars::prelude::*;
use thiserror::Error;
use tracing::{debug, info};

use super::types::{Dataset, DatasetError};

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("Target column not found: {0}")]
    MissingTarget(String),

    #[error("Column {0} is not numeric")]
    NonNumeric(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),

    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),
}

/// Supported on-disk formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Csv,
    Parquet,
}

impl FileFormat {
    /// Guess the format from the file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "parquet" | "pq" => Some(Self::Parquet),
            _ => None,
        }
    }
}

/// Loads a `Dataset` from a tabular file.
pub struct DatasetLoader {
    target: String,
    drop_columns: Vec<String>,
}

impl DatasetLoader {
    /// Create a loader that uses `target` as the target column.
    pub fn new(target: &str) -> Self {
        Self {
            target: target.to_string(),
            drop_columns: Vec::new(),
        }
    }

    /// Exclude these columns from the feature set.
    pub fn with_dropped_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.drop_columns.extend(columns.into_iter().map(Into::into));
        self
    }

    /// Scan the file lazily.
    pub fn scan(&self, path: &Path) -> Result<LazyFrame, LoaderError> {
        if !path.exists() {
            return Err(LoaderError::FileNotFound(path.display().to_string()));
        }

        let format = FileFormat::from_path(path)
            .ok_or_else(|| LoaderError::UnsupportedFormat(path.display().to_string()))?;

        let lf = match format {
            FileFormat::Csv => LazyCsvReader::new(path).with_has_header(true).finish()?,
            FileFormat::Parquet => LazyFrame::scan_parquet(path, ScanArgsParquet::default())?,
        };
        Ok(lf)
    }

    /// Load the file into a `Dataset`.
    pub fn load(&self, path: &Path) -> Result<Dataset, LoaderError> {
        let df = self.scan(path)?.collect()?;
        info!(
            "Loaded {} rows x {} columns from {}",
            df.height(),
            df.width(),
            path.display()
        );
        self.dataframe_to_dataset(&df)
    }

    /// Convert an in-memory DataFrame into a `Dataset`.
    pub fn dataframe_to_dataset(&self, df: &DataFrame) -> Result<Dataset, LoaderError> {
        let column_names: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|name| name.to_string())
            .collect();

        if !column_names.contains(&self.target) {
            return Err(LoaderError::MissingTarget(self.target.clone()));
        }

        let targets = column_as_f64(df, &self.target)?;
        if let Some(row) = targets.iter().position(|t| t.is_nan()) {
            return Err(LoaderError::InvalidData(format!(
                "Target {} is missing at row {}",
                self.target, row
            )));
        }

        let feature_names: Vec<String> = column_names
            .into_iter()
            .filter(|name| name != &self.target && !self.drop_columns.contains(name))
            .collect();

        let mut columns = Vec::with_capacity(feature_names.len());
        for name in &feature_names {
            columns.push(column_as_f64(df, name)?);
        }

        let features: Vec<Vec<f64>> = (0..df.height())
            .map(|row| columns.iter().map(|column| column[row]).collect())
            .collect();

        debug!(
            "Built dataset with {} features, target {}",
            feature_names.len(),
            self.target
        );

        Ok(Dataset::new(feature_names, features, targets)?)
    }
}

/// Read one column as `f64`, mapping nulls to `NaN`.
fn column_as_f64(df: &DataFrame, name: &str) -> Result<Vec<f64>, LoaderError> {
    let column = df.column(name)?;
    if column.dtype() == &DataType::String {
        return Err(LoaderError::NonNumeric(name.to_string()));
    }

    let casted = column.cast(&DataType::Float64)?;
    let values = casted
        .f64()?
        .into_iter()
        .map(|v| v.unwrap_or(f64::NAN))
        .collect();
    Ok(values)
}
