//! Pre-materialized external time series (prices, local generation,
//! fixed loads) and the CSV-loading helper that builds one.
//!
//! The simulation core never reads a file handle directly — scenario
//! generation is an external collaborator's job — but a complete crate
//! still needs the resampling step that turns a raw CSV column into the
//! piecewise-constant function of time the stepper consumes, so this
//! module provides it using the `csv` crate.

use std::path::Path;

use chrono::{DateTime, Duration, FixedOffset};

use crate::error::CoreError;

/// A piecewise-constant function of time: holds each value for
/// `step_duration` starting at `start_time`, and holds the last observed
/// value for any time past the end of the series.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries {
    start_time: DateTime<FixedOffset>,
    step_duration_s: u32,
    values: Vec<f32>,
}

impl TimeSeries {
    pub fn new(start_time: DateTime<FixedOffset>, step_duration_s: u32, values: Vec<f32>) -> Self {
        assert!(step_duration_s > 0, "step_duration_s must be positive");
        assert!(!values.is_empty(), "a time series needs at least one value");
        Self {
            start_time,
            step_duration_s,
            values,
        }
    }

    /// The value in effect at `time`: before the series starts, the first
    /// value; past its end, the last.
    pub fn value_at(&self, time: DateTime<FixedOffset>) -> f32 {
        if time <= self.start_time {
            return self.values[0];
        }
        let elapsed_s = (time - self.start_time).num_seconds().max(0) as u64;
        let index = (elapsed_s / self.step_duration_s as u64) as usize;
        self.values[index.min(self.values.len() - 1)]
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Builds a series by reading `column` out of the CSV at `path`,
    /// scaling every value by `factor` (e.g. to convert units or apply a
    /// scenario-level scaling preset), resampled at one value per
    /// `step_duration_s` starting at `start_time`.
    pub fn from_csv(
        path: impl AsRef<Path>,
        column: &str,
        start_time: DateTime<FixedOffset>,
        step_duration_s: u32,
        factor: f32,
    ) -> Result<Self, CoreError> {
        let mut reader = csv::ReaderBuilder::new().from_path(path)?;
        let headers = reader.headers()?.clone();
        let column_index = headers.iter().position(|h| h == column).ok_or_else(|| {
            CoreError::Config(crate::error::ConfigError::new(
                "timeseries.column",
                format!("no column named `{column}` in CSV header"),
            ))
        })?;

        let mut values = Vec::new();
        for result in reader.records() {
            let record = result?;
            let raw = record.get(column_index).ok_or_else(|| {
                CoreError::Config(crate::error::ConfigError::new(
                    "timeseries.column",
                    format!("row missing column `{column}`"),
                ))
            })?;
            let value: f32 = raw.trim().parse().map_err(|_| {
                CoreError::Config(crate::error::ConfigError::new(
                    "timeseries.column",
                    format!("value `{raw}` in column `{column}` is not a number"),
                ))
            })?;
            values.push(value * factor);
        }
        if values.is_empty() {
            return Err(CoreError::Config(crate::error::ConfigError::new(
                "timeseries.column",
                format!("CSV has no data rows for column `{column}`"),
            )));
        }
        Ok(Self::new(start_time, step_duration_s, values))
    }
}
