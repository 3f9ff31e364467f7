//! Data Processor Module
//! Row filters and typed column extraction over loaded record tables.

use chrono::{NaiveDate, NaiveDateTime};
use polars::prelude::*;
use std::collections::HashSet;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProcessorError {
    #[error("Polars error: {0}")]
    PolarsError(#[from] PolarsError),
    #[error("Column not found: {0}")]
    MissingColumn(String),
}

fn unix_epoch() -> NaiveDate {
    NaiveDate::default()
}

/// Days since 1970-01-01, the physical representation of a Polars `Date`.
pub fn date_to_epoch_days(date: NaiveDate) -> i32 {
    date.signed_duration_since(unix_epoch()).num_days() as i32
}

pub fn epoch_days_to_date(days: i32) -> Option<NaiveDate> {
    unix_epoch().checked_add_signed(chrono::Duration::days(days as i64))
}

/// Parse a stored date rendered as text (`YYYY-MM-DD`, optionally with a time).
fn parse_date_text(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
                .ok()
                .map(|dt| dt.date())
        })
        .or_else(|| {
            NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|dt| dt.date())
        })
}

/// Handles filtering and column extraction.
pub struct DataProcessor;

impl DataProcessor {
    fn series<'a>(df: &'a DataFrame, column: &str) -> Result<&'a Series, ProcessorError> {
        df.column(column)
            .map(|col| col.as_materialized_series())
            .map_err(|_| ProcessorError::MissingColumn(column.to_string()))
    }

    /// Column values rendered as text.
    pub fn text_values(df: &DataFrame, column: &str) -> Result<Vec<Option<String>>, ProcessorError> {
        let text = Self::series(df, column)?.cast(&DataType::String)?;
        let values = text
            .str()?
            .into_iter()
            .map(|v| v.map(str::to_string))
            .collect();
        Ok(values)
    }

    /// Column values as floats; anything non-numeric becomes `None`.
    pub fn float_values(df: &DataFrame, column: &str) -> Result<Vec<Option<f64>>, ProcessorError> {
        let series = Self::series(df, column)?;

        let values: Vec<Option<f64>> = if series.dtype() == &DataType::String {
            series
                .str()?
                .into_iter()
                .map(|v| v.and_then(|s| s.trim().parse::<f64>().ok()))
                .map(|v| v.filter(|f| !f.is_nan()))
                .collect()
        } else {
            let floats = series.cast(&DataType::Float64)?;
            let values: Vec<Option<f64>> = floats
                .f64()?
                .into_iter()
                .map(|v| v.filter(|f| !f.is_nan()))
                .collect();
            values
        };
        Ok(values)
    }

    /// Column values as calendar dates.
    pub fn date_values(df: &DataFrame, column: &str) -> Result<Vec<Option<NaiveDate>>, ProcessorError> {
        let series = Self::series(df, column)?;

        let values: Vec<Option<NaiveDate>> = match series.dtype() {
            DataType::String => series
                .str()?
                .into_iter()
                .map(|v| v.and_then(parse_date_text))
                .collect(),
            DataType::Date | DataType::Datetime(_, _) => {
                let days = series.cast(&DataType::Date)?.cast(&DataType::Int32)?;
                let values: Vec<Option<NaiveDate>> = days
                    .i32()?
                    .into_iter()
                    .map(|v| v.and_then(epoch_days_to_date))
                    .collect();
                values
            }
            _ => vec![None; series.len()],
        };
        Ok(values)
    }

    /// Drop rows whose value in `column` is null or only whitespace.
    pub fn drop_blank(df: &DataFrame, column: &str) -> Result<DataFrame, ProcessorError> {
        let mask: BooleanChunked = Self::text_values(df, column)?
            .iter()
            .map(|v| v.as_deref().is_some_and(|s| !s.trim().is_empty()))
            .collect();
        Ok(df.filter(&mask)?)
    }

    /// Keep rows whose value in `column` is one of `allowed`.
    pub fn retain_values(
        df: &DataFrame,
        column: &str,
        allowed: &[String],
    ) -> Result<DataFrame, ProcessorError> {
        let allowed: HashSet<&str> = allowed.iter().map(String::as_str).collect();
        let mask: BooleanChunked = Self::text_values(df, column)?
            .iter()
            .map(|v| v.as_deref().is_some_and(|s| allowed.contains(s)))
            .collect();
        Ok(df.filter(&mask)?)
    }

    /// Keep rows where `column` is not null.
    pub fn drop_nulls(df: &DataFrame, column: &str) -> Result<DataFrame, ProcessorError> {
        let mask = Self::series(df, column)?.is_not_null();
        Ok(df.filter(&mask)?)
    }
}
