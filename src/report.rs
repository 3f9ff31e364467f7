//! Report variants.
//!
//! Each report takes the dataset it describes as a parameter, computes its
//! counts and writes its chart (and side files) under the plots directory,
//! which is created on demand.

use crate::charts::{BarChart, ChartError, StaticChartRenderer, LIGHT_GREEN, SALMON, SKY_BLUE};
use crate::config::ColumnNames;
use crate::data::{DataProcessor, ProcessorError};
use crate::stats::{FrequencyTable, StatsCalculator};
use chrono::{Local, NaiveDate};
use polars::prelude::DataFrame;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

pub const ORIGIN_CHART: &str = "origin_distribution_log.png";
pub const STATE_CHART: &str = "state_distribution.png";
pub const INCOME_FILE: &str = "income.txt";
pub const CASE_CHART: &str = "case_contacts.png";
pub const CASE_SUMMARY: &str = "case_summary.json";

#[derive(Error, Debug)]
pub enum ReportError {
    #[error(transparent)]
    Processor(#[from] ProcessorError),
    #[error(transparent)]
    Chart(#[from] ChartError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Where reports write and the date ages are measured against.
#[derive(Debug, Clone)]
pub struct ReportContext {
    pub plots_dir: PathBuf,
    pub today: NaiveDate,
}

impl ReportContext {
    pub fn new(plots_dir: impl Into<PathBuf>) -> Self {
        Self {
            plots_dir: plots_dir.into(),
            today: Local::now().date_naive(),
        }
    }

    /// Path of an output file, creating the plots directory if needed.
    fn output(&self, file: &str) -> Result<PathBuf, ReportError> {
        fs::create_dir_all(&self.plots_dir)?;
        Ok(self.plots_dir.join(file))
    }
}

// ---------------------------------------------------------------------------
// Origin distribution
// ---------------------------------------------------------------------------

/// Count rows per ministry of origin, ignoring blank values.
pub fn origin_counts(df: &DataFrame, columns: &ColumnNames) -> Result<FrequencyTable, ReportError> {
    let present = DataProcessor::drop_blank(df, &columns.ministry)?;
    let values = DataProcessor::text_values(&present, &columns.ministry)?;
    Ok(FrequencyTable::from_values(values))
}

pub fn origin_distribution(
    df: &DataFrame,
    columns: &ColumnNames,
    ctx: &ReportContext,
) -> Result<FrequencyTable, ReportError> {
    let counts = origin_counts(df, columns)?;

    let chart = BarChart::from_table(
        "Ministry of origin of pensions (log scale)",
        "Origin",
        "Frequency (log scale)",
        &counts,
        SKY_BLUE,
    )
    .log_scale()
    .rotate_labels();
    let path = ctx.output(ORIGIN_CHART)?;
    StaticChartRenderer::render_bar_chart(&path, &chart, (1400, 800))?;

    info!(categories = counts.len(), rows = counts.total(), path = %path.display(), "origin distribution written");
    Ok(counts)
}

// ---------------------------------------------------------------------------
// State distribution
// ---------------------------------------------------------------------------

/// Count rows per state for the given ministries, ignoring blank states.
pub fn state_counts(
    df: &DataFrame,
    columns: &ColumnNames,
    ministries: &[String],
) -> Result<FrequencyTable, ReportError> {
    let selected = DataProcessor::retain_values(df, &columns.ministry, ministries)?;
    let present = DataProcessor::drop_blank(&selected, &columns.state)?;
    let values = DataProcessor::text_values(&present, &columns.state)?;
    Ok(FrequencyTable::from_values(values))
}

pub fn state_distribution(
    df: &DataFrame,
    columns: &ColumnNames,
    ministries: &[String],
    ctx: &ReportContext,
) -> Result<FrequencyTable, ReportError> {
    let counts = state_counts(df, columns, ministries)?;

    let chart = BarChart::from_table(
        "State of origin (UF) for selected ministries",
        "State (UF)",
        "Frequency",
        &counts,
        SKY_BLUE,
    );
    let path = ctx.output(STATE_CHART)?;
    StaticChartRenderer::render_bar_chart(&path, &chart, (1200, 600))?;

    info!(states = counts.len(), rows = counts.total(), path = %path.display(), "state distribution written");
    Ok(counts)
}

// ---------------------------------------------------------------------------
// Age profile
// ---------------------------------------------------------------------------

/// Age histogram and income total for one ministry.
#[derive(Debug, Clone)]
pub struct AgeProfile {
    pub ministry: String,
    pub rows: usize,
    pub histogram: FrequencyTable,
    pub income_total: f64,
}

impl AgeProfile {
    /// Line appended to the income file.
    pub fn income_line(&self) -> String {
        format!("{}: {:.2}", self.ministry, self.income_total)
    }

    fn chart_file(&self) -> String {
        let name: String = self
            .ministry
            .chars()
            .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
            .collect();
        format!("age_distribution_{}.png", name)
    }
}

/// Rows of `ministry` with a birthdate, bucketed by age at `today`.
pub fn age_profile(
    df: &DataFrame,
    columns: &ColumnNames,
    ministry: &str,
    today: NaiveDate,
) -> Result<AgeProfile, ReportError> {
    let selected = DataProcessor::retain_values(df, &columns.ministry, &[ministry.to_string()])?;
    let selected = DataProcessor::drop_nulls(&selected, &columns.birthdate)?;

    let ages = DataProcessor::date_values(&selected, &columns.birthdate)?
        .into_iter()
        .map(|birth| birth.map(|b| StatsCalculator::age_in_years(b, today)));
    let histogram = StatsCalculator::age_histogram(ages);
    let income_total = StatsCalculator::income_total(DataProcessor::float_values(&selected, &columns.income)?);

    Ok(AgeProfile {
        ministry: ministry.to_string(),
        rows: selected.height(),
        histogram,
        income_total,
    })
}

/// Append the profile's income line to `path`.
pub fn append_income(path: &Path, profile: &AgeProfile) -> Result<(), ReportError> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{}", profile.income_line())?;
    Ok(())
}

pub fn age_distribution(
    df: &DataFrame,
    columns: &ColumnNames,
    ministry: &str,
    ctx: &ReportContext,
) -> Result<AgeProfile, ReportError> {
    let profile = age_profile(df, columns, ministry, ctx.today)?;

    append_income(&ctx.output(INCOME_FILE)?, &profile)?;

    let chart = BarChart::from_table(
        format!("Age distribution for {}", ministry),
        "Age range",
        "Frequency",
        &profile.histogram,
        LIGHT_GREEN,
    );
    let path = ctx.output(&profile.chart_file())?;
    StaticChartRenderer::render_bar_chart(&path, &chart, (1000, 600))?;

    info!(
        ministry,
        rows = profile.rows,
        income = profile.income_total,
        path = %path.display(),
        "age distribution written"
    );
    Ok(profile)
}

// ---------------------------------------------------------------------------
// Case summary
// ---------------------------------------------------------------------------

/// Contact counts by channel, customer segment and contact reason.
#[derive(Debug, Clone, Serialize)]
pub struct CaseSummary {
    #[serde(rename = "canal")]
    pub channel: FrequencyTable,
    #[serde(rename = "segmento")]
    pub segment: FrequencyTable,
    #[serde(rename = "motivo")]
    pub reason: FrequencyTable,
}

pub fn case_counts(df: &DataFrame, columns: &ColumnNames) -> Result<CaseSummary, ReportError> {
    let count = |column: &str| -> Result<FrequencyTable, ReportError> {
        Ok(FrequencyTable::from_values(DataProcessor::text_values(df, column)?))
    };

    Ok(CaseSummary {
        channel: count(&columns.channel)?,
        segment: count(&columns.segment)?,
        reason: count(&columns.reason)?,
    })
}

pub fn case_summary(
    df: &DataFrame,
    columns: &ColumnNames,
    ctx: &ReportContext,
) -> Result<CaseSummary, ReportError> {
    let summary = case_counts(df, columns)?;

    let charts = [
        BarChart::from_table("Contacts by channel", "Channel", "Contacts", &summary.channel, SKY_BLUE),
        BarChart::from_table(
            "Contacts by customer segment",
            "Customer segment",
            "Contacts",
            &summary.segment,
            LIGHT_GREEN,
        ),
        BarChart::from_table("Contacts by reason", "Contact reason", "Contacts", &summary.reason, SALMON),
    ];
    let chart_path = ctx.output(CASE_CHART)?;
    StaticChartRenderer::render_panels(&chart_path, &charts, (1000, 1500))?;

    let summary_path = ctx.output(CASE_SUMMARY)?;
    fs::write(&summary_path, serde_json::to_string_pretty(&summary)?)?;

    info!(
        rows = df.height(),
        chart = %chart_path.display(),
        summary = %summary_path.display(),
        "case summary written"
    );
    Ok(summary)
}
