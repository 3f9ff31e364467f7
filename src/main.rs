//! Census Charts CLI
//!
//! ```bash
//! census-charts load                      # load the default batch from data/
//! census-charts load base2=data/base2.csv # load explicit TABLE=PATH sources
//! census-charts origins                   # ministry of origin chart (log scale)
//! census-charts states                    # state chart for selected ministries
//! census-charts ages --ministry "..."     # age histogram + income total
//! census-charts case                      # case contact counts + JSON summary
//! ```

use anyhow::{Context, Result};
use census_charts::config::{Config, DbConfig, SourceFile};
use census_charts::data::DataLoader;
use census_charts::ingest::load_sources;
use census_charts::report::{self, ReportContext};
use census_charts::store::{MemoryStore, PgStore, RecordStore};
use clap::{Parser, Subcommand};
use polars::prelude::DataFrame;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "census-charts")]
#[command(about = "Load spreadsheets into PostgreSQL and chart them", long_about = None)]
struct Cli {
    /// Directory holding the default source files
    #[arg(long, env = "DATA_DIR", default_value = "data", global = true)]
    data_dir: PathBuf,

    /// Directory charts and summaries are written to
    #[arg(long, env = "PLOTS_DIR", default_value = "plots", global = true)]
    plots_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load source files, replacing one table per file
    Load {
        /// Sources as TABLE=PATH (default: the standard batch under --data-dir)
        sources: Vec<String>,

        /// Load into memory only; nothing is written to the database
        #[arg(long)]
        dry_run: bool,
    },

    /// Chart the ministry of origin distribution
    Origins,

    /// Chart the state distribution for the selected ministries
    States,

    /// Chart age distribution and total income per ministry
    Ages {
        /// Ministry to profile (repeatable; default: the standard four)
        #[arg(short, long = "ministry")]
        ministries: Vec<String>,
    },

    /// Count case contacts by channel, segment and reason
    Case,
}

fn init_logging() {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder().with_env_filter(env).init();
}

fn pg_store() -> Result<PgStore> {
    let db = DbConfig::from_env().context("database configuration")?;
    info!(url = %db.redacted_url(), "using database");
    Ok(PgStore::new(db))
}

fn fetch(table: &str) -> Result<DataFrame> {
    pg_store()?
        .fetch_table(table)
        .with_context(|| format!("failed to read table {}", table))
}

fn run_load(config: &Config, sources: &[String], dry_run: bool) -> Result<()> {
    let sources = if sources.is_empty() {
        config.default_sources()
    } else {
        sources
            .iter()
            .map(|arg| SourceFile::parse(arg))
            .collect::<Result<Vec<_>, _>>()?
    };
    let loader = DataLoader::new(config.columns.clone());

    let summary = if dry_run {
        let mut store = MemoryStore::new();
        let summary = load_sources(&loader, &sources, &mut store)?;
        info!(tables = ?store.table_names(), "dry run, nothing written");
        summary
    } else {
        let mut store = pg_store()?;
        load_sources(&loader, &sources, &mut store)?
    };

    for (table, rows) in &summary.loaded {
        info!(table = %table, rows, "loaded");
    }
    if !summary.is_complete() {
        warn!(failed = summary.failed.len(), "some files were not published");
    }
    Ok(())
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_logging();

    let cli = Cli::parse();
    let config = Config::with_dirs(&cli.data_dir, &cli.plots_dir);
    let ctx = ReportContext::new(&config.plots_dir);

    match cli.command {
        Commands::Load { sources, dry_run } => run_load(&config, &sources, dry_run)?,
        Commands::Origins => {
            let df = fetch(&config.records_table)?;
            report::origin_distribution(&df, &config.columns, &ctx)?;
        }
        Commands::States => {
            let df = fetch(&config.records_table)?;
            report::state_distribution(&df, &config.columns, &config.state_ministries, &ctx)?;
        }
        Commands::Ages { ministries } => {
            let ministries = if ministries.is_empty() {
                config.age_ministries.clone()
            } else {
                ministries
            };
            let df = fetch(&config.records_table)?;
            for ministry in &ministries {
                report::age_distribution(&df, &config.columns, ministry, &ctx)
                    .with_context(|| format!("age report for {}", ministry))?;
            }
        }
        Commands::Case => {
            let df = fetch(&config.case_table)?;
            report::case_summary(&df, &config.columns, &ctx)?;
        }
    }

    info!("all done");
    Ok(())
}
