//! Census Charts - spreadsheet/CSV loading and descriptive chart reports
//!
//! Source files (xlsx, xlsb, csv) are normalized into Polars DataFrames and
//! bulk-replace their tables in PostgreSQL. Reports read a table back and
//! render frequency counts and age histograms as PNG bar charts.

pub mod charts;
pub mod config;
pub mod data;
pub mod ingest;
pub mod report;
pub mod stats;
pub mod store;
