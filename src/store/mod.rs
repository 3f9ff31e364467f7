//! Store module - relational destination for loaded tables
//!
//! Every load fully replaces its destination table; reports read whole
//! tables back. [`PgStore`] talks to PostgreSQL, [`MemoryStore`] keeps
//! frames in process (dry runs and tests).

mod pg;

pub use pg::{sql_type_for, PgStore};

use polars::prelude::*;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Postgres(#[from] postgres::Error),
    #[error("Polars error: {0}")]
    PolarsError(#[from] PolarsError),
    #[error("Table not found: {0}")]
    TableNotFound(String),
}

/// Destination for loaded tables.
pub trait RecordStore {
    /// Drop `table` (data and schema) and write `df` in its place.
    /// Returns the number of rows written.
    fn replace_table(&mut self, table: &str, df: &DataFrame) -> Result<u64, StoreError>;

    /// Read the whole of `table`.
    fn fetch_table(&mut self, table: &str) -> Result<DataFrame, StoreError>;
}

/// In-process store keyed by table name.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: HashMap<String, DataFrame>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.keys().cloned().collect();
        names.sort();
        names
    }
}

impl RecordStore for MemoryStore {
    fn replace_table(&mut self, table: &str, df: &DataFrame) -> Result<u64, StoreError> {
        self.tables.insert(table.to_string(), df.clone());
        Ok(df.height() as u64)
    }

    fn fetch_table(&mut self, table: &str) -> Result<DataFrame, StoreError> {
        self.tables
            .get(table)
            .cloned()
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))
    }
}

/// Double-quote an SQL identifier.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
