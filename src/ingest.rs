//! Batch loading of source files into the store.

use crate::config::SourceFile;
use crate::data::{DataLoader, LoaderError};
use crate::store::RecordStore;
use std::path::PathBuf;
use tracing::{error, info};

/// Outcome of one batch.
#[derive(Debug, Default)]
pub struct LoadSummary {
    /// `(table, rows written)` for every published file.
    pub loaded: Vec<(String, u64)>,
    /// `(path, error)` for every file whose publish step failed.
    pub failed: Vec<(PathBuf, String)>,
}

impl LoadSummary {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Load every source in order and replace its table.
///
/// Reading a file is fatal for the batch (an unsupported extension aborts
/// it). A failed publish is logged and the remaining files still load.
pub fn load_sources<S: RecordStore + ?Sized>(
    loader: &DataLoader,
    sources: &[SourceFile],
    store: &mut S,
) -> Result<LoadSummary, LoaderError> {
    let mut summary = LoadSummary::default();

    for source in sources {
        let df = loader.load(&source.path)?;

        match store.replace_table(&source.table, &df) {
            Ok(rows) => {
                info!(table = %source.table, rows, "published");
                summary.loaded.push((source.table.clone(), rows));
            }
            Err(err) => {
                error!(
                    path = %source.path.display(),
                    table = %source.table,
                    error = %err,
                    "could not publish file"
                );
                summary.failed.push((source.path.clone(), err.to_string()));
            }
        }
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, StoreError};
    use polars::prelude::*;
    use std::fs;
    use std::path::Path;

    /// Rejects writes to one table, otherwise behaves like a memory store.
    struct FlakyStore {
        broken: String,
        inner: MemoryStore,
    }

    impl RecordStore for FlakyStore {
        fn replace_table(&mut self, table: &str, df: &DataFrame) -> Result<u64, StoreError> {
            if table == self.broken {
                return Err(StoreError::TableNotFound(table.to_string()));
            }
            self.inner.replace_table(table, df)
        }

        fn fetch_table(&mut self, table: &str) -> Result<DataFrame, StoreError> {
            self.inner.fetch_table(table)
        }
    }

    fn write_csv(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn failed_publish_does_not_stop_the_batch() {
        let dir = tempfile::tempdir().unwrap();
        let sources = vec![
            SourceFile::new("base1", write_csv(dir.path(), "a.csv", "uf\nSP\nRJ\n")),
            SourceFile::new("base2", write_csv(dir.path(), "b.csv", "uf\nMG\n")),
            SourceFile::new("base3", write_csv(dir.path(), "c.csv", "uf\nBA\nPE\nCE\n")),
        ];
        let mut store = FlakyStore {
            broken: "base2".to_string(),
            inner: MemoryStore::new(),
        };

        let summary = load_sources(&DataLoader::default(), &sources, &mut store).unwrap();

        assert!(!summary.is_complete());
        assert_eq!(summary.loaded, vec![("base1".to_string(), 2), ("base3".to_string(), 3)]);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].0, sources[1].path);
        assert_eq!(store.inner.fetch_table("base3").unwrap().height(), 3);
    }

    #[test]
    fn unsupported_file_aborts_the_batch() {
        let dir = tempfile::tempdir().unwrap();
        let sources = vec![
            SourceFile::new("notes", write_csv(dir.path(), "notes.txt", "uf\nSP\n")),
            SourceFile::new("base2", write_csv(dir.path(), "b.csv", "uf\nMG\n")),
        ];
        let mut store = MemoryStore::new();

        let err = load_sources(&DataLoader::default(), &sources, &mut store).unwrap_err();
        assert!(matches!(err, LoaderError::UnsupportedFormat(_)));
        assert!(store.table_names().is_empty());
    }

    #[test]
    fn reloading_replaces_previous_contents() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = MemoryStore::new();
        let loader = DataLoader::default();

        let first = [SourceFile::new("base2", write_csv(dir.path(), "v1.csv", "uf\nSP\nRJ\n"))];
        load_sources(&loader, &first, &mut store).unwrap();
        let second = [SourceFile::new("base2", write_csv(dir.path(), "v2.csv", "uf\nMG\n"))];
        let summary = load_sources(&loader, &second, &mut store).unwrap();

        assert!(summary.is_complete());
        assert_eq!(store.fetch_table("base2").unwrap().height(), 1);
    }
}
