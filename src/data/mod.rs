//! Data module - file loading and processing

mod loader;
mod processor;

pub use loader::{normalize, range_to_frame, serial_to_date, DataLoader, LoaderError, SourceFormat};
pub use processor::{date_to_epoch_days, epoch_days_to_date, DataProcessor, ProcessorError};
