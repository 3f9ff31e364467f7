//! Stats module - frequency counts and derived columns

mod calculator;

pub use calculator::{FrequencyTable, StatsCalculator, AGE_BUCKET_LABELS};
