//! Statistics Calculator Module
//! Frequency counts, age buckets and income totals.

use chrono::NaiveDate;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::HashMap;

/// Age bucket labels, in display order.
pub const AGE_BUCKET_LABELS: [&str; 8] = [
    "0-18", "19-30", "31-40", "41-50", "51-60", "61-70", "71-80", "81+",
];

/// Upper bound (inclusive) of each bucket. The first bucket also includes 0.
const AGE_BUCKET_UPPER: [i64; 8] = [18, 30, 40, 50, 60, 70, 80, 100];

/// Category counts, ordered by descending count (ties keep first appearance).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrequencyTable {
    entries: Vec<(String, u64)>,
}

impl FrequencyTable {
    /// Count non-null values.
    pub fn from_values<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = Option<S>>,
        S: AsRef<str>,
    {
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut entries: Vec<(String, u64)> = Vec::new();

        for value in values.into_iter().flatten() {
            let value = value.as_ref();
            match index.get(value) {
                Some(&pos) => entries[pos].1 += 1,
                None => {
                    index.insert(value.to_string(), entries.len());
                    entries.push((value.to_string(), 1));
                }
            }
        }

        // stable sort keeps first-seen order among equal counts
        entries.sort_by(|a, b| b.1.cmp(&a.1));
        Self { entries }
    }

    /// Build from entries already in display order.
    pub fn from_ordered(entries: Vec<(String, u64)>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[(String, u64)] {
        &self.entries
    }

    pub fn labels(&self) -> Vec<String> {
        self.entries.iter().map(|(label, _)| label.clone()).collect()
    }

    pub fn counts(&self) -> Vec<u64> {
        self.entries.iter().map(|(_, count)| *count).collect()
    }

    pub fn get(&self, label: &str) -> Option<u64> {
        self.entries
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, count)| *count)
    }

    pub fn total(&self) -> u64 {
        self.entries.iter().map(|(_, count)| count).sum()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Serialized as a JSON object, keys in table order.
impl Serialize for FrequencyTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (label, count) in &self.entries {
            map.serialize_entry(label, count)?;
        }
        map.end()
    }
}

/// Handles the derived-column calculations.
pub struct StatsCalculator;

impl StatsCalculator {
    /// Whole years between `birth` and `today`, counted as 365-day years.
    pub fn age_in_years(birth: NaiveDate, today: NaiveDate) -> i64 {
        (today - birth).num_days().div_euclid(365)
    }

    /// Index into [`AGE_BUCKET_LABELS`]; ages outside 0..=100 have no bucket.
    pub fn age_bucket(age: i64) -> Option<usize> {
        if age < 0 {
            return None;
        }
        AGE_BUCKET_UPPER.iter().position(|&upper| age <= upper)
    }

    pub fn age_bucket_label(age: i64) -> Option<&'static str> {
        Self::age_bucket(age).map(|idx| AGE_BUCKET_LABELS[idx])
    }

    /// Histogram over all eight buckets, zero counts included.
    pub fn age_histogram<I>(ages: I) -> FrequencyTable
    where
        I: IntoIterator<Item = Option<i64>>,
    {
        let mut counts = [0u64; 8];
        for idx in ages.into_iter().flatten().filter_map(Self::age_bucket) {
            counts[idx] += 1;
        }

        FrequencyTable::from_ordered(
            AGE_BUCKET_LABELS
                .iter()
                .zip(counts)
                .map(|(label, count)| (label.to_string(), count))
                .collect(),
        )
    }

    /// Sum of the present values; `0.0` when none are present.
    pub fn income_total<I>(values: I) -> f64
    where
        I: IntoIterator<Item = Option<f64>>,
    {
        values
            .into_iter()
            .flatten()
            .filter(|v| !v.is_nan())
            .sum()
    }
}
