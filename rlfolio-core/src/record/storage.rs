//! Aggregation of stored records.
use super::{Record, RecordValue};
use std::collections::BTreeSet;

/// Stores records and aggregates them.
///
/// Scalars are reduced to their mean, while the most recent value is taken
/// for arrays and strings.
#[derive(Default)]
pub struct RecordStorage {
    data: Vec<Record>,
}

fn mean(vs: &[f32]) -> f32 {
    vs.iter().sum::<f32>() / vs.len() as f32
}

impl RecordStorage {
    /// Constructs an empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a record.
    pub fn store(&mut self, record: Record) {
        self.data.push(record);
    }

    /// Returns `true` if nothing has been stored since the last aggregation.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn keys(&self) -> BTreeSet<String> {
        self.data
            .iter()
            .flat_map(|record| record.keys().cloned())
            .collect()
    }

    fn latest(&self, key: &str) -> Option<RecordValue> {
        self.data
            .iter()
            .rev()
            .find_map(|record| record.get(key).cloned())
    }

    /// Aggregates the stored records and clears the storage.
    pub fn aggregate(&mut self) -> Record {
        let mut record = Record::empty();

        for key in self.keys() {
            match self.latest(&key) {
                Some(RecordValue::Scalar(_)) => {
                    let vs: Vec<f32> = self
                        .data
                        .iter()
                        .filter_map(|r| match r.get(&key) {
                            Some(RecordValue::Scalar(v)) => Some(*v),
                            _ => None,
                        })
                        .collect();
                    record.insert(key, RecordValue::Scalar(mean(&vs)));
                }
                Some(value) => record.insert(key, value),
                None => {}
            }
        }

        self.data.clear();
        record
    }
}
