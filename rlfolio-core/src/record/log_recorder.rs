use super::{Record, RecordStorage, RecordValue, Recorder};
use log::info;

/// Writes records through the [`log`] facade.
///
/// Scalars are printed sorted by key, one line per flush, so that a training
/// run can be followed with `RUST_LOG=info`.
#[derive(Default)]
pub struct LogRecorder {
    prefix: String,
    storage: RecordStorage,
}

impl LogRecorder {
    /// Constructs the recorder, `prefix` tags every line (e.g. the seed).
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            storage: RecordStorage::default(),
        }
    }

    fn format(record: &Record) -> String {
        let mut items: Vec<_> = record
            .iter()
            .filter_map(|(k, v)| match v {
                RecordValue::Scalar(v) => Some(format!("{}={:.6}", k, v)),
                RecordValue::String(s) => Some(format!("{}={}", k, s)),
                RecordValue::Array1(_) => None,
            })
            .collect();
        items.sort();
        items.join(", ")
    }
}

impl Recorder for LogRecorder {
    fn write(&mut self, record: Record) {
        info!("{} {}", self.prefix, Self::format(&record));
    }

    fn store(&mut self, record: Record) {
        self.storage.store(record);
    }

    fn flush(&mut self, step: i64) {
        if !self.storage.is_empty() {
            let record = self.storage.aggregate();
            info!("{} step={}, {}", self.prefix, step, Self::format(&record));
        }
    }
}
