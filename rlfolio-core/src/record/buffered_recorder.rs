use super::{Record, RecordStorage, Recorder};

/// Keeps every record in memory.
///
/// Written records are kept as they are, stored records are aggregated on
/// [`Recorder::flush`] and the aggregate is kept together with the step.
/// Mostly used to inspect training loops in tests.
#[derive(Default)]
pub struct BufferedRecorder {
    buf: Vec<Record>,
    storage: RecordStorage,
    flushed: Vec<(i64, Record)>,
}

impl BufferedRecorder {
    /// Constructs the recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns an iterator over the written records.
    pub fn iter(&self) -> std::slice::Iter<Record> {
        self.buf.iter()
    }

    /// Aggregated records with the step at which they were flushed.
    pub fn flushed(&self) -> &[(i64, Record)] {
        &self.flushed
    }
}

impl Recorder for BufferedRecorder {
    fn write(&mut self, record: Record) {
        self.buf.push(record);
    }

    fn store(&mut self, record: Record) {
        self.storage.store(record);
    }

    fn flush(&mut self, step: i64) {
        if !self.storage.is_empty() {
            let record = self.storage.aggregate();
            self.flushed.push((step, record));
        }
    }
}
