use super::Record;

/// Destination of the [`Record`]s produced during training and evaluation.
///
/// [`Recorder::write`] outputs a record immediately, while
/// [`Recorder::store`] keeps it until the next [`Recorder::flush`], which
/// writes values aggregated over the stored records.
pub trait Recorder {
    /// Writes a record.
    fn write(&mut self, record: Record);

    /// Stores a record for later aggregation.
    fn store(&mut self, record: Record);

    /// Writes values aggregated from the stored records and clears them.
    ///
    /// `step` is the episode (PPO) or iteration (benchmark) index.
    fn flush(&mut self, step: i64);
}
