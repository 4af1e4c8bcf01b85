//! Records of training and evaluation metrics.
//!
//! * [`Record`] - key-value container produced by agents, trainers and evaluators
//! * [`RecordValue`] - the values a record can hold
//! * [`Recorder`] - destination of records
//! * [`RecordStorage`] - aggregation of stored records
//! * [`BufferedRecorder`], [`LogRecorder`] - recorders
//!
//! ```rust
//! use rlfolio_core::record::{Record, RecordValue};
//!
//! let mut record = Record::empty();
//! record.insert("episode", RecordValue::Scalar(1.0));
//! record.insert("loss_critic", RecordValue::Scalar(0.25));
//! ```
mod base;
mod buffered_recorder;
mod log_recorder;
mod recorder;
mod storage;

pub use base::{Record, RecordValue};
pub use buffered_recorder::BufferedRecorder;
pub use log_recorder::LogRecorder;
pub use recorder::Recorder;
pub use storage::RecordStorage;
