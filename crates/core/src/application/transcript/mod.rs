// Transcript - shared log aggregation and persistence

pub mod aggregator;
pub mod flusher;
pub mod sink;

pub use aggregator::{Appended, LogAggregator};
pub use flusher::{spawn_flusher, FlushRequests};
pub use sink::LogSink;
