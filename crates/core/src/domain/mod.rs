// Domain Layer - Pure business logic and entities

pub mod accounting;
pub mod error;
pub mod integrity;
pub mod run;
pub mod transcript;

// Re-exports
pub use accounting::{CpuSnapshot, ResourceSample, SampleError};
pub use error::DomainError;
pub use integrity::{FileStatus, IntegrityError, IntegrityReport};
pub use run::{
    ProcessFailure, ProducerError, RunConfig, RunError, RunId, RunReport, TerminalStatus,
};
pub use transcript::{FlushReport, LogEntry, SinkError, TranscriptDocument};
