// Port Layer - Interfaces for external dependencies

pub mod id_provider; // For deterministic testing
pub mod object_store;
pub mod process_accounting;
pub mod time_provider;

// Re-exports
pub use id_provider::IdProvider;
pub use object_store::{ObjectStore, StoreError};
pub use process_accounting::{ProcessAccounting, SampleError};
pub use time_provider::TimeProvider;
