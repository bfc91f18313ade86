// Proctor Infrastructure - System Adapters
// Implements: ProcessAccounting (procfs), run orchestration, integrity verification

pub mod integrity_verifier;
pub mod orchestrator;
pub mod procfs_accounting;

pub use integrity_verifier::IntegrityVerifier;
pub use orchestrator::{Orchestrator, RunHandle};
pub use procfs_accounting::ProcfsAccounting;
