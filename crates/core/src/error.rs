// Central Error Type for the Application

use thiserror::Error;

/// Application-level error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Domain error: {0}")]
    Domain(#[from] crate::domain::DomainError),

    #[error("Run error: {0}")]
    Run(#[from] crate::domain::RunError),

    #[error("Sampling error: {0}")]
    Sample(#[from] crate::domain::SampleError),

    #[error("Sink error: {0}")]
    Sink(#[from] crate::domain::SinkError),

    #[error("Object store error: {0}")]
    Store(#[from] crate::port::StoreError),

    #[error("Integrity check error: {0}")]
    Integrity(#[from] crate::domain::IntegrityError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// Errors that must stop the process before any supervised work begins
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AppError::Run(crate::domain::RunError::Startup { .. })
                | AppError::Config(_)
                | AppError::Domain(_)
        )
    }
}
