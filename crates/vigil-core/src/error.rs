use thiserror::Error;

/// Error kinds shared across the Vigil pipeline
#[derive(Error, Debug)]
pub enum VigilError {
    /// Bad reading or bad configuration; surfaces synchronously, no side effects
    #[error("Validation error: {0}")]
    Validation(String),

    /// Persistence or mail collaborator failure
    #[error("Unavailable: {0}")]
    Unavailable(String),

    /// Ingest or dispatch deadline exceeded
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Unrecoverable state corruption; terminates the process
    #[error("Fatal: {0}")]
    Fatal(String),
}

/// Result type for core operations
pub type Result<T> = std::result::Result<T, VigilError>;
