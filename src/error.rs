//! Error types for fuzzylink

use thiserror::Error;

/// Main error type for the linkage engine
#[derive(Error, Debug)]
pub enum LinkError {
    /// Configuration error (missing section, malformed weight, bad link)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Input table error (unreadable file, missing required column)
    #[error("Input error: {0}")]
    Input(String),

    /// GroupBlock invariants violated at construction
    #[error("Invalid group: {0}")]
    InvalidGroup(String),

    /// A tokenize or compare call violated its contract
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Engine save/load failure or version mismatch
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// CSV read/write error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Other errors
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, LinkError>;
