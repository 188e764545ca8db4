//! Error types for parley-core

use thiserror::Error;

/// Main error type for the parley-core library
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Threshold outside the accepted range
    #[error("invalid threshold {name}={value}: {reason}")]
    InvalidThreshold {
        name: &'static str,
        value: f64,
        reason: String,
    },

    /// Classifier weights that cannot produce a bounded score
    #[error("invalid classifier weights: {0}")]
    InvalidWeights(String),

    /// Pattern rule whose regex failed to compile
    #[error("invalid rule {name}: {message}")]
    InvalidRule { name: String, message: String },

    /// Experiment definition rejected at creation time
    #[error("invalid experiment: {0}")]
    InvalidExperiment(String),

    /// Experiment not registered
    #[error("experiment not found: {0}")]
    ExperimentNotFound(String),

    /// Experiment no longer accepts outcomes
    #[error("experiment already completed: {0}")]
    ExperimentCompleted(String),

    /// Experiment id already registered
    #[error("experiment already exists: {0}")]
    ExperimentExists(String),

    /// Experiment archive failure
    #[error("archive error: {0}")]
    Archive(String),
}

/// Result type alias for parley-core
pub type Result<T> = std::result::Result<T, Error>;
