//! Error types for the braembl core
//!
//! Only the control thread ever sees these. The audio render path never
//! returns a `Result`; every failure there degrades deterministically.

use thiserror::Error;

/// Core error type
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Patch parse error at {field}: {message}")]
    PatchParse { field: String, message: String },

    #[error("Patch version {0} is not supported")]
    PatchVersion(u32),

    #[error("Unknown engine kind: {0}")]
    UnknownEngine(String),

    #[error("Unknown clouds mode index: {0}")]
    UnknownMode(u32),

    #[error("Invalid sample rate: {0}")]
    InvalidSampleRate(u32),

    #[error("Sample data missing for voice {0}")]
    MissingSampleData(usize),

    #[error("Message decode error: {0}")]
    MessageDecode(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias
pub type EngineResult<T> = Result<T, EngineError>;
