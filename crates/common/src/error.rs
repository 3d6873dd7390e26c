//! Error types shared across PanoStitch crates.

use std::path::PathBuf;

/// Top-level error type for PanoStitch operations.
///
/// A source running dry is not represented here: the pipeline reports it
/// as a normal stop reason.
#[derive(Debug, thiserror::Error)]
pub enum PanoError {
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Shape mismatch: {message}")]
    ShapeMismatch { message: String },

    #[error("Sink write failed: {message}")]
    SinkWrite { message: String },

    #[error("Decode error: {message}")]
    Decode { message: String },

    #[error("Process error: {message}")]
    Process { message: String },

    #[error("Probe error: {message}")]
    Probe { message: String },

    #[error("Matching error: {message}")]
    Matching { message: String },

    #[error("Run cancelled")]
    Cancelled,

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using PanoError.
pub type PanoResult<T> = Result<T, PanoError>;

impl PanoError {
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: msg.into(),
        }
    }

    pub fn shape_mismatch(msg: impl Into<String>) -> Self {
        Self::ShapeMismatch {
            message: msg.into(),
        }
    }

    pub fn sink_write(msg: impl Into<String>) -> Self {
        Self::SinkWrite {
            message: msg.into(),
        }
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode {
            message: msg.into(),
        }
    }

    pub fn process(msg: impl Into<String>) -> Self {
        Self::Process {
            message: msg.into(),
        }
    }

    pub fn probe(msg: impl Into<String>) -> Self {
        Self::Probe {
            message: msg.into(),
        }
    }

    pub fn matching(msg: impl Into<String>) -> Self {
        Self::Matching {
            message: msg.into(),
        }
    }
}
