//! Error types shared across Nebula crates.

use std::path::PathBuf;

/// Top-level error type for Nebula render operations.
#[derive(Debug, thiserror::Error)]
pub enum NebulaError {
    #[error("Effect processor failed to initialize: {message}")]
    Initialization { message: String },

    #[error("Media source {index} unavailable: {message}")]
    SourceUnavailable { index: usize, message: String },

    #[error("Seek on source {index} to {target_secs:.3}s timed out after {timeout_ms}ms")]
    SeekTimeout {
        index: usize,
        target_secs: f64,
        timeout_ms: u64,
    },

    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    #[error("Buffer arena exhausted: requested {requested} bytes")]
    ResourceExhausted { requested: usize },

    #[error("Invalid buffer handle: {message}")]
    InvalidHandle { message: String },

    #[error("Encoder failure: {message}")]
    Encoder { message: String },

    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    #[error("Effect processor error: {message}")]
    Processor { message: String },

    #[error("Render plan error: {message}")]
    Plan { message: String },

    #[error("Render cancelled")]
    Cancelled,

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using NebulaError.
pub type NebulaResult<T> = Result<T, NebulaError>;

impl NebulaError {
    pub fn initialization(msg: impl Into<String>) -> Self {
        Self::Initialization {
            message: msg.into(),
        }
    }

    pub fn source_unavailable(index: usize, msg: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            index,
            message: msg.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported {
            message: msg.into(),
        }
    }

    pub fn invalid_handle(msg: impl Into<String>) -> Self {
        Self::InvalidHandle {
            message: msg.into(),
        }
    }

    pub fn encoder(msg: impl Into<String>) -> Self {
        Self::Encoder {
            message: msg.into(),
        }
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState {
            message: msg.into(),
        }
    }

    pub fn processor(msg: impl Into<String>) -> Self {
        Self::Processor {
            message: msg.into(),
        }
    }

    pub fn plan(msg: impl Into<String>) -> Self {
        Self::Plan {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Whether this error aborts a render in progress.
    ///
    /// Seek timeouts and unsupported operations are absorbed per frame;
    /// everything else ends the render.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::SeekTimeout { .. } | Self::Unsupported { .. })
    }
}
