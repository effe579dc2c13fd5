//! Error taxonomy shared by the loader, the decoding loop and the bridge.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("model not loaded")]
    ModelNotLoaded,

    #[error("model file not found: {0}")]
    ModelNotFound(PathBuf),

    #[error("unsupported model format: {0}")]
    UnsupportedFormat(String),

    #[error("compute backend unavailable: {0}")]
    UnsupportedBackend(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("inference failed: {0}")]
    Inference(#[from] candle_core::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    /// Stable code surfaced to host applications alongside the message.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ModelNotLoaded => "MODEL_NOT_LOADED",
            Self::ModelNotFound(_) => "MODEL_NOT_FOUND",
            Self::UnsupportedFormat(_) => "UNSUPPORTED_FORMAT",
            Self::UnsupportedBackend(_) => "UNSUPPORTED_BACKEND",
            Self::Config(_) | Self::Json(_) => "CONFIG_ERROR",
            Self::InvalidArgument(_) => "INVALID_ARGS",
            Self::Inference(_) => "INFERENCE_ERROR",
            Self::Io(_) => "IO_ERROR",
        }
    }
}
