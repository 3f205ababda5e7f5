//! Custom error types for pneumonia-detect.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the pneumonia-detect library.
#[derive(Error, Debug)]
pub enum Error {
    /// The caller sent something unusable (missing field, bad JSON, bad base64).
    #[error("{reason}")]
    InvalidInput { reason: String },

    /// The supplied bytes could not be decoded as an image.
    #[error("image could not be decoded, please ensure it is a valid image file: {source}")]
    InvalidImage {
        #[source]
        source: image::ImageError,
    },

    /// Model resolution is misconfigured (e.g. `MODEL_URL` unset).
    #[error("invalid configuration: {reason}")]
    Configuration { reason: String },

    /// Failed to download a model.
    #[error("failed to download model from {url}: {source}")]
    ModelDownload {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The model server answered with a non-success status.
    #[error("failed to download model from {url}: HTTP {status}")]
    DownloadStatus { url: String, status: u16 },

    /// No configured source produced a model file.
    #[error("no model file found (searched: {searched})")]
    ModelNotFound { searched: String },

    /// Failed to load an ONNX model.
    #[error("failed to load ONNX model {name}: {source}")]
    ModelLoad {
        name: String,
        #[source]
        source: ort::Error,
    },

    /// Model inference failed.
    #[error("model inference failed: {source}")]
    Inference {
        #[source]
        source: ort::Error,
    },

    /// Failed to create cache directory.
    #[error("failed to create cache directory {path}: {source}")]
    CacheDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid parameter value.
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Shape mismatch in tensor operations.
    #[error("tensor shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },

    /// An HTML page failed to render.
    #[error("template error: {0}")]
    Template(#[from] minijinja::Error),

    /// A blocking worker panicked or was cancelled.
    #[error("worker task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl Error {
    pub(crate) fn invalid_input(reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            reason: reason.into(),
        }
    }

    /// Whether the failure is attributable to the caller's input rather
    /// than to server or model state.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidInput { .. } | Self::InvalidImage { .. })
    }
}

/// Result type alias for pneumonia-detect operations.
pub type Result<T> = std::result::Result<T, Error>;
