//! Error types shared by configuration, data loading and model assembly.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the library
#[derive(Error, Debug)]
pub enum TcnError {
    #[error(
        "Stride <= 0 (got {stride}) - needs to be > 0. Possible solutions: reduce kernel_size, \
         increase nb_hist, or disable ignore_boundaries"
    )]
    InvalidStride { stride: i64 },

    #[error("Invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("Unknown model `{name}`. Available models: {available}")]
    UnknownModel { name: String, available: String },

    #[error("Unknown activation `{0}`. Use one of: norm_relu, wavenet, relu")]
    UnknownActivation(String),

    #[error("Unknown padding `{0}`. Use `same` or `causal`")]
    UnknownPadding(String),

    #[error("Shape mismatch in {context}: {detail}")]
    ShapeMismatch { context: String, detail: String },

    #[error("Missing dataset file {0}")]
    MissingFile(PathBuf),

    #[error("Failed to read {path}: {source}")]
    ReadNpy {
        path: PathBuf,
        #[source]
        source: ndarray_npy::ReadNpyError,
    },

    #[error("Failed to write {path}: {source}")]
    WriteNpy {
        path: PathBuf,
        #[source]
        source: ndarray_npy::WriteNpyError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result alias for library operations
pub type Result<T> = std::result::Result<T, TcnError>;
