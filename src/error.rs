use crate::capture::BackendKind;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Cannot resolve url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Fetching {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },

    #[error("No script registered with id {0}")]
    UnknownScript(String),

    #[error("Method {0} is not handled by any domain")]
    UnknownMethod(String),

    #[error("Capture failed: {0}")]
    Capture(#[from] CaptureError),

    #[error("Internal error: {0}")]
    InternalError(String),
}

pub type BridgeResult<T> = Result<T, BridgeError>;

/// Failures of the still-image capture pipeline.
///
/// Cloneable because one coalesced capture execution may be awaited by
/// several callers at once.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CaptureError {
    #[error("Failed to load {backend} library: {message}")]
    LibraryLoad { backend: BackendKind, message: String },

    #[error("{backend} failed to render the page: {message}")]
    Render { backend: BackendKind, message: String },

    #[error("{0} library previously failed to load")]
    LibraryUnavailable(BackendKind),
}

pub type CaptureResult<T> = Result<T, CaptureError>;
