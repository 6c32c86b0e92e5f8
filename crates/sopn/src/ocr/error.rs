use std::path::PathBuf;

use thiserror::Error;

use crate::secrets::SecretError;

/// Errors from the document analysis backend.
#[derive(Error, Debug)]
pub enum OcrError {
    #[error("Document analysis service is not configured")]
    NotConfigured,

    #[error("Failed to load service API key: {0}")]
    Secret(#[from] SecretError),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid service response: {0}")]
    InvalidResponse(String),

    #[error("Failed to decode analysis output: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to read document '{path}': {source}")]
    ReadDocument {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write page image '{path}': {source}")]
    WriteImage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Document '{0}' already has an analysis job in progress")]
    AlreadySubmitted(String),

    #[error("Unknown OCR job status '{0}'")]
    UnknownStatus(String),
}

pub type Result<T> = std::result::Result<T, OcrError>;
