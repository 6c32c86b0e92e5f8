use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Ballot '{0}' not found")]
    BallotNotFound(String),

    #[error("Ballot '{0}' has no source document")]
    NoDocument(String),

    #[error("Failed to store '{path}': {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Stored page assignment '{value}' is invalid: {reason}")]
    InvalidPageAssignment { value: String, reason: String },

    #[error("OCR is not configured")]
    OcrNotConfigured,
}
