use thiserror::Error;

/// Errors raised while turning a table into candidate records.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Can't parse a locked ballot '{0}'")]
    Locked(String),

    #[error("Pages for ballot '{0}' are not assigned, extract pages first")]
    PagesNotAssigned(String),

    #[error("No table for ballot '{0}', extract a table first")]
    NoTable(String),

    #[error("Ballot '{0}' is waiting on OCR")]
    AwaitingOcr(String),

    #[error("OCR failed for ballot '{ballot_paper_id}': {message}")]
    OcrFailed {
        ballot_paper_id: String,
        message: String,
    },

    #[error("No header row found in table")]
    NoHeader,

    #[error("No name column in header {0:?}")]
    NoNameColumn(Vec<String>),

    #[error("No description column in header {0:?}")]
    NoDescriptionColumn(Vec<String>),
}

impl ParseError {
    /// True when the ballot only needs to wait for the image backend.
    pub fn is_waiting(&self) -> bool {
        matches!(self, ParseError::AwaitingOcr(_))
    }
}
