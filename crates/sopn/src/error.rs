use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SopnError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Conversion error: {0}")]
    Convert(#[from] ConvertError),

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("OCR error: {0}")]
    Ocr(#[from] crate::ocr::OcrError),

    #[error("Party matching error: {0}")]
    Match(#[from] crate::party::MatchError),

    #[error("Parse error: {0}")]
    Parse(#[from] crate::parse::ParseError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] crate::pipeline::PipelineError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },
}

/// Errors raised while turning an uploaded file into a PDF.
#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("Unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to read document '{path}': {source}")]
    ReadDocument {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to run '{command}': {source}")]
    ToolLaunch {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{command}' failed: {stderr}")]
    ToolFailed { command: String, stderr: String },

    #[error("Converter produced no output at '{0}'")]
    MissingOutput(PathBuf),

    #[error("Failed to write '{path}': {source}")]
    WriteOutput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised while reading a PDF's text layer.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Failed to read document '{path}': {source}")]
    ReadDocument {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed PDF: {0}")]
    MalformedPdf(String),

    #[error("PDF is encrypted")]
    Encrypted,

    #[error("No text in document")]
    NoTextInDocument,

    #[error("Matched pages error: {0}")]
    MatchedPages(String),

    #[error("Page {page} is out of range (document has {page_count} pages)")]
    PageOutOfRange { page: u32, page_count: u32 },

    #[error("Pages for table not known for document, extract page numbers first")]
    PagesNotAssigned,
}

impl ExtractionError {
    /// True when the text layer can't be trusted and an image backend should
    /// be tried instead.
    pub fn is_unreadable(&self) -> bool {
        matches!(
            self,
            ExtractionError::MalformedPdf(_)
                | ExtractionError::Encrypted
                | ExtractionError::NoTextInDocument
        )
    }
}

pub type Result<T> = std::result::Result<T, SopnError>;
