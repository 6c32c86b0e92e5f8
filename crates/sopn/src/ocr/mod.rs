//! Image backend: an external document analysis service for documents whose
//! text layer can't be read.

pub mod blocks;
pub mod error;
pub mod job;
pub mod service;

pub use blocks::AnalysisOutput;
pub use error::{OcrError, Result};
pub use job::{job_table, OcrJobStatus, OcrJobs, OcrTable, Submission};
pub use service::{AnalysisState, AnalysisStatus, DocumentAnalysisService, HttpAnalysisService};
