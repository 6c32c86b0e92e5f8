//! Drives ballots through page mapping, table extraction, OCR and parsing.

pub mod error;
pub mod report;
pub mod runner;

pub use error::PipelineError;
pub use report::{BallotOutcome, BallotReport, SweepReport};
pub use runner::{BallotFilter, Pipeline};
