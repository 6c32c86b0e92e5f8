pub mod config;
pub mod db;
pub mod error;
pub mod ocr;
pub mod pages;
pub mod parse;
pub mod party;
pub mod pipeline;
pub mod processor;
pub mod sanitize;
pub mod secrets;
pub mod table;
pub mod text;

#[cfg(test)]
mod testing;

pub use config::{load_config, Config, TableFlavor};
pub use db::Database;
pub use error::{ConfigError, ConvertError, ExtractionError, Result, SopnError};
pub use pages::{PageAssignment, PageMapper};
pub use parse::{CandidateDraftRecord, DraftParser, DraftParty, ParseError};
pub use party::{ManualResolver, MatchError, PartyMatcher, PartyReference};
pub use pipeline::{BallotFilter, BallotOutcome, Pipeline, PipelineError, SweepReport};
pub use secrets::{resolve_secret, SecretError};
pub use table::{Table, TableExtractor, TableOutcome};
