//! Candidate tables to draft nomination records.

pub mod error;
pub mod fields;
pub mod names;
pub mod parser;

pub use error::ParseError;
pub use names::{clean_description, clean_name};
pub use parser::{
    parse_table, stored_records, Backend, CandidateDraftRecord, DraftParser, DraftParty,
    ParsedDraft,
};
