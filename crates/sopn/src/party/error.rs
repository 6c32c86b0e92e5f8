use thiserror::Error;

use crate::db::DatabaseError;

#[derive(Error, Debug)]
pub enum MatchError {
    #[error("Unmatched party: '{0}'")]
    Unmatched(String),

    #[error("Unknown party id '{0}'")]
    UnknownParty(String),

    #[error("Manual resolution failed: {0}")]
    Resolver(String),

    #[error("Override store error: {0}")]
    Store(#[from] DatabaseError),
}

pub type Result<T> = std::result::Result<T, MatchError>;
