//! Ballot repository: the locally imported contests the pipeline works on.

use rusqlite::{params, Row};
use serde::{Deserialize, Serialize};

use super::{Database, DatabaseError};

/// A ballot row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallotRow {
    pub ballot_paper_id: String,
    pub election_slug: String,
    /// Published area name, e.g. "Batley East".
    pub post_label: String,
    #[serde(default = "default_register")]
    pub party_register: String,
    #[serde(default)]
    pub is_welsh_run: bool,
    #[serde(default = "default_true")]
    pub election_current: bool,
    #[serde(default)]
    pub candidates_locked: bool,
    #[serde(default)]
    pub created_at: String,
}

fn default_register() -> String {
    "GB".to_string()
}

fn default_true() -> bool {
    true
}

impl BallotRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            ballot_paper_id: row.get("ballot_paper_id")?,
            election_slug: row.get("election_slug")?,
            post_label: row.get("post_label")?,
            party_register: row.get("party_register")?,
            is_welsh_run: row.get("is_welsh_run")?,
            election_current: row.get("election_current")?,
            candidates_locked: row.get("candidates_locked")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// Query filter for ballot listing. Empty filter lists every ballot.
#[derive(Debug, Default, Clone)]
pub struct BallotQuery {
    pub current_only: bool,
    pub election_slug: Option<String>,
    pub ballot_paper_id: Option<String>,
    pub exclude_locked: bool,
}

/// Inserts a ballot or updates every field except `created_at`.
pub fn upsert(db: &Database, ballot: &BallotRow) -> Result<(), DatabaseError> {
    let created_at = if ballot.created_at.is_empty() {
        super::now()
    } else {
        ballot.created_at.clone()
    };
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO ballots (ballot_paper_id, election_slug, post_label, party_register,
             is_welsh_run, election_current, candidates_locked, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(ballot_paper_id) DO UPDATE SET
               election_slug = excluded.election_slug,
               post_label = excluded.post_label,
               party_register = excluded.party_register,
               is_welsh_run = excluded.is_welsh_run,
               election_current = excluded.election_current,
               candidates_locked = excluded.candidates_locked",
            params![
                ballot.ballot_paper_id,
                ballot.election_slug,
                ballot.post_label,
                ballot.party_register,
                ballot.is_welsh_run,
                ballot.election_current,
                ballot.candidates_locked,
                created_at,
            ],
        )?;
        Ok(())
    })
}

/// Finds a ballot by its id.
pub fn find_by_id(db: &Database, ballot_paper_id: &str) -> Result<Option<BallotRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM ballots WHERE ballot_paper_id = ?1")?;
        let mut rows = stmt.query_map(params![ballot_paper_id], BallotRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Lists ballots matching the query, ordered by ballot id.
pub fn query(db: &Database, filter: &BallotQuery) -> Result<Vec<BallotRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut conditions = Vec::new();
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if filter.current_only {
            conditions.push("election_current = 1".to_string());
        }
        if filter.exclude_locked {
            conditions.push("candidates_locked = 0".to_string());
        }
        if let Some(ref slug) = filter.election_slug {
            conditions.push(format!("election_slug = ?{}", param_values.len() + 1));
            param_values.push(Box::new(slug.clone()));
        }
        if let Some(ref id) = filter.ballot_paper_id {
            conditions.push(format!("ballot_paper_id = ?{}", param_values.len() + 1));
            param_values.push(Box::new(id.clone()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let sql = format!(
            "SELECT * FROM ballots {} ORDER BY ballot_paper_id",
            where_clause
        );
        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_ref.as_slice(), BallotRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}
