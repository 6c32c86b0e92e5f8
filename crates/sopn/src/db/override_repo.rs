//! Saved party name overrides, keyed by normalised raw text.

use rusqlite::{params, Row};

use super::{Database, DatabaseError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverrideRow {
    pub raw_key: String,
    pub party_id: String,
    pub description_id: Option<i64>,
    pub created_at: String,
}

impl OverrideRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            raw_key: row.get("raw_key")?,
            party_id: row.get("party_id")?,
            description_id: row.get("description_id")?,
            created_at: row.get("created_at")?,
        })
    }
}

pub fn get(db: &Database, raw_key: &str) -> Result<Option<OverrideRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM party_name_overrides WHERE raw_key = ?1")?;
        let mut rows = stmt.query_map(params![raw_key], OverrideRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Stores an override, replacing any previous choice for the same key.
pub fn set(db: &Database, row: &OverrideRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO party_name_overrides (raw_key, party_id, description_id, created_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(raw_key) DO UPDATE SET
               party_id = excluded.party_id,
               description_id = excluded.description_id,
               created_at = excluded.created_at",
            params![row.raw_key, row.party_id, row.description_id, row.created_at],
        )?;
        Ok(())
    })
}

pub fn list(db: &Database) -> Result<Vec<OverrideRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM party_name_overrides ORDER BY raw_key")?;
        let rows = stmt
            .query_map([], OverrideRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}
