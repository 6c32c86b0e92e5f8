//! Candidate draft repository. One draft set per ballot.

use rusqlite::{params, Row};

use super::{Database, DatabaseError};

/// Source type written by the parser. Drafts of any other source type were
/// entered elsewhere and are never overwritten.
pub const PARSED_PDF: &str = "parsed_pdf";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftSetRow {
    pub ballot_paper_id: String,
    pub document_id: Option<String>,
    /// `text_layer` or `ocr`.
    pub backend: Option<String>,
    pub source_type: String,
    pub source: String,
    /// JSON array of candidate records.
    pub records_json: String,
    pub updated_at: String,
}

impl DraftSetRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            ballot_paper_id: row.get("ballot_paper_id")?,
            document_id: row.get("document_id")?,
            backend: row.get("backend")?,
            source_type: row.get("source_type")?,
            source: row.get("source")?,
            records_json: row.get("records_json")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Replaces the draft set of a ballot.
pub fn replace(db: &Database, draft: &DraftSetRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO draft_sets (ballot_paper_id, document_id, backend, source_type, source,
             records_json, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(ballot_paper_id) DO UPDATE SET
               document_id = excluded.document_id,
               backend = excluded.backend,
               source_type = excluded.source_type,
               source = excluded.source,
               records_json = excluded.records_json,
               updated_at = excluded.updated_at",
            params![
                draft.ballot_paper_id,
                draft.document_id,
                draft.backend,
                draft.source_type,
                draft.source,
                draft.records_json,
                draft.updated_at,
            ],
        )?;
        Ok(())
    })
}

pub fn find(db: &Database, ballot_paper_id: &str) -> Result<Option<DraftSetRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM draft_sets WHERE ballot_paper_id = ?1")?;
        let mut rows = stmt.query_map(params![ballot_paper_id], DraftSetRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}
