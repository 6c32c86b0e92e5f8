//! Source document repository.
//!
//! A ballot owns at most one active document. Attaching a new one deletes
//! the previous row, and with it every artifact derived from it.

use rusqlite::{params, Row};

use super::draft_repo::PARSED_PDF;
use super::{Database, DatabaseError};

/// A raw source document row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRow {
    pub id: String,
    pub ballot_paper_id: String,
    pub source_url: String,
    pub file_path: String,
    pub file_kind: String,
    /// `all` or a comma separated page list; `None` until pages are mapped.
    pub relevant_pages: Option<String>,
    pub created_at: String,
}

impl DocumentRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            ballot_paper_id: row.get("ballot_paper_id")?,
            source_url: row.get("source_url")?,
            file_path: row.get("file_path")?,
            file_kind: row.get("file_kind")?,
            relevant_pages: row.get("relevant_pages")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// Makes `doc` the active document of its ballot, replacing any previous one.
pub fn attach(db: &Database, doc: &DocumentRow) -> Result<(), DatabaseError> {
    db.with_transaction(|tx| {
        tx.execute(
            "DELETE FROM source_documents WHERE ballot_paper_id = ?1",
            params![doc.ballot_paper_id],
        )?;
        tx.execute(
            "INSERT INTO source_documents (id, ballot_paper_id, source_url, file_path, file_kind,
             relevant_pages, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                doc.id,
                doc.ballot_paper_id,
                doc.source_url,
                doc.file_path,
                doc.file_kind,
                doc.relevant_pages,
                doc.created_at,
            ],
        )?;
        Ok(())
    })
}

fn find_one(
    db: &Database,
    sql: &str,
    key: &str,
) -> Result<Option<DocumentRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.query_map(params![key], DocumentRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Finds a document by its id.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<DocumentRow>, DatabaseError> {
    find_one(db, "SELECT * FROM source_documents WHERE id = ?1", id)
}

/// Finds the active document of a ballot.
pub fn find_for_ballot(
    db: &Database,
    ballot_paper_id: &str,
) -> Result<Option<DocumentRow>, DatabaseError> {
    find_one(
        db,
        "SELECT * FROM source_documents WHERE ballot_paper_id = ?1",
        ballot_paper_id,
    )
}

/// Every document published at `source_url`, oldest first.
///
/// Documents created in the same instant are ordered by id so the result is
/// stable.
pub fn find_by_source_url(db: &Database, source_url: &str) -> Result<Vec<DocumentRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM source_documents WHERE source_url = ?1 ORDER BY created_at ASC, id ASC",
        )?;
        let rows = stmt
            .query_map(params![source_url], DocumentRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Points a document at a new file, e.g. after conversion to PDF.
pub fn update_file(
    db: &Database,
    id: &str,
    file_path: &str,
    file_kind: &str,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE source_documents SET file_path = ?2, file_kind = ?3 WHERE id = ?1",
            params![id, file_path, file_kind],
        )?;
        Ok(())
    })
}

/// Stores the page assignment for a document. Returns true if it changed.
///
/// When a previous assignment is replaced, everything built from it goes in
/// the same transaction: the extracted table, the OCR job with its page
/// images, and a parser-written draft for the document.
pub fn set_relevant_pages(
    db: &Database,
    id: &str,
    relevant_pages: Option<&str>,
) -> Result<bool, DatabaseError> {
    db.with_transaction(|tx| {
        let mut stmt = tx.prepare("SELECT relevant_pages FROM source_documents WHERE id = ?1")?;
        let found: Vec<Option<String>> = stmt
            .query_map(params![id], |r| r.get(0))?
            .collect::<Result<_, _>>()?;
        drop(stmt);
        let Some(previous) = found.into_iter().next() else {
            return Ok(false);
        };
        if previous.as_deref() == relevant_pages {
            return Ok(false);
        }

        tx.execute(
            "UPDATE source_documents SET relevant_pages = ?2 WHERE id = ?1",
            params![id, relevant_pages],
        )?;
        if previous.is_some() {
            tx.execute("DELETE FROM extracted_tables WHERE document_id = ?1", params![id])?;
            tx.execute(
                "DELETE FROM ocr_page_images
                 WHERE job_id IN (SELECT job_id FROM ocr_jobs WHERE document_id = ?1)",
                params![id],
            )?;
            tx.execute("DELETE FROM ocr_jobs WHERE document_id = ?1", params![id])?;
            tx.execute(
                "DELETE FROM draft_sets WHERE document_id = ?1 AND source_type = ?2",
                params![id, PARSED_PDF],
            )?;
        }
        Ok(true)
    })
}
