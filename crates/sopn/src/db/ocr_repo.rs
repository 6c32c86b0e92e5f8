//! OCR job repository.
//!
//! A document may have several attempts; the one with the highest id is
//! current. Terminal transitions are guarded by `WHERE status = 'submitted'`,
//! so an attempt that already succeeded or failed is never rewritten.

use rusqlite::{params, Row};

use super::{Database, DatabaseError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcrJobRow {
    pub document_id: String,
    pub job_id: String,
    pub status: String,
    pub pages: Option<String>,
    pub raw_output: Option<String>,
    pub error: Option<String>,
    pub submitted_at: String,
    pub updated_at: String,
}

impl OcrJobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            document_id: row.get("document_id")?,
            job_id: row.get("job_id")?,
            status: row.get("status")?,
            pages: row.get("pages")?,
            raw_output: row.get("raw_output")?,
            error: row.get("error")?,
            submitted_at: row.get("submitted_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImageRow {
    pub page_number: u32,
    pub image_path: String,
}

/// Records a freshly submitted job as the document's latest attempt.
pub fn insert_submitted(db: &Database, job: &OcrJobRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO ocr_jobs (document_id, job_id, status, pages, submitted_at, updated_at)
             VALUES (?1, ?2, 'submitted', ?3, ?4, ?5)",
            params![
                job.document_id,
                job.job_id,
                job.pages,
                job.submitted_at,
                job.updated_at,
            ],
        )?;
        Ok(())
    })
}

/// The latest attempt for a document.
pub fn find(db: &Database, document_id: &str) -> Result<Option<OcrJobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM ocr_jobs WHERE document_id = ?1 ORDER BY id DESC LIMIT 1",
        )?;
        let mut rows = stmt.query_map(params![document_id], OcrJobRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Lists every attempt, optionally restricted to one status, oldest first.
pub fn list(db: &Database, status: Option<&str>) -> Result<Vec<OcrJobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let rows = match status {
            Some(status) => {
                let mut stmt = conn
                    .prepare("SELECT * FROM ocr_jobs WHERE status = ?1 ORDER BY submitted_at, id")?;
                let rows = stmt
                    .query_map(params![status], OcrJobRow::from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
            None => {
                let mut stmt = conn.prepare("SELECT * FROM ocr_jobs ORDER BY submitted_at, id")?;
                let rows = stmt
                    .query_map([], OcrJobRow::from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
        };
        Ok(rows)
    })
}

/// Jobs in `status` whose ballot belongs to a current election and is not
/// locked, oldest first.
pub fn list_for_open_ballots(db: &Database, status: &str) -> Result<Vec<OcrJobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT j.* FROM ocr_jobs j
             JOIN source_documents d ON d.id = j.document_id
             JOIN ballots b ON b.ballot_paper_id = d.ballot_paper_id
             WHERE j.status = ?1 AND b.election_current = 1 AND b.candidates_locked = 0
             ORDER BY j.submitted_at, j.id",
        )?;
        let rows = stmt
            .query_map(params![status], OcrJobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Moves a submitted job to `succeeded`. Returns false if it was not
/// `submitted`.
pub fn mark_succeeded(
    db: &Database,
    job_id: &str,
    raw_output: &str,
    updated_at: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE ocr_jobs SET status = 'succeeded', raw_output = ?2, error = NULL, updated_at = ?3
             WHERE job_id = ?1 AND status = 'submitted'",
            params![job_id, raw_output, updated_at],
        )?;
        Ok(changed == 1)
    })
}

/// Moves a submitted job to `failed`. Returns false if it was not
/// `submitted`.
pub fn mark_failed(
    db: &Database,
    job_id: &str,
    error: &str,
    updated_at: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE ocr_jobs SET status = 'failed', error = ?2, updated_at = ?3
             WHERE job_id = ?1 AND status = 'submitted'",
            params![job_id, error, updated_at],
        )?;
        Ok(changed == 1)
    })
}

/// Replaces the page images recorded for a job.
pub fn replace_images(
    db: &Database,
    job_id: &str,
    images: &[PageImageRow],
) -> Result<(), DatabaseError> {
    db.with_transaction(|tx| {
        tx.execute("DELETE FROM ocr_page_images WHERE job_id = ?1", params![job_id])?;
        for image in images {
            tx.execute(
                "INSERT INTO ocr_page_images (job_id, page_number, image_path)
                 VALUES (?1, ?2, ?3)",
                params![job_id, image.page_number, image.image_path],
            )?;
        }
        Ok(())
    })
}

pub fn list_images(db: &Database, job_id: &str) -> Result<Vec<PageImageRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT page_number, image_path FROM ocr_page_images
             WHERE job_id = ?1 ORDER BY page_number",
        )?;
        let rows = stmt
            .query_map(params![job_id], |r| {
                Ok(PageImageRow {
                    page_number: r.get(0)?,
                    image_path: r.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        let db = Database::open_in_memory().expect("Failed to create test database");
        db.with_conn(|conn| {
            conn.execute_batch(
                "INSERT INTO ballots (ballot_paper_id, election_slug, post_label, created_at)
                 VALUES ('b1', 'e1', 'Ward', 'now');
                 INSERT INTO ballots (ballot_paper_id, election_slug, post_label, candidates_locked, created_at)
                 VALUES ('b2', 'e1', 'Other Ward', 1, 'now');
                 INSERT INTO source_documents (id, ballot_paper_id, source_url, file_path, file_kind, created_at)
                 VALUES ('d1', 'b1', 'https://example.gov.uk/a.pdf', '/tmp/a.pdf', 'pdf', 'now');
                 INSERT INTO source_documents (id, ballot_paper_id, source_url, file_path, file_kind, created_at)
                 VALUES ('d2', 'b2', 'https://example.gov.uk/b.pdf', '/tmp/b.pdf', 'pdf', 'now');",
            )?;
            Ok(())
        })
        .unwrap();
        db
    }

    fn submitted(document_id: &str, job_id: &str) -> OcrJobRow {
        OcrJobRow {
            document_id: document_id.to_string(),
            job_id: job_id.to_string(),
            status: "submitted".to_string(),
            pages: Some("1,2".to_string()),
            raw_output: None,
            error: None,
            submitted_at: "2024-04-08T10:00:00+00:00".to_string(),
            updated_at: "2024-04-08T10:00:00+00:00".to_string(),
        }
    }

    #[test]
    fn test_submit_and_succeed() {
        let db = test_db();
        insert_submitted(&db, &submitted("d1", "job-1")).unwrap();
        assert_eq!(list(&db, Some("submitted")).unwrap().len(), 1);

        assert!(mark_succeeded(&db, "job-1", "[]", "later").unwrap());
        let job = find(&db, "d1").unwrap().unwrap();
        assert_eq!(job.status, "succeeded");
        assert_eq!(job.raw_output.as_deref(), Some("[]"));
    }

    #[test]
    fn test_terminal_status_is_not_rewritten() {
        let db = test_db();
        insert_submitted(&db, &submitted("d1", "job-1")).unwrap();
        assert!(mark_failed(&db, "job-1", "service failed", "later").unwrap());

        assert!(!mark_succeeded(&db, "job-1", "[]", "later").unwrap());
        assert!(!mark_failed(&db, "job-1", "again", "later").unwrap());

        let job = find(&db, "d1").unwrap().unwrap();
        assert_eq!(job.status, "failed");
        assert_eq!(job.error.as_deref(), Some("service failed"));
    }

    #[test]
    fn test_new_attempt_keeps_earlier_record() {
        let db = test_db();
        insert_submitted(&db, &submitted("d1", "job-1")).unwrap();
        mark_failed(&db, "job-1", "service failed", "later").unwrap();
        replace_images(
            &db,
            "job-1",
            &[PageImageRow {
                page_number: 1,
                image_path: "/tmp/page_1.png".to_string(),
            }],
        )
        .unwrap();

        insert_submitted(&db, &submitted("d1", "job-2")).unwrap();

        let current = find(&db, "d1").unwrap().unwrap();
        assert_eq!(current.job_id, "job-2");
        assert_eq!(current.status, "submitted");

        let all = list(&db, None).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].status, "failed");
        assert_eq!(all[0].error.as_deref(), Some("service failed"));
        assert_eq!(list_images(&db, "job-1").unwrap().len(), 1);
        assert!(list_images(&db, "job-2").unwrap().is_empty());
    }

    #[test]
    fn test_open_ballot_listing_leaves_out_locked_ballots() {
        let db = test_db();
        insert_submitted(&db, &submitted("d1", "job-1")).unwrap();
        insert_submitted(&db, &submitted("d2", "job-2")).unwrap();

        let open = list_for_open_ballots(&db, "submitted").unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].document_id, "d1");
        assert_eq!(list(&db, Some("submitted")).unwrap().len(), 2);
    }
}
