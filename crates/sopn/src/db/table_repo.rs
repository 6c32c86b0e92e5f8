//! Extracted table repository. One row per source document.

use rusqlite::{params, Row};

use super::{Database, DatabaseError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedTableRow {
    pub document_id: String,
    pub flavor: String,
    /// JSON array of rows, each an array of cell strings.
    pub rows_json: String,
    pub created_at: String,
    pub updated_at: String,
}

impl ExtractedTableRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            document_id: row.get("document_id")?,
            flavor: row.get("flavor")?,
            rows_json: row.get("rows_json")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Inserts or overwrites the table for a document.
pub fn upsert(db: &Database, table: &ExtractedTableRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO extracted_tables (document_id, flavor, rows_json, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(document_id) DO UPDATE SET
               flavor = excluded.flavor,
               rows_json = excluded.rows_json,
               updated_at = excluded.updated_at",
            params![
                table.document_id,
                table.flavor,
                table.rows_json,
                table.created_at,
                table.updated_at,
            ],
        )?;
        Ok(())
    })
}

pub fn find(db: &Database, document_id: &str) -> Result<Option<ExtractedTableRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM extracted_tables WHERE document_id = ?1")?;
        let mut rows = stmt.query_map(params![document_id], ExtractedTableRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Removes a stale table, e.g. when a re-extraction finds nothing.
pub fn delete(db: &Database, document_id: &str) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "DELETE FROM extracted_tables WHERE document_id = ?1",
            params![document_id],
        )?;
        Ok(())
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
                 INSERT INTO source_documents (id, ballot_paper_id, source_url, file_path, file_kind, created_at)
                 VALUES ('d1', 'b1', 'https://example.gov.uk/a.pdf', '/tmp/a.pdf', 'pdf', 'now');",
            )?;
            Ok(())
        })
        .unwrap();
        db
    }

    fn sample(rows_json: &str, updated_at: &str) -> ExtractedTableRow {
        ExtractedTableRow {
            document_id: "d1".to_string(),
            flavor: "lattice".to_string(),
            rows_json: rows_json.to_string(),
            created_at: updated_at.to_string(),
            updated_at: updated_at.to_string(),
        }
    }

    #[test]
    fn test_upsert_overwrites() {
        let db = test_db();
        upsert(&db, &sample(r#"[["a"]]"#, "t1")).unwrap();
        upsert(&db, &sample(r#"[["b"]]"#, "t2")).unwrap();

        let found = find(&db, "d1").unwrap().unwrap();
        assert_eq!(found.rows_json, r#"[["b"]]"#);
        assert_eq!(found.created_at, "t1");
        assert_eq!(found.updated_at, "t2");
    }

    #[test]
    fn test_delete() {
        let db = test_db();
        upsert(&db, &sample("[]", "t1")).unwrap();
        delete(&db, "d1").unwrap();
        assert!(find(&db, "d1").unwrap().is_none());
    }
}
