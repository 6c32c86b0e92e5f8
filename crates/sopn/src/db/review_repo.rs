//! Queue of party names nobody has resolved yet.

use rusqlite::{params, Row};

use super::{Database, DatabaseError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewRequestRow {
    pub id: i64,
    pub raw_text: String,
    pub raw_key: String,
    /// JSON array of the closest candidate options shown to a reviewer.
    pub options_json: String,
    pub created_at: String,
}

impl ReviewRequestRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            raw_text: row.get("raw_text")?,
            raw_key: row.get("raw_key")?,
            options_json: row.get("options_json")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// Queues a review request. Returns false if the key is already queued.
pub fn enqueue(
    db: &Database,
    raw_text: &str,
    raw_key: &str,
    options_json: &str,
) -> Result<bool, DatabaseError> {
    let created_at = super::now();
    db.with_conn(|conn| {
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO review_requests (raw_text, raw_key, options_json, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![raw_text, raw_key, options_json, created_at],
        )?;
        Ok(inserted == 1)
    })
}

pub fn list(db: &Database) -> Result<Vec<ReviewRequestRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM review_requests ORDER BY id")?;
        let rows = stmt
            .query_map([], ReviewRequestRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Drops the request for a key once it has been resolved.
pub fn remove(db: &Database, raw_key: &str) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "DELETE FROM review_requests WHERE raw_key = ?1",
            params![raw_key],
        )?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enqueue_once_per_key() {
        let db = Database::open_in_memory().unwrap();
        assert!(enqueue(&db, "Vote Greem", "vote greem", "[]").unwrap());
        assert!(!enqueue(&db, "VOTE GREEM", "vote greem", "[]").unwrap());

        let queued = list(&db).unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].raw_text, "Vote Greem");

        remove(&db, "vote greem").unwrap();
        assert!(list(&db).unwrap().is_empty());
    }
}
