//! Party register repository: registered parties and their ballot
//! descriptions.

use rusqlite::{params, Row};
use serde::{Deserialize, Serialize};

use super::{Database, DatabaseError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyRow {
    pub party_id: String,
    pub name: String,
    /// `GB` or `NI`.
    #[serde(default = "default_register")]
    pub register: String,
}

fn default_register() -> String {
    "GB".to_string()
}

impl PartyRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            party_id: row.get("party_id")?,
            name: row.get("name")?,
            register: row.get("register")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptionRow {
    pub id: i64,
    pub party_id: String,
    pub description: String,
}

impl DescriptionRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            party_id: row.get("party_id")?,
            description: row.get("description")?,
        })
    }
}

pub fn upsert_party(db: &Database, party: &PartyRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO parties (party_id, name, register) VALUES (?1, ?2, ?3)
             ON CONFLICT(party_id) DO UPDATE SET
               name = excluded.name,
               register = excluded.register",
            params![party.party_id, party.name, party.register],
        )?;
        Ok(())
    })
}

/// Adds a description to a party and returns its id. Adding a description
/// the party already has returns the existing id.
pub fn insert_description(
    db: &Database,
    party_id: &str,
    description: &str,
) -> Result<i64, DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT OR IGNORE INTO party_descriptions (party_id, description) VALUES (?1, ?2)",
            params![party_id, description],
        )?;
        let id = conn.query_row(
            "SELECT id FROM party_descriptions WHERE party_id = ?1 AND description = ?2",
            params![party_id, description],
            |r| r.get(0),
        )?;
        Ok(id)
    })
}

/// Every party, ordered by id.
pub fn list_parties(db: &Database) -> Result<Vec<PartyRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM parties ORDER BY party_id")?;
        let rows = stmt
            .query_map([], PartyRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Every description, ordered by party then description id.
pub fn list_descriptions(db: &Database) -> Result<Vec<DescriptionRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT * FROM party_descriptions ORDER BY party_id, id")?;
        let rows = stmt
            .query_map([], DescriptionRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn party(id: &str, name: &str) -> PartyRow {
        PartyRow {
            party_id: id.to_string(),
            name: name.to_string(),
            register: "GB".to_string(),
        }
    }

    #[test]
    fn test_upsert_party_updates_name() {
        let db = Database::open_in_memory().unwrap();
        upsert_party(&db, &party("PP63", "Green Party")).unwrap();
        upsert_party(&db, &party("PP63", "The Green Party")).unwrap();

        let parties = list_parties(&db).unwrap();
        assert_eq!(parties.len(), 1);
        assert_eq!(parties[0].name, "The Green Party");
    }

    #[test]
    fn test_insert_description_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        upsert_party(&db, &party("PP63", "Green Party")).unwrap();

        let first = insert_description(&db, "PP63", "Green Party - Vote Green").unwrap();
        let again = insert_description(&db, "PP63", "Green Party - Vote Green").unwrap();
        let other = insert_description(&db, "PP63", "Green Party - Local Greens").unwrap();

        assert_eq!(first, again);
        assert_ne!(first, other);
        assert_eq!(list_descriptions(&db).unwrap().len(), 2);
    }

    #[test]
    fn test_description_requires_party() {
        let db = Database::open_in_memory().unwrap();
        assert!(insert_description(&db, "PP404", "Nobody").is_err());
    }
}
