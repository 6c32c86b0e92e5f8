//! Confirmed answers for party strings the matcher could not resolve alone.

use std::collections::BTreeMap;
use std::sync::Mutex;

use super::error::{MatchError, Result};
use super::registry::PartyReference;
use crate::db::override_repo::{self, OverrideRow};
use crate::db::review_repo;
use crate::db::{now, Database, DatabaseError};

/// Get/set/iterate access to saved overrides, keyed by canonical raw text.
pub trait OverrideStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<PartyReference>>;

    fn set(&self, key: &str, reference: &PartyReference) -> Result<()>;

    /// Every saved override, ordered by key.
    fn entries(&self) -> Result<Vec<(String, PartyReference)>>;
}

/// Overrides held in memory, for tests and one-off runs.
#[derive(Default)]
pub struct MemoryOverrideStore {
    entries: Mutex<BTreeMap<String, PartyReference>>,
}

impl MemoryOverrideStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OverrideStore for MemoryOverrideStore {
    fn get(&self, key: &str) -> Result<Option<PartyReference>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| MatchError::Store(DatabaseError::LockPoisoned))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, reference: &PartyReference) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| MatchError::Store(DatabaseError::LockPoisoned))?;
        entries.insert(key.to_string(), reference.clone());
        Ok(())
    }

    fn entries(&self) -> Result<Vec<(String, PartyReference)>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| MatchError::Store(DatabaseError::LockPoisoned))?;
        Ok(entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

/// Overrides persisted in the `party_name_overrides` table.
pub struct DbOverrideStore {
    db: Database,
}

impl DbOverrideStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

impl OverrideStore for DbOverrideStore {
    fn get(&self, key: &str) -> Result<Option<PartyReference>> {
        Ok(override_repo::get(&self.db, key)?.map(|row| PartyReference {
            party_id: row.party_id,
            description_id: row.description_id,
        }))
    }

    fn set(&self, key: &str, reference: &PartyReference) -> Result<()> {
        override_repo::set(
            &self.db,
            &OverrideRow {
                raw_key: key.to_string(),
                party_id: reference.party_id.clone(),
                description_id: reference.description_id,
                created_at: now(),
            },
        )?;
        review_repo::remove(&self.db, key)?;
        Ok(())
    }

    fn entries(&self) -> Result<Vec<(String, PartyReference)>> {
        Ok(override_repo::list(&self.db)?
            .into_iter()
            .map(|row| {
                (
                    row.raw_key,
                    PartyReference {
                        party_id: row.party_id,
                        description_id: row.description_id,
                    },
                )
            })
            .collect())
    }
}
