//! In-memory index over the party register, keyed by canonical text.

use serde::{Deserialize, Serialize};

use crate::db::party_repo::{self, DescriptionRow, PartyRow};
use crate::db::{Database, DatabaseError};
use crate::text::canonicalize;

/// A resolved party, optionally narrowed to one of its descriptions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartyReference {
    pub party_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description_id: Option<i64>,
}

impl PartyReference {
    pub fn party(party_id: impl Into<String>) -> Self {
        Self {
            party_id: party_id.into(),
            description_id: None,
        }
    }
}

/// A party offered to a human resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyOption {
    pub party_id: String,
    pub name: String,
    pub distance: usize,
}

/// Strips a leading "the" and a trailing "party" from a canonical key.
pub(crate) fn strip_affixes(key: &str) -> String {
    let key = key.strip_prefix("the ").unwrap_or(key);
    let key = key.strip_suffix(" party").unwrap_or(key);
    key.to_string()
}

struct NameKey {
    key: String,
    party: usize,
}

struct DescriptionKey {
    key: String,
    description: usize,
}

pub struct PartyIndex {
    parties: Vec<PartyRow>,
    descriptions: Vec<DescriptionRow>,
    names: Vec<NameKey>,
    description_keys: Vec<DescriptionKey>,
}

impl PartyIndex {
    /// Builds the index. Parties are kept ordered by id and descriptions by
    /// (party id, description id), so every lookup returns candidates in
    /// tie-break order.
    pub fn new(mut parties: Vec<PartyRow>, mut descriptions: Vec<DescriptionRow>) -> Self {
        parties.sort_by(|a, b| a.party_id.cmp(&b.party_id));
        descriptions.sort_by(|a, b| (&a.party_id, a.id).cmp(&(&b.party_id, b.id)));

        let mut names = Vec::new();
        for (i, party) in parties.iter().enumerate() {
            let key = canonicalize(&party.name);
            let stripped = strip_affixes(&key);
            if stripped != key && !stripped.is_empty() {
                names.push(NameKey {
                    key: stripped,
                    party: i,
                });
            }
            names.push(NameKey { key, party: i });
        }

        let mut description_keys = Vec::new();
        for (i, description) in descriptions.iter().enumerate() {
            description_keys.push(DescriptionKey {
                key: canonicalize(&description.description),
                description: i,
            });
            // Bilingual descriptions: "Welsh | English".
            if description.description.contains('|') {
                for half in description.description.split('|') {
                    let key = canonicalize(half);
                    if !key.is_empty() {
                        description_keys.push(DescriptionKey { key, description: i });
                    }
                }
            }
        }

        Self {
            parties,
            descriptions,
            names,
            description_keys,
        }
    }

    pub fn load(db: &Database) -> Result<Self, DatabaseError> {
        let parties = party_repo::list_parties(db)?;
        let descriptions = party_repo::list_descriptions(db)?;
        Ok(Self::new(parties, descriptions))
    }

    pub fn is_empty(&self) -> bool {
        self.parties.is_empty()
    }

    pub fn party(&self, party_id: &str) -> Option<&PartyRow> {
        self.parties
            .binary_search_by(|p| p.party_id.as_str().cmp(party_id))
            .ok()
            .map(|i| &self.parties[i])
    }

    fn in_register(&self, party_id: &str, register: Option<&str>) -> bool {
        match (register, self.party(party_id)) {
            (None, Some(_)) => true,
            (Some(register), Some(party)) => party.register.eq_ignore_ascii_case(register),
            (_, None) => false,
        }
    }

    /// Parties whose id equals `text`, ignoring case.
    pub fn by_id(&self, text: &str, register: Option<&str>) -> Vec<PartyReference> {
        let text = text.trim();
        self.parties
            .iter()
            .filter(|p| p.party_id.eq_ignore_ascii_case(text))
            .filter(|p| self.in_register(&p.party_id, register))
            .map(|p| PartyReference::party(p.party_id.clone()))
            .collect()
    }

    /// Parties whose canonical name equals `key`, in party id order.
    pub fn by_name(&self, key: &str, register: Option<&str>) -> Vec<PartyReference> {
        let mut found: Vec<usize> = self
            .names
            .iter()
            .filter(|n| n.key == key)
            .map(|n| n.party)
            .filter(|&i| self.in_register(&self.parties[i].party_id, register))
            .collect();
        found.sort_unstable();
        found.dedup();
        found
            .into_iter()
            .map(|i| PartyReference::party(self.parties[i].party_id.clone()))
            .collect()
    }

    /// Descriptions whose canonical text equals `key`.
    pub fn by_description(&self, key: &str, register: Option<&str>) -> Vec<PartyReference> {
        self.descriptions_where(|k| k == key, register)
    }

    /// Descriptions whose canonical text starts with `key`.
    pub fn by_description_prefix(&self, key: &str, register: Option<&str>) -> Vec<PartyReference> {
        if key.is_empty() {
            return Vec::new();
        }
        self.descriptions_where(|k| k.starts_with(key), register)
    }

    fn descriptions_where<F>(&self, predicate: F, register: Option<&str>) -> Vec<PartyReference>
    where
        F: Fn(&str) -> bool,
    {
        let mut found: Vec<usize> = self
            .description_keys
            .iter()
            .filter(|d| predicate(&d.key))
            .map(|d| d.description)
            .filter(|&i| self.in_register(&self.descriptions[i].party_id, register))
            .collect();
        found.sort_unstable();
        found.dedup();
        found
            .into_iter()
            .map(|i| self.description_reference(i))
            .collect()
    }

    fn description_reference(&self, i: usize) -> PartyReference {
        let description = &self.descriptions[i];
        PartyReference {
            party_id: description.party_id.clone(),
            description_id: Some(description.id),
        }
    }

    /// Every name and description within `max_distance` edits of `key`,
    /// closest first, then in tie-break order. Keys no longer than twice the
    /// distance are ignored.
    pub fn fuzzy(
        &self,
        key: &str,
        max_distance: usize,
        register: Option<&str>,
    ) -> Vec<(usize, PartyReference)> {
        let accept = |candidate: &str| -> Option<usize> {
            let distance = strsim::levenshtein(key, candidate);
            (distance <= max_distance && candidate.chars().count() > 2 * distance)
                .then_some(distance)
        };

        let mut found: Vec<(usize, PartyReference)> = Vec::new();
        for name in &self.names {
            let party = &self.parties[name.party];
            if !self.in_register(&party.party_id, register) {
                continue;
            }
            if let Some(distance) = accept(&name.key) {
                found.push((distance, PartyReference::party(party.party_id.clone())));
            }
        }
        for description in &self.description_keys {
            if !self.in_register(&self.descriptions[description.description].party_id, register) {
                continue;
            }
            if let Some(distance) = accept(&description.key) {
                found.push((distance, self.description_reference(description.description)));
            }
        }

        found.sort_by(|(da, a), (db, b)| {
            (da, &a.party_id, a.description_id).cmp(&(db, &b.party_id, b.description_id))
        });
        found.dedup_by(|a, b| a.1 == b.1);
        found
    }

    /// The `limit` parties closest to `key` by edit distance over names and
    /// descriptions.
    pub fn closest(&self, key: &str, limit: usize, register: Option<&str>) -> Vec<PartyOption> {
        let mut best: Vec<(usize, usize)> = Vec::new();
        let mut consider = |party: usize, candidate: &str| {
            let distance = strsim::levenshtein(key, candidate);
            match best.iter_mut().find(|(p, _)| *p == party) {
                Some(entry) => entry.1 = entry.1.min(distance),
                None => best.push((party, distance)),
            }
        };

        for name in &self.names {
            consider(name.party, &name.key);
        }
        for description in &self.description_keys {
            let party_id = &self.descriptions[description.description].party_id;
            if let Ok(party) = self
                .parties
                .binary_search_by(|p| p.party_id.as_str().cmp(party_id))
            {
                consider(party, &description.key);
            }
        }

        best.retain(|(party, _)| self.in_register(&self.parties[*party].party_id, register));
        best.sort_by_key(|&(party, distance)| (distance, party));
        best.into_iter()
            .take(limit)
            .map(|(party, distance)| PartyOption {
                party_id: self.parties[party].party_id.clone(),
                name: self.parties[party].name.clone(),
                distance,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn party(id: &str, name: &str, register: &str) -> PartyRow {
        PartyRow {
            party_id: id.to_string(),
            name: name.to_string(),
            register: register.to_string(),
        }
    }

    fn description(id: i64, party_id: &str, text: &str) -> DescriptionRow {
        DescriptionRow {
            id,
            party_id: party_id.to_string(),
            description: text.to_string(),
        }
    }

    fn index() -> PartyIndex {
        PartyIndex::new(
            vec![
                party("PP63", "Green Party", "GB"),
                party("PP53", "Labour Party", "GB"),
                party("PP103", "Sinn Féin", "NI"),
                party("PP77", "Plaid Cymru - The Party of Wales", "GB"),
            ],
            vec![
                description(7, "PP53", "Labour and Co-operative Party"),
                description(3, "PP77", "Plaid Cymru | Plaid Cymru - The Party of Wales"),
            ],
        )
    }

    #[test]
    fn test_by_id_ignores_case() {
        assert_eq!(index().by_id(" pp53 ", None), vec![PartyReference::party("PP53")]);
    }

    #[test]
    fn test_name_keys_include_stripped_form() {
        let index = index();
        assert_eq!(index.by_name("labour", None), vec![PartyReference::party("PP53")]);
        assert_eq!(index.by_name("green party", None), vec![PartyReference::party("PP63")]);
    }

    #[test]
    fn test_register_filter() {
        let index = index();
        assert_eq!(index.by_name("sinn fein", Some("NI")).len(), 1);
        assert!(index.by_name("sinn fein", Some("GB")).is_empty());
    }

    #[test]
    fn test_bilingual_halves() {
        let index = index();
        let expected = vec![PartyReference {
            party_id: "PP77".to_string(),
            description_id: Some(3),
        }];
        assert_eq!(index.by_description("plaid cymru", None), expected);
        assert_eq!(
            index.by_description("plaid cymru the party of wales", None),
            expected
        );
    }

    #[test]
    fn test_fuzzy_respects_length_guard() {
        let index = index();
        let found = index.fuzzy("labour and co operativ party", 3, None);
        assert_eq!(found[0].0, 1);
        assert_eq!(found[0].1.description_id, Some(7));

        // "labour" is 3 edits away but not longer than twice that.
        assert!(index.fuzzy("lab", 3, None).is_empty());
    }

    #[test]
    fn test_closest_lists_parties_once() {
        let options = index().closest("labor", 5, Some("GB"));
        assert_eq!(options[0].party_id, "PP53");
        assert_eq!(options.len(), 3);
    }
}
