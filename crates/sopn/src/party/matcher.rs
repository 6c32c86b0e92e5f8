//! Resolves free-text party labels from a nomination table to registered
//! parties and descriptions.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::error::{MatchError, Result};
use super::overrides::OverrideStore;
use super::registry::{strip_affixes, PartyIndex, PartyReference};
use super::resolver::ManualResolver;
use crate::text::canonicalize;

/// How many parties a human resolver is offered.
const RESOLVER_OPTIONS: usize = 5;

/// Word-level rewrites tried after the literal text.
const ABBREVIATIONS: &[(&str, &str)] = &[
    ("tory", "conservative"),
    ("tories", "conservatives"),
    ("libdem", "liberal democrats"),
    ("libdems", "liberal democrats"),
    ("lib dem", "liberal democrats"),
    ("lib dems", "liberal democrats"),
    ("lab", "labour"),
];

pub struct PartyMatcher {
    index: PartyIndex,
    overrides: Arc<dyn OverrideStore>,
    resolver: Option<Arc<dyn ManualResolver>>,
    fuzzy_max_distance: usize,
}

/// Replaces `from` with `to` wherever it occurs as whole words in `key`.
fn replace_words(key: &str, from: &str, to: &str) -> String {
    let padded = format!(" {} ", key);
    let replaced = padded.replace(&format!(" {} ", from), &format!(" {} ", to));
    replaced.trim().to_string()
}

/// The input key followed by its rewrites, without duplicates.
pub fn variants(key: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut push = |candidate: String| {
        if !candidate.is_empty() && !out.contains(&candidate) {
            out.push(candidate);
        }
    };

    push(key.to_string());
    push(strip_affixes(key));
    let without_the = key.strip_prefix("the ").unwrap_or(key).to_string();
    push(without_the);

    for (from, to) in ABBREVIATIONS {
        let expanded = replace_words(key, from, to);
        if expanded != key {
            push(canonicalize(&expanded));
            push(strip_affixes(&canonicalize(&expanded)));
        }
    }

    out
}

impl PartyMatcher {
    pub fn new(
        index: PartyIndex,
        overrides: Arc<dyn OverrideStore>,
        resolver: Option<Arc<dyn ManualResolver>>,
        fuzzy_max_distance: usize,
    ) -> Self {
        Self {
            index,
            overrides,
            resolver,
            fuzzy_max_distance,
        }
    }

    pub fn index(&self) -> &PartyIndex {
        &self.index
    }

    /// Resolves `raw` to a party, considering only parties of `register` when
    /// one is given.
    ///
    /// The first layer to succeed wins: saved override, exact id/name/
    /// description, unique description prefix, fuzzy match, then the manual
    /// resolver. An answer from the resolver is saved as an override and the
    /// lookup is retried once without prompting.
    pub fn match_party(&self, raw: &str, register: Option<&str>) -> Result<PartyReference> {
        if let Some(found) = self.match_automatic(raw, register)? {
            return Ok(found);
        }

        let key = canonicalize(raw);
        let Some(resolver) = &self.resolver else {
            return Err(MatchError::Unmatched(raw.to_string()));
        };
        let options = self.index.closest(&key, RESOLVER_OPTIONS, register);
        let Some(answer) = resolver.resolve(raw, &options)? else {
            return Err(MatchError::Unmatched(raw.to_string()));
        };
        if self.index.party(&answer.party_id).is_none() {
            return Err(MatchError::UnknownParty(answer.party_id));
        }

        info!(raw = %raw, party_id = %answer.party_id, "Saving manual party match");
        self.overrides.set(&key, &answer)?;
        self.match_automatic(raw, register)?
            .ok_or_else(|| MatchError::Unmatched(raw.to_string()))
    }

    /// Every layer except the manual resolver.
    pub fn match_automatic(
        &self,
        raw: &str,
        register: Option<&str>,
    ) -> Result<Option<PartyReference>> {
        let key = canonicalize(raw);
        if key.is_empty() {
            return Ok(None);
        }

        if let Some(found) = self.overrides.get(&key)? {
            debug!(raw = %raw, party_id = %found.party_id, "Matched by override");
            return Ok(Some(found));
        }

        if let Some(found) = pick(raw, "id", self.index.by_id(raw, register)) {
            return Ok(Some(found));
        }

        let variants = variants(&key);
        for variant in &variants {
            if let Some(found) = pick(raw, "name", self.index.by_name(variant, register)) {
                return Ok(Some(found));
            }
            if let Some(found) = pick(
                raw,
                "description",
                self.index.by_description(variant, register),
            ) {
                return Ok(Some(found));
            }
        }

        for variant in &variants {
            let found = self.index.by_description_prefix(variant, register);
            if found.len() == 1 {
                debug!(raw = %raw, "Matched by unique description prefix");
                return Ok(found.into_iter().next());
            }
        }

        for variant in &variants {
            let found = self.index.fuzzy(variant, self.fuzzy_max_distance, register);
            let Some((distance, _)) = found.first() else {
                continue;
            };
            let distance = *distance;
            let closest: Vec<PartyReference> = found
                .into_iter()
                .take_while(|(d, _)| *d == distance)
                .map(|(_, reference)| reference)
                .collect();
            if let Some(found) = pick(raw, "fuzzy", closest) {
                debug!(raw = %raw, distance, party_id = %found.party_id, "Matched fuzzily");
                return Ok(Some(found));
            }
        }

        Ok(None)
    }
}

/// Takes the first candidate, which is the lowest party id (then lowest
/// description id). Several candidates are logged as a collision.
fn pick(raw: &str, strategy: &str, candidates: Vec<PartyReference>) -> Option<PartyReference> {
    if candidates.len() > 1 {
        let ids: Vec<&str> = candidates.iter().map(|c| c.party_id.as_str()).collect();
        warn!(
            raw = %raw,
            strategy,
            candidates = ?ids,
            "Ambiguous party match, taking the lowest id"
        );
    }
    candidates.into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::party_repo::{DescriptionRow, PartyRow};
    use crate::party::overrides::MemoryOverrideStore;
    use crate::party::resolver::TerminalResolver;

    fn party(id: &str, name: &str) -> PartyRow {
        PartyRow {
            party_id: id.to_string(),
            name: name.to_string(),
            register: "GB".to_string(),
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
        let mut ni = party("PP680", "Green Party");
        ni.register = "NI".to_string();
        PartyIndex::new(
            vec![
                party("PP52", "Conservative and Unionist Party"),
                party("PP53", "Labour Party"),
                party("PP63", "Green Party"),
                party("PP90", "Liberal Democrats"),
                party("PP85", "UK Independence Party (UKIP)"),
                party("ynmp-party:2", "Independent"),
                ni,
            ],
            vec![
                description(1, "PP52", "Conservative Party Candidate"),
                description(2, "PP53", "Labour and Co-operative Party"),
                description(3, "PP63", "Green Party - Say Yes to Nature"),
                description(4, "PP90", "Liberal Democrats Focus Team"),
            ],
        )
    }

    fn matcher() -> PartyMatcher {
        PartyMatcher::new(index(), Arc::new(MemoryOverrideStore::new()), None, 3)
    }

    #[test]
    fn test_variants() {
        assert_eq!(
            variants("the green party"),
            vec!["the green party", "green", "green party"]
        );
        assert_eq!(variants("tory"), vec!["tory", "conservative"]);
        assert_eq!(variants("lib dem"), vec!["lib dem", "liberal democrats"]);
    }

    #[test]
    fn test_layers() {
        struct Case {
            raw: &'static str,
            party_id: &'static str,
            description_id: Option<i64>,
        }
        const CASES: &[Case] = &[
            Case { raw: "PP53", party_id: "PP53", description_id: None },
            Case { raw: "Labour Party", party_id: "PP53", description_id: None },
            Case { raw: "labour", party_id: "PP53", description_id: None },
            Case { raw: "Lab", party_id: "PP53", description_id: None },
            Case { raw: "Tory", party_id: "PP52", description_id: Some(1) },
            Case { raw: "Lib Dem", party_id: "PP90", description_id: None },
            Case { raw: "Labour & Co-operative Party", party_id: "PP53", description_id: Some(2) },
            Case { raw: "Liberal Democrats Focus", party_id: "PP90", description_id: Some(4) },
            Case { raw: "UK Independence Party (UKIP)", party_id: "PP85", description_id: None },
            Case { raw: "Labour and Co-operativ Party", party_id: "PP53", description_id: Some(2) },
        ];

        let matcher = matcher();
        for case in CASES {
            let found = matcher.match_party(case.raw, Some("GB")).unwrap();
            assert_eq!(found.party_id, case.party_id, "raw: {:?}", case.raw);
            assert_eq!(found.description_id, case.description_id, "raw: {:?}", case.raw);
        }
    }

    #[test]
    fn test_the_green_party_matches_green_party_by_name() {
        let found = matcher().match_party("The Green Party", Some("GB")).unwrap();
        assert_eq!(found, PartyReference::party("PP63"));
    }

    #[test]
    fn test_ambiguous_name_takes_lowest_party_id() {
        let found = matcher().match_party("Green Party", None).unwrap();
        assert_eq!(found.party_id, "PP63");

        let found = matcher().match_party("Green Party", Some("NI")).unwrap();
        assert_eq!(found.party_id, "PP680");
    }

    #[test]
    fn test_override_wins_and_is_deterministic() {
        let overrides = Arc::new(MemoryOverrideStore::new());
        overrides
            .set("labour party", &PartyReference::party("PP63"))
            .unwrap();
        let matcher = PartyMatcher::new(index(), overrides, None, 3);

        for _ in 0..3 {
            assert_eq!(
                matcher.match_party("LABOUR  PARTY", None).unwrap(),
                PartyReference::party("PP63")
            );
        }
    }

    #[test]
    fn test_unmatched_without_resolver() {
        match matcher().match_party("Monster Raving Loony", None) {
            Err(MatchError::Unmatched(raw)) => assert_eq!(raw, "Monster Raving Loony"),
            other => panic!("Expected Unmatched, got {:?}", other),
        }
    }

    #[test]
    fn test_resolver_answer_is_saved_and_reused() {
        let overrides = Arc::new(MemoryOverrideStore::new());
        let resolver = Arc::new(TerminalResolver::new("PP85\n".as_bytes(), Vec::new()));
        let matcher = PartyMatcher::new(index(), overrides.clone(), Some(resolver), 3);

        let found = matcher.match_party("Brexit Alliance", None).unwrap();
        assert_eq!(found, PartyReference::party("PP85"));
        assert_eq!(
            overrides.get("brexit alliance").unwrap(),
            Some(PartyReference::party("PP85"))
        );

        // The resolver has no more input; the saved override answers.
        assert_eq!(
            matcher.match_party("brexit  alliance", None).unwrap(),
            PartyReference::party("PP85")
        );
    }

    #[test]
    fn test_resolver_answer_must_exist() {
        let resolver = Arc::new(TerminalResolver::new("PP999\n".as_bytes(), Vec::new()));
        let matcher =
            PartyMatcher::new(index(), Arc::new(MemoryOverrideStore::new()), Some(resolver), 3);
        assert!(matches!(
            matcher.match_party("Brexit Alliance", None),
            Err(MatchError::UnknownParty(id)) if id == "PP999"
        ));
    }
}
