//! Candidate draft records from an extracted table.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn};

use super::error::ParseError;
use super::fields::{self, INDEPENDENT_VALUES, PARTY_MEMBERSHIP_FIELD};
use super::names::{clean_description, clean_name};
use crate::config::{MatchingConfig, TablesConfig};
use crate::db::ballot_repo::{self, BallotRow};
use crate::db::document_repo::{self, DocumentRow};
use crate::db::draft_repo::{self, DraftSetRow, PARSED_PDF};
use crate::db::{now, Database, DatabaseError};
use crate::error::Result;
use crate::ocr::{job_table, OcrTable};
use crate::party::{MatchError, PartyMatcher};
use crate::pipeline::PipelineError;
use crate::table::extractor::stored_table;
use crate::table::Table;
use crate::text::{canonicalize, canonicalize_with, Options};

/// Which backend produced the table a draft was parsed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    TextLayer,
    Ocr,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::TextLayer => "text_layer",
            Backend::Ocr => "ocr",
        }
    }
}

/// The party of a draft record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DraftParty {
    Matched {
        party_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description_id: Option<i64>,
    },
    /// Nothing matched; the cleaned text is kept for a reviewer.
    Unmatched { raw_text: String },
}

impl DraftParty {
    pub fn party_id(&self) -> Option<&str> {
        match self {
            DraftParty::Matched { party_id, .. } => Some(party_id),
            DraftParty::Unmatched { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateDraftRecord {
    pub name: String,
    pub party: DraftParty,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub previous_party_affiliations: Vec<String>,
}

/// Result of parsing a ballot.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDraft {
    pub backend: Backend,
    pub records: Vec<CandidateDraftRecord>,
    /// False when a draft from another source was kept instead.
    pub stored: bool,
}

/// Columns named by a header row.
#[derive(Debug)]
struct Columns {
    header: Vec<String>,
    names: Vec<usize>,
    description: usize,
    membership: Option<usize>,
}

fn header_cell(cell: &str) -> String {
    canonicalize_with(
        cell,
        Options {
            drop_parentheticals: true,
        },
    )
}

fn filled_cells(row: &[String]) -> usize {
    row.iter().filter(|cell| !cell.trim().is_empty()).count()
}

/// Rows before the first one that mentions a polling station.
fn before_polling_stations(rows: &[Vec<String>]) -> &[Vec<String>] {
    let end = rows
        .iter()
        .position(|row| {
            row.iter()
                .any(|cell| canonicalize(cell).contains("polling station"))
        })
        .unwrap_or(rows.len());
    &rows[..end]
}

/// Index of the first row that is about as full as an average row and
/// mentions a name heading.
fn find_header(rows: &[Vec<String>]) -> Option<usize> {
    if rows.is_empty() {
        return None;
    }
    let total: usize = rows.iter().map(|row| filled_cells(row)).sum();
    let threshold = total as f64 / rows.len() as f64 - 3.0;

    rows.iter().position(|row| {
        filled_cells(row) as f64 >= threshold
            && fields::mentions_name_field(&header_cell(&row.join(" ")))
    })
}

fn columns(header_row: &[String], welsh_run: bool) -> std::result::Result<Columns, ParseError> {
    let header: Vec<String> = header_row.iter().map(|cell| header_cell(cell)).collect();

    let mut names: Vec<usize> = (0..header.len())
        .filter(|&i| fields::is_name_field(&header[i]))
        .collect();
    if names.is_empty() {
        return Err(ParseError::NoNameColumn(header));
    }
    if let Some(pos) = names.iter().position(|&i| fields::is_last_name_field(&header[i])) {
        let surname = names.remove(pos);
        names.push(surname);
    }

    let description = header
        .iter()
        .position(|cell| fields::is_description_field(cell))
        .ok_or_else(|| ParseError::NoDescriptionColumn(header.clone()))?;

    let membership = if welsh_run {
        header.iter().position(|cell| cell == PARTY_MEMBERSHIP_FIELD)
    } else {
        None
    };

    Ok(Columns {
        header,
        names,
        description,
        membership,
    })
}

fn is_independent(description: &str) -> bool {
    INDEPENDENT_VALUES.contains(&canonicalize(description).as_str())
}

/// Turns a candidate table into draft records for `ballot`.
///
/// Parties are matched within the ballot's register. A party nothing
/// matches is kept as [`DraftParty::Unmatched`]; any other matcher failure
/// fails the table.
pub fn parse_table(
    table: &Table,
    ballot: &BallotRow,
    matcher: &PartyMatcher,
    independent_party_id: &str,
) -> Result<Vec<CandidateDraftRecord>> {
    let rows = before_polling_stations(&table.rows);
    let header_index = find_header(rows).ok_or(ParseError::NoHeader)?;
    let columns = columns(&rows[header_index], ballot.is_welsh_run)?;
    let register = Some(ballot.party_register.as_str());

    let mut records = Vec::new();
    for row in &rows[header_index + 1..] {
        let cell = |i: usize| row.get(i).map(String::as_str).unwrap_or("");

        // Headers repeat at the foot of some tables.
        let cleaned: Vec<String> = row.iter().map(|c| header_cell(c)).collect();
        if cleaned == columns.header {
            continue;
        }

        let raw_name: Vec<&str> = columns.names.iter().map(|&i| cell(i)).collect();
        let name = clean_name(&raw_name.join(" "));
        if name.is_empty() {
            continue;
        }

        let description = clean_description(cell(columns.description));
        let party = if is_independent(&description) {
            DraftParty::Matched {
                party_id: independent_party_id.to_string(),
                description_id: None,
            }
        } else {
            match matcher.match_party(&description, register) {
                Ok(found) => DraftParty::Matched {
                    party_id: found.party_id,
                    description_id: found.description_id,
                },
                Err(MatchError::Unmatched(_)) => {
                    warn!(
                        ballot_paper_id = %ballot.ballot_paper_id,
                        candidate = %name,
                        "No party matches '{}'",
                        description
                    );
                    DraftParty::Unmatched {
                        raw_text: description.clone(),
                    }
                }
                Err(e) => return Err(e.into()),
            }
        };

        let mut previous_party_affiliations = Vec::new();
        if let Some(i) = columns.membership {
            let membership = clean_description(cell(i));
            if !is_independent(&membership) {
                match matcher.match_automatic(&membership, register)? {
                    Some(found) => previous_party_affiliations.push(found.party_id),
                    None => debug!(candidate = %name, "Previous party '{}' not matched", membership),
                }
            }
        }

        records.push(CandidateDraftRecord {
            name,
            party,
            description: (!description.is_empty()).then_some(description),
            previous_party_affiliations,
        });
    }

    Ok(records)
}

/// Parses stored tables into draft sets.
pub struct DraftParser {
    db: Database,
    matcher: PartyMatcher,
    independent_party_id: String,
    stop_phrases: Vec<String>,
}

impl DraftParser {
    pub fn new(
        db: Database,
        matcher: PartyMatcher,
        matching: &MatchingConfig,
        tables: &TablesConfig,
    ) -> Self {
        Self {
            db,
            matcher,
            independent_party_id: matching.independent_party_id.clone(),
            stop_phrases: tables.stop_phrases.clone(),
        }
    }

    pub fn matcher(&self) -> &PartyMatcher {
        &self.matcher
    }

    /// Parses the ballot's table and replaces its draft set.
    ///
    /// The text-layer table is preferred; a succeeded OCR job is used when
    /// there is none. A draft entered from another source is left alone.
    pub fn parse(&self, ballot_paper_id: &str) -> Result<ParsedDraft> {
        let ballot = ballot_repo::find_by_id(&self.db, ballot_paper_id)?
            .ok_or_else(|| PipelineError::BallotNotFound(ballot_paper_id.to_string()))?;
        if ballot.candidates_locked {
            return Err(ParseError::Locked(ballot_paper_id.to_string()).into());
        }
        let document = document_repo::find_for_ballot(&self.db, ballot_paper_id)?
            .ok_or_else(|| PipelineError::NoDocument(ballot_paper_id.to_string()))?;

        let _span = info_span!("parse",
            ballot_paper_id = %ballot_paper_id,
            document_id = %document.id,
        )
        .entered();

        if document.relevant_pages.is_none() {
            return Err(ParseError::PagesNotAssigned(ballot_paper_id.to_string()).into());
        }

        let (backend, table) = self.load_table(&document)?;
        let records = parse_table(&table, &ballot, &self.matcher, &self.independent_party_id)?;

        if let Some(existing) = draft_repo::find(&self.db, ballot_paper_id)? {
            if existing.source_type != PARSED_PDF {
                info!(
                    source_type = %existing.source_type,
                    "Keeping draft entered from another source"
                );
                return Ok(ParsedDraft {
                    backend,
                    records,
                    stored: false,
                });
            }
        }

        let records_json = serde_json::to_string(&records).map_err(|e| DatabaseError::Json {
            column: "records_json",
            source: e,
        })?;
        draft_repo::replace(
            &self.db,
            &DraftSetRow {
                ballot_paper_id: ballot_paper_id.to_string(),
                document_id: Some(document.id.clone()),
                backend: Some(backend.as_str().to_string()),
                source_type: PARSED_PDF.to_string(),
                source: format!("Parsed from {}", document.source_url),
                records_json,
                updated_at: now(),
            },
        )?;
        info!(
            records = records.len(),
            backend = backend.as_str(),
            "Stored draft records"
        );

        Ok(ParsedDraft {
            backend,
            records,
            stored: true,
        })
    }

    fn load_table(&self, document: &DocumentRow) -> Result<(Backend, Table)> {
        if let Some(table) = stored_table(&self.db, &document.id)? {
            return Ok((Backend::TextLayer, table));
        }

        let ballot_paper_id = document.ballot_paper_id.clone();
        match job_table(&self.db, &document.id, &self.stop_phrases)? {
            OcrTable::Ready(Some(table)) => Ok((Backend::Ocr, table)),
            OcrTable::Ready(None) | OcrTable::NoJob => {
                Err(ParseError::NoTable(ballot_paper_id).into())
            }
            OcrTable::Pending => Err(ParseError::AwaitingOcr(ballot_paper_id).into()),
            OcrTable::Failed(message) => Err(ParseError::OcrFailed {
                ballot_paper_id,
                message: message.unwrap_or_else(|| "unknown error".to_string()),
            }
            .into()),
        }
    }
}

/// Draft records stored for a ballot.
pub fn stored_records(
    db: &Database,
    ballot_paper_id: &str,
) -> Result<Option<(DraftSetRow, Vec<CandidateDraftRecord>)>> {
    let Some(draft) = draft_repo::find(db, ballot_paper_id)? else {
        return Ok(None);
    };
    let records = serde_json::from_str(&draft.records_json).map_err(|e| DatabaseError::Json {
        column: "records_json",
        source: e,
    })?;
    Ok(Some((draft, records)))
}
