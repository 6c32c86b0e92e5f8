//! Text-layer table extraction for a ballot's assigned pages.

use std::path::Path;

use tracing::{debug, info, info_span, warn};

use crate::config::{TableFlavor, TablesConfig};
use crate::db::table_repo::{self, ExtractedTableRow};
use crate::db::{ballot_repo, document_repo, now, Database, DatabaseError};
use crate::error::{ExtractionError, Result};
use crate::pages::PageAssignment;
use crate::pipeline::PipelineError;
use crate::processor::pdf::text_layer_unusable;
use crate::processor::PdfDocument;
use crate::table::{lattice, stitch, stream, PageTable, Table};

/// What the text layer yielded for a ballot.
#[derive(Debug)]
pub enum TableOutcome {
    /// A table was found and stored.
    Extracted(Table),
    /// The text layer is readable but holds no table.
    NoTables,
    /// The text layer can't be read; an image backend should take over.
    NeedsOcr(ExtractionError),
    Failed(ExtractionError),
}

impl TableOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            TableOutcome::Extracted(_) => "extracted",
            TableOutcome::NoTables => "no_tables",
            TableOutcome::NeedsOcr(_) => "needs_ocr",
            TableOutcome::Failed(_) => "failed",
        }
    }
}

/// Reads and stitches the tables on `pages`.
pub fn read_tables(
    pdf: &PdfDocument,
    pages: &[u32],
    flavor: TableFlavor,
    stop_phrases: &[String],
) -> std::result::Result<Option<Table>, ExtractionError> {
    let mut found = Vec::new();
    let mut readable = false;

    for &page in pages {
        let layout = pdf.page_layout(page)?;
        if !text_layer_unusable(&layout.text()) {
            readable = true;
        }
        let tables = match flavor {
            TableFlavor::Lattice => lattice::find_tables(&layout),
            TableFlavor::Stream => stream::find_tables(&layout),
        };
        debug!(page, tables = tables.len(), "Read page tables");
        found.extend(
            tables
                .into_iter()
                .enumerate()
                .map(|(order, table)| PageTable { page, order, table }),
        );
    }

    if !readable {
        return Err(ExtractionError::NoTextInDocument);
    }
    Ok(stitch(found, stop_phrases))
}

pub struct TableExtractor {
    db: Database,
    config: TablesConfig,
}

impl TableExtractor {
    pub fn new(db: Database, config: TablesConfig) -> Self {
        Self { db, config }
    }

    /// Extracts the candidate table for a ballot from its assigned pages and
    /// stores it, replacing any earlier table for the document.
    ///
    /// `flavor` overrides the configured flavor.
    pub fn extract_table(
        &self,
        ballot_paper_id: &str,
        flavor: Option<TableFlavor>,
    ) -> Result<TableOutcome> {
        let flavor = flavor.unwrap_or(self.config.flavor);
        ballot_repo::find_by_id(&self.db, ballot_paper_id)?
            .ok_or_else(|| PipelineError::BallotNotFound(ballot_paper_id.to_string()))?;
        let document = document_repo::find_for_ballot(&self.db, ballot_paper_id)?
            .ok_or_else(|| PipelineError::NoDocument(ballot_paper_id.to_string()))?;

        let _span = info_span!("extract_table",
            ballot_paper_id = %ballot_paper_id,
            document_id = %document.id,
            flavor = flavor.as_str(),
        )
        .entered();

        let assignment = match document.relevant_pages.as_deref() {
            Some(value) => value.parse::<PageAssignment>().map_err(|reason| {
                PipelineError::InvalidPageAssignment {
                    value: value.to_string(),
                    reason,
                }
            })?,
            None => return Ok(TableOutcome::Failed(ExtractionError::PagesNotAssigned)),
        };

        let pdf = match PdfDocument::load(Path::new(&document.file_path)) {
            Ok(pdf) => pdf,
            Err(e) if e.is_unreadable() => {
                warn!("Text layer unreadable: {}", e);
                return Ok(TableOutcome::NeedsOcr(e));
            }
            Err(e) => return Ok(TableOutcome::Failed(e)),
        };

        let pages = assignment.resolve(pdf.page_count());
        let outcome = match read_tables(&pdf, &pages, flavor, &self.config.stop_phrases) {
            Ok(Some(table)) => TableOutcome::Extracted(table),
            Ok(None) => TableOutcome::NoTables,
            Err(e) if e.is_unreadable() => TableOutcome::NeedsOcr(e),
            Err(e) => TableOutcome::Failed(e),
        };

        match &outcome {
            TableOutcome::Extracted(table) => {
                let rows_json = serde_json::to_string(table).map_err(|e| DatabaseError::Json {
                    column: "rows_json",
                    source: e,
                })?;
                let timestamp = now();
                table_repo::upsert(
                    &self.db,
                    &ExtractedTableRow {
                        document_id: document.id.clone(),
                        flavor: flavor.as_str().to_string(),
                        rows_json,
                        created_at: timestamp.clone(),
                        updated_at: timestamp,
                    },
                )?;
                info!(rows = table.rows.len(), "Stored extracted table");
            }
            _ => {
                table_repo::delete(&self.db, &document.id)?;
                info!(outcome = outcome.label(), "No table stored");
            }
        }

        Ok(outcome)
    }

    /// The stored table for a document, if any.
    pub fn stored_table(&self, document_id: &str) -> Result<Option<Table>> {
        stored_table(&self.db, document_id)
    }
}

/// The text-layer table stored for a document, if any.
pub fn stored_table(db: &Database, document_id: &str) -> Result<Option<Table>> {
    match table_repo::find(db, document_id)? {
        Some(row) => {
            let table = serde_json::from_str(&row.rows_json).map_err(|e| DatabaseError::Json {
                column: "rows_json",
                source: e,
            })?;
            Ok(Some(table))
        }
        None => Ok(None),
    }
}
