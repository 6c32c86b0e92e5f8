//! Assigns document pages to ballots and persists the result.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, info_span, warn};

use crate::db::{ballot_repo, document_repo, Database};
use crate::error::{ExtractionError, Result};
use crate::pages::{DocumentScan, PageAssignment};
use crate::pipeline::PipelineError;
use crate::processor::{to_pdf, PdfConverter, PdfDocument};
use crate::sanitize;

pub struct PageMapper {
    db: Database,
    converter: Arc<dyn PdfConverter>,
}

impl PageMapper {
    pub fn new(db: Database, converter: Arc<dyn PdfConverter>) -> Self {
        Self { db, converter }
    }

    /// Works out which pages of the ballot's document belong to it.
    ///
    /// A document that is the only one published at its URL is assigned
    /// `all` without being read unless `force_full_scan` is set. Otherwise
    /// the document is scanned and every ballot sharing the URL is mapped in
    /// the same pass.
    pub fn map_pages(&self, ballot_paper_id: &str, force_full_scan: bool) -> Result<PageAssignment> {
        let ballot = ballot_repo::find_by_id(&self.db, ballot_paper_id)?
            .ok_or_else(|| PipelineError::BallotNotFound(ballot_paper_id.to_string()))?;
        let mut document = document_repo::find_for_ballot(&self.db, ballot_paper_id)?
            .ok_or_else(|| PipelineError::NoDocument(ballot_paper_id.to_string()))?;

        let _span = info_span!("map_pages",
            ballot_paper_id = %ballot.ballot_paper_id,
            document_id = %document.id,
        )
        .entered();

        if document.file_kind != "pdf" {
            let converted = to_pdf(Path::new(&document.file_path), self.converter.as_ref())?;
            let converted = converted.display().to_string();
            document_repo::update_file(&self.db, &document.id, &converted, "pdf")?;
            document.file_path = converted;
            document.file_kind = "pdf".to_string();
        }

        let siblings = document_repo::find_by_source_url(&self.db, &document.source_url)?;
        let sole_document = siblings.len() <= 1;

        if sole_document && !force_full_scan {
            debug!("Only document for its source URL, assigning all pages");
            return self.assign(&document.id, PageAssignment::All);
        }

        let pdf = PdfDocument::load(Path::new(&document.file_path))?;
        if sole_document && pdf.page_count() == 1 {
            return self.assign(&document.id, PageAssignment::All);
        }

        let texts = pdf.all_page_text()?;
        let mut scan = DocumentScan::new(&texts)?;
        let page_count = scan.page_count();

        let mut labelled = Vec::with_capacity(siblings.len());
        for sibling in siblings {
            match ballot_repo::find_by_id(&self.db, &sibling.ballot_paper_id)? {
                Some(b) => labelled.push((sibling, b.post_label)),
                None => warn!(document_id = %sibling.id, "Sibling document has no ballot"),
            }
        }
        // Longest label first so "Foo North" is tried before "Foo". The sort
        // is stable, keeping the (created_at, id) order among equal lengths.
        labelled.sort_by_key(|(_, label)| std::cmp::Reverse(label.chars().count()));

        info!(
            source_url = %sanitize::redact_url(&document.source_url),
            documents = labelled.len(),
            pages = page_count,
            "Scanning document pages"
        );

        let mut requested: Option<std::result::Result<PageAssignment, ExtractionError>> = None;
        for (sibling, label) in &labelled {
            let outcome = match scan.claim(label) {
                Ok(pages) if pages.is_empty() => Err(ExtractionError::MatchedPages(format!(
                    "no page heading mentions '{}'",
                    label
                ))),
                Ok(pages) => Ok(PageAssignment::from_pages(pages, page_count)),
                Err(e) => Err(e),
            };

            match &outcome {
                Ok(assignment) => {
                    let changed = document_repo::set_relevant_pages(
                        &self.db,
                        &sibling.id,
                        Some(&assignment.to_string()),
                    )?;
                    if changed && sibling.id != document.id && sibling.relevant_pages.is_some() {
                        info!(
                            ballot_paper_id = %sibling.ballot_paper_id,
                            previous = sibling.relevant_pages.as_deref().unwrap_or_default(),
                            pages = %assignment,
                            "Sibling pages reassigned, its table and draft will be rebuilt"
                        );
                    }
                    debug!(
                        ballot_paper_id = %sibling.ballot_paper_id,
                        pages = %assignment,
                        "Mapped pages"
                    );
                }
                Err(e) if sibling.id != document.id => {
                    warn!(
                        ballot_paper_id = %sibling.ballot_paper_id,
                        "Sibling ballot left unmapped: {}",
                        e
                    );
                }
                Err(_) => {}
            }

            if sibling.id == document.id {
                requested = Some(outcome);
            }
        }

        match requested {
            Some(outcome) => Ok(outcome?),
            None => Err(ExtractionError::MatchedPages(format!(
                "document for '{}' was not scanned",
                ballot.post_label
            ))
            .into()),
        }
    }

    fn assign(&self, document_id: &str, assignment: PageAssignment) -> Result<PageAssignment> {
        document_repo::set_relevant_pages(&self.db, document_id, Some(&assignment.to_string()))?;
        Ok(assignment)
    }
}
