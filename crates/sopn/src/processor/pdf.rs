use std::collections::BTreeMap;
use std::path::Path;

use lopdf::{Document, ObjectId};
use tracing::warn;

use crate::error::ExtractionError;
use crate::processor::layout::PageLayout;
use crate::sanitize;

/// A loaded PDF with 1-based page access.
pub struct PdfDocument {
    doc: Document,
    pages: BTreeMap<u32, ObjectId>,
}

impl PdfDocument {
    pub fn load(path: &Path) -> Result<Self, ExtractionError> {
        let _span = tracing::info_span!("pdf.load", filename = %sanitize::redact_path(path))
            .entered();

        let bytes = std::fs::read(path).map_err(|e| ExtractionError::ReadDocument {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::load_mem(&bytes)
    }

    pub fn load_mem(bytes: &[u8]) -> Result<Self, ExtractionError> {
        let doc = Document::load_mem(bytes)
            .map_err(|e| ExtractionError::MalformedPdf(e.to_string()))?;

        if doc.is_encrypted() {
            return Err(ExtractionError::Encrypted);
        }

        let pages = doc.get_pages();
        if pages.is_empty() {
            return Err(ExtractionError::MalformedPdf("document has no pages".to_string()));
        }

        Ok(Self { doc, pages })
    }

    pub fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    fn page_id(&self, page: u32) -> Result<ObjectId, ExtractionError> {
        self.pages
            .get(&page)
            .copied()
            .ok_or(ExtractionError::PageOutOfRange {
                page,
                page_count: self.page_count(),
            })
    }

    /// Positioned text and ruling lines for a page.
    pub fn page_layout(&self, page: u32) -> Result<PageLayout, ExtractionError> {
        let page_id = self.page_id(page)?;
        let content = self
            .doc
            .get_page_content(page_id)
            .map_err(|e| ExtractionError::MalformedPdf(e.to_string()))?;
        PageLayout::decode(&content)
    }

    /// Reading-order text for a page.
    ///
    /// Falls back to lopdf's own extraction when the content stream yields
    /// nothing, which happens for text drawn through form XObjects.
    pub fn page_text(&self, page: u32) -> Result<String, ExtractionError> {
        let layout = match self.page_layout(page) {
            Ok(layout) => layout,
            Err(ExtractionError::PageOutOfRange { page, page_count }) => {
                return Err(ExtractionError::PageOutOfRange { page, page_count })
            }
            Err(e) => {
                warn!(page, "Failed to decode page content: {}", e);
                PageLayout::default()
            }
        };

        if !layout.is_empty() {
            return Ok(layout.text());
        }

        Ok(self.doc.extract_text(&[page]).unwrap_or_default())
    }

    /// Text of every page, in page order.
    pub fn all_page_text(&self) -> Result<Vec<String>, ExtractionError> {
        self.pages.keys().map(|&page| self.page_text(page)).collect()
    }
}

/// Pattern for Identity-H Unimplemented errors (common with CID fonts).
const IDENTITY_H_PATTERN: &str = "?Identity-H Unimplemented?";

/// Minimum number of characters required before applying alphanumeric ratio check.
const MIN_TOTAL_CHARS: usize = 50;

/// Minimum percentage of alphanumeric characters required for text to be considered valid.
const MIN_ALPHANUMERIC_PERCENT: usize = 10;

/// True when extracted text is empty or too garbled to trust.
///
/// Used to decide that an image-based backend has to take over.
pub fn text_layer_unusable(text: &str) -> bool {
    let trimmed = text.trim();

    if trimmed.is_empty() {
        return true;
    }

    let cleaned = trimmed
        .replace(IDENTITY_H_PATTERN, "")
        .replace(['\n', ' '], "");

    if cleaned.is_empty() {
        return true;
    }

    let total_chars = trimmed.chars().count();
    let alphanumeric_chars = trimmed.chars().filter(|c| c.is_alphanumeric()).count();

    total_chars > MIN_TOTAL_CHARS
        && alphanumeric_chars * 100 < total_chars * MIN_ALPHANUMERIC_PERCENT
}
