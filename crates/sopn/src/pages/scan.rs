//! Heading-based page matching over the canonical text of a document.

use std::collections::HashSet;

use crate::error::ExtractionError;
use crate::text::{canonicalize, canonicalize_page};

/// Share of a page's words that count as its heading.
pub const HEADING_SIZE: f32 = 0.3;

/// Below this overlap with the document heading a page is a continuation.
pub const CONTINUATION_THRESHOLD: f32 = 0.5;

/// A first-page heading with fewer distinct words means no usable text.
const MIN_HEADING_WORDS: usize = 10;

/// One page of canonical text.
#[derive(Debug, Clone)]
pub struct ScannedPage {
    pub number: u32,
    heading: String,
    heading_words: HashSet<String>,
    claimed: bool,
    matched_label: Option<String>,
}

impl ScannedPage {
    pub fn new(number: u32, text: &str) -> Self {
        let canonical = canonicalize_page(text);
        let words: Vec<&str> = canonical.split_whitespace().collect();
        let threshold = (words.len() as f32 * HEADING_SIZE) as usize;
        let heading = words[..threshold].join(" ");
        let heading_words = heading.split(' ').filter(|w| !w.is_empty()).map(String::from).collect();

        Self {
            number,
            heading,
            heading_words,
            claimed: false,
            matched_label: None,
        }
    }

    pub fn heading(&self) -> &str {
        &self.heading
    }

    /// The first alternative of a canonical label (`a/b`) that appears in
    /// the heading as whole words.
    pub fn find_label(&self, label: &str) -> Option<String> {
        label
            .split('/')
            .map(canonicalize)
            .filter(|alt| !alt.is_empty())
            .find(|alt| phrase_end(&self.heading, alt).is_some())
    }
}

/// Byte offset just past the first whole-word occurrence of `phrase`.
fn phrase_end(haystack: &str, phrase: &str) -> Option<usize> {
    let padded = format!(" {} ", haystack);
    padded
        .find(&format!(" {} ", phrase))
        .map(|start| start + phrase.len())
}

/// The heading up to and including `label`, or all of it.
fn heading_through<'a>(heading: &'a str, label: Option<&str>) -> &'a str {
    label
        .and_then(|label| phrase_end(heading, label))
        .map_or(heading, |end| &heading[..end])
}

/// Every page of one document, with the pages already claimed by a ballot.
#[derive(Debug, Clone)]
pub struct DocumentScan {
    pages: Vec<ScannedPage>,
    document_heading: HashSet<String>,
}

impl DocumentScan {
    /// Builds a scan from per-page text, page 1 first.
    pub fn new<S: AsRef<str>>(page_texts: &[S]) -> Result<Self, ExtractionError> {
        let pages: Vec<ScannedPage> = page_texts
            .iter()
            .enumerate()
            .map(|(i, text)| ScannedPage::new(i as u32 + 1, text.as_ref()))
            .collect();

        let document_heading = pages
            .first()
            .map(|p| p.heading_words.clone())
            .unwrap_or_default();
        if document_heading.len() < MIN_HEADING_WORDS {
            return Err(ExtractionError::NoTextInDocument);
        }

        Ok(Self {
            pages,
            document_heading,
        })
    }

    pub fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    pub fn pages(&self) -> &[ScannedPage] {
        &self.pages
    }

    /// Finds and claims the pages belonging to `post_label`.
    ///
    /// The first unclaimed page whose heading names the label starts the
    /// range; continuation pages extend it. Returns an empty list when no
    /// page matches.
    pub fn claim(&mut self, post_label: &str) -> Result<Vec<u32>, ExtractionError> {
        let label = canonicalize(post_label);
        let mut matched: Vec<usize> = Vec::new();

        for idx in 0..self.pages.len() {
            if self.pages[idx].claimed {
                continue;
            }

            if let Some(&previous) = matched.last() {
                if !self.is_continuation(idx, previous) {
                    break;
                }
                if self.pages[idx].matched_label.is_none() {
                    self.pages[idx].matched_label = self.pages[previous].matched_label.clone();
                }
                matched.push(idx);
                continue;
            }

            if let Some(found) = self.pages[idx].find_label(&label) {
                self.pages[idx].matched_label = Some(found);
                matched.push(idx);
            }
        }

        let numbers: Vec<u32> = matched.iter().map(|&i| self.pages[i].number).collect();
        if numbers.windows(2).any(|w| w[1] != w[0] + 1) {
            for &i in &matched {
                self.pages[i].matched_label = None;
            }
            return Err(ExtractionError::MatchedPages(format!(
                "pages {:?} for '{}' are not consecutive",
                numbers, post_label
            )));
        }

        for &i in &matched {
            self.pages[i].claimed = true;
        }
        Ok(numbers)
    }

    fn is_continuation(&self, idx: usize, previous: usize) -> bool {
        let page = &self.pages[idx];
        if page.number == 1 {
            return false;
        }

        let shared = self
            .document_heading
            .intersection(&page.heading_words)
            .count();
        if (shared as f32) / (self.document_heading.len() as f32) < CONTINUATION_THRESHOLD {
            return true;
        }

        let prev = &self.pages[previous];
        let label = prev.matched_label.as_deref();
        heading_through(&prev.heading, label) == heading_through(&page.heading, label)
    }
}
