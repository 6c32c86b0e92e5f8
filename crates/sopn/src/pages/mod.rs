//! Page mapping: which pages of a published document belong to which ballot.

pub mod mapper;
pub mod scan;

use std::fmt;
use std::str::FromStr;

pub use mapper::PageMapper;
pub use scan::{DocumentScan, ScannedPage};

/// The pages of a document that belong to one ballot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageAssignment {
    All,
    /// 1-based, ascending, consecutive page numbers.
    Pages(Vec<u32>),
}

impl PageAssignment {
    /// Collapses a page list that covers the whole document into `All`.
    pub fn from_pages(pages: Vec<u32>, page_count: u32) -> Self {
        let covers_all = pages.len() as u32 == page_count
            && pages.iter().copied().eq(1..=page_count);
        if covers_all {
            PageAssignment::All
        } else {
            PageAssignment::Pages(pages)
        }
    }

    /// Concrete page numbers for a document of `page_count` pages.
    pub fn resolve(&self, page_count: u32) -> Vec<u32> {
        match self {
            PageAssignment::All => (1..=page_count).collect(),
            PageAssignment::Pages(pages) => pages.clone(),
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, PageAssignment::All)
    }
}

impl fmt::Display for PageAssignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageAssignment::All => f.write_str("all"),
            PageAssignment::Pages(pages) => {
                let joined = pages
                    .iter()
                    .map(|p| p.to_string())
                    .collect::<Vec<_>>()
                    .join(",");
                f.write_str(&joined)
            }
        }
    }
}

impl FromStr for PageAssignment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") {
            return Ok(PageAssignment::All);
        }
        let pages = s
            .split(',')
            .map(|p| {
                p.trim()
                    .parse::<u32>()
                    .ok()
                    .filter(|n| *n > 0)
                    .ok_or_else(|| format!("invalid page number '{}'", p.trim()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        if pages.is_empty() {
            return Err("empty page list".to_string());
        }
        Ok(PageAssignment::Pages(pages))
    }
}
