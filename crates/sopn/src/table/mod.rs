//! Candidate tables recovered from a document, and stitching of tables that
//! run over several pages.

pub mod extractor;
pub mod lattice;
pub mod stream;

use serde::{Deserialize, Serialize};

use crate::text::canonicalize;

pub use extractor::{TableExtractor, TableOutcome};

/// A grid of cell text. Rows may have different lengths.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Table {
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Builds a table, dropping rows whose cells are all blank.
    pub fn new(rows: Vec<Vec<String>>) -> Self {
        let rows = rows
            .into_iter()
            .filter(|row| row.iter().any(|cell| !cell.trim().is_empty()))
            .collect();
        Self { rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Canonical text of the first row.
    pub fn first_row_text(&self) -> String {
        self.rows
            .first()
            .map(|row| canonicalize(&row.join(" ")))
            .unwrap_or_default()
    }

    fn append(&mut self, other: Table) {
        self.rows.extend(other.rows);
    }
}

/// A table found on one page. `order` ranks tables top to bottom.
#[derive(Debug, Clone, PartialEq)]
pub struct PageTable {
    pub page: u32,
    pub order: usize,
    pub table: Table,
}

/// Joins tables in page order into one.
///
/// The first table is the base. Each later table is appended unless its
/// first row contains one of `stop_phrases`, which ends stitching: the
/// notice of poll that often follows a statement lists polling stations.
pub fn stitch(mut tables: Vec<PageTable>, stop_phrases: &[String]) -> Option<Table> {
    tables.sort_by_key(|t| (t.page, t.order));
    let stops: Vec<String> = stop_phrases
        .iter()
        .map(|p| canonicalize(p))
        .filter(|p| !p.is_empty())
        .collect();

    let mut tables = tables.into_iter();
    let mut stitched = tables.next()?.table;
    for next in tables {
        let first_row = next.table.first_row_text();
        if stops.iter().any(|stop| first_row.contains(stop.as_str())) {
            break;
        }
        stitched.append(next.table);
    }

    if stitched.is_empty() {
        None
    } else {
        Some(stitched)
    }
}
