//! Recognition output: a flat list of blocks linked by id.
//!
//! `TABLE` blocks list their `CELL` children; each cell has a 1-based row and
//! column index and lists the `WORD` blocks it contains.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::table::{stitch, PageTable, Table};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisOutput {
    #[serde(alias = "Blocks", default)]
    pub blocks: Vec<Block>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Block {
    pub id: String,
    pub block_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_index: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_index: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_span: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_span: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relationships: Vec<Relationship>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Relationship {
    #[serde(rename = "Type")]
    pub kind: String,
    #[serde(default)]
    pub ids: Vec<String>,
}

impl Block {
    fn children(&self) -> impl Iterator<Item = &str> {
        self.relationships
            .iter()
            .filter(|r| r.kind == "CHILD")
            .flat_map(|r| r.ids.iter().map(String::as_str))
    }
}

impl AnalysisOutput {
    /// Every recognised table, tagged with its page and its position among
    /// the tables of that page.
    pub fn page_tables(&self) -> Vec<PageTable> {
        let by_id: HashMap<&str, &Block> =
            self.blocks.iter().map(|b| (b.id.as_str(), b)).collect();
        let mut per_page: HashMap<u32, usize> = HashMap::new();
        let mut tables = Vec::new();

        for block in self.blocks.iter().filter(|b| b.block_type == "TABLE") {
            let table = build_grid(block, &by_id);
            if table.is_empty() {
                continue;
            }
            let page = block.page.unwrap_or(1);
            let order = per_page.entry(page).or_insert(0);
            tables.push(PageTable {
                page,
                order: *order,
                table,
            });
            *order += 1;
        }

        tables
    }

    /// All tables stitched into one, with the same stop rules as the text
    /// layer.
    pub fn stitched_table(&self, stop_phrases: &[String]) -> Option<Table> {
        stitch(self.page_tables(), stop_phrases)
    }
}

/// Largest row index a page table may use.
const MAX_ROWS: u32 = 1000;
/// Largest column index a page table may use.
const MAX_COLUMNS: u32 = 100;

/// Lays the cells of a table out on a grid. Spanned positions stay blank.
///
/// Cells indexed outside `1..=MAX_ROWS` and `1..=MAX_COLUMNS` are dropped so
/// a malformed response cannot size the grid.
fn build_grid(table: &Block, by_id: &HashMap<&str, &Block>) -> Table {
    let mut cells: Vec<(u32, u32, &Block)> = Vec::new();
    for cell in table
        .children()
        .filter_map(|id| by_id.get(id).copied())
        .filter(|b| b.block_type == "CELL")
    {
        let (Some(row), Some(column)) = (cell.row_index, cell.column_index) else {
            continue;
        };
        if row == 0 || column == 0 {
            continue;
        }
        if row > MAX_ROWS || column > MAX_COLUMNS {
            warn!(cell = %cell.id, row, column, "Skipping cell outside table bounds");
            continue;
        }
        cells.push((row, column, cell));
    }

    let rows = cells.iter().map(|(r, _, _)| *r).max().unwrap_or(0) as usize;
    let columns = cells.iter().map(|(_, c, _)| *c).max().unwrap_or(0) as usize;
    let mut grid = vec![vec![String::new(); columns]; rows];

    for (row, column, cell) in cells {
        let words: Vec<&str> = cell
            .children()
            .filter_map(|id| by_id.get(id))
            .filter(|b| b.block_type == "WORD")
            .filter_map(|b| b.text.as_deref())
            .collect();
        grid[row as usize - 1][column as usize - 1] = words.join(" ");
    }

    Table::new(grid)
}
