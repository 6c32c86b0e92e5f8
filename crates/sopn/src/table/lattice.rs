//! Tables bounded by ruling lines.
//!
//! Horizontal and vertical rules that touch form a grid. Each grid with at
//! least two of each becomes a table; text is placed in the cell containing
//! its anchor point.

use crate::processor::layout::{group_lines, PageLayout, Rule, TextFragment};
use crate::table::Table;

/// Rules this close are treated as touching or collinear.
const SNAP_TOLERANCE: f32 = 2.0;

/// Anchor offset into a fragment from its left edge.
const ANCHOR_INSET: f32 = 1.0;

#[derive(Debug, Clone, Copy)]
struct Segment {
    horizontal: bool,
    /// y for horizontal rules, x for vertical ones.
    at: f32,
    from: f32,
    to: f32,
}

impl Segment {
    fn from_rule(rule: &Rule) -> Self {
        match *rule {
            Rule::Horizontal { y, x0, x1 } => Segment {
                horizontal: true,
                at: y,
                from: x0,
                to: x1,
            },
            Rule::Vertical { x, y0, y1 } => Segment {
                horizontal: false,
                at: x,
                from: y0,
                to: y1,
            },
        }
    }

    fn touches(&self, other: &Segment) -> bool {
        if self.horizontal == other.horizontal {
            return (self.at - other.at).abs() <= SNAP_TOLERANCE
                && self.from <= other.to + SNAP_TOLERANCE
                && other.from <= self.to + SNAP_TOLERANCE;
        }
        other.at >= self.from - SNAP_TOLERANCE
            && other.at <= self.to + SNAP_TOLERANCE
            && self.at >= other.from - SNAP_TOLERANCE
            && self.at <= other.to + SNAP_TOLERANCE
    }
}

fn find_root(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

/// Groups touching segments.
fn connected_groups(segments: &[Segment]) -> Vec<Vec<Segment>> {
    let mut parent: Vec<usize> = (0..segments.len()).collect();
    for i in 0..segments.len() {
        for j in (i + 1)..segments.len() {
            if segments[i].touches(&segments[j]) {
                let a = find_root(&mut parent, i);
                let b = find_root(&mut parent, j);
                if a != b {
                    parent[b] = a;
                }
            }
        }
    }

    let mut groups: Vec<(usize, Vec<Segment>)> = Vec::new();
    for (i, segment) in segments.iter().enumerate() {
        let root = find_root(&mut parent, i);
        match groups.iter_mut().find(|(r, _)| *r == root) {
            Some((_, group)) => group.push(*segment),
            None => groups.push((root, vec![*segment])),
        }
    }
    groups.into_iter().map(|(_, group)| group).collect()
}

/// Distinct positions, merging values within the snap tolerance.
fn distinct_positions(mut values: Vec<f32>) -> Vec<f32> {
    values.sort_by(|a, b| a.total_cmp(b));
    let mut out: Vec<f32> = Vec::new();
    for v in values {
        match out.last() {
            Some(last) if v - last <= SNAP_TOLERANCE => {}
            _ => out.push(v),
        }
    }
    out
}

/// Index of the band `[bounds[i], bounds[i + 1])` containing `value`.
fn band(bounds: &[f32], value: f32) -> Option<usize> {
    bounds.windows(2).position(|w| value >= w[0] && value < w[1])
}

struct Grid {
    /// Ascending x boundaries.
    columns: Vec<f32>,
    /// Ascending y boundaries; rows are read top (highest y) first.
    rows: Vec<f32>,
}

impl Grid {
    fn from_group(group: &[Segment]) -> Option<Self> {
        let horizontal: Vec<f32> = group.iter().filter(|s| s.horizontal).map(|s| s.at).collect();
        let vertical: Vec<f32> = group.iter().filter(|s| !s.horizontal).map(|s| s.at).collect();
        let rows = distinct_positions(horizontal);
        let columns = distinct_positions(vertical);
        if rows.len() < 2 || columns.len() < 2 {
            return None;
        }
        Some(Self { columns, rows })
    }

    fn top(&self) -> f32 {
        self.rows.last().copied().unwrap_or_default()
    }

    /// (row, column) of a fragment, row 0 being the top row.
    fn cell_of(&self, fragment: &TextFragment) -> Option<(usize, usize)> {
        let anchor_x = fragment.x + ANCHOR_INSET.min(fragment.width / 2.0);
        let column = band(&self.columns, anchor_x)?;
        let from_bottom = band(&self.rows, fragment.mid_y())?;
        let row = self.rows.len() - 2 - from_bottom;
        Some((row, column))
    }

    fn fill(&self, fragments: &[&TextFragment]) -> Table {
        let row_count = self.rows.len() - 1;
        let column_count = self.columns.len() - 1;
        let mut cells: Vec<Vec<Vec<TextFragment>>> = vec![vec![Vec::new(); column_count]; row_count];
        for fragment in fragments {
            if let Some((row, column)) = self.cell_of(fragment) {
                cells[row][column].push((*fragment).clone());
            }
        }

        let rows = cells
            .into_iter()
            .map(|row| row.iter().map(|cell| cell_text(cell)).collect())
            .collect();
        Table::new(rows)
    }
}

/// Text of one cell: lines top to bottom joined by newlines.
pub(crate) fn cell_text(fragments: &[TextFragment]) -> String {
    group_lines(fragments)
        .iter()
        .map(|line| {
            line.iter()
                .map(|f| f.text.as_str())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Every ruled table on the page, top first.
pub fn find_tables(layout: &PageLayout) -> Vec<Table> {
    let segments: Vec<Segment> = layout.rules.iter().map(Segment::from_rule).collect();
    let mut grids: Vec<Grid> = connected_groups(&segments)
        .iter()
        .filter_map(|group| Grid::from_group(group))
        .collect();
    grids.sort_by(|a, b| b.top().total_cmp(&a.top()));

    let fragments: Vec<&TextFragment> = layout.fragments.iter().collect();
    grids
        .iter()
        .map(|grid| grid.fill(&fragments))
        .filter(|table| !table.is_empty())
        .collect()
}
