//! Tables inferred from text alignment, for pages without ruling lines.
//!
//! Lines are grouped by baseline. The table spans from the first to the last
//! line holding two or more fragments; column bands come from merging the
//! x-extents of fragments on those lines.

use crate::processor::layout::{group_lines, PageLayout, TextFragment};
use crate::table::Table;

/// Horizontal gap below which two fragments share a column band.
const COLUMN_GAP: f32 = 1.0;

/// Merges fragment extents into ascending, non-overlapping column bands.
fn column_bands(fragments: &[&TextFragment]) -> Vec<(f32, f32)> {
    let mut extents: Vec<(f32, f32)> = fragments.iter().map(|f| (f.x, f.right())).collect();
    extents.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut bands: Vec<(f32, f32)> = Vec::new();
    for (start, end) in extents {
        match bands.last_mut() {
            Some(band) if start <= band.1 + COLUMN_GAP => band.1 = band.1.max(end),
            _ => bands.push((start, end)),
        }
    }
    bands
}

/// The band a fragment falls in: the last band starting at or before it.
fn column_of(bands: &[(f32, f32)], fragment: &TextFragment) -> usize {
    bands
        .iter()
        .rposition(|(start, _)| *start <= fragment.x + COLUMN_GAP)
        .unwrap_or(0)
}

/// The aligned table on the page, if any.
pub fn find_tables(layout: &PageLayout) -> Vec<Table> {
    let lines = group_lines(&layout.fragments);
    let multi: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, line)| line.len() >= 2)
        .map(|(i, _)| i)
        .collect();

    let (first, last) = match (multi.first(), multi.last()) {
        (Some(&first), Some(&last)) => (first, last),
        _ => return Vec::new(),
    };

    let aligned: Vec<&TextFragment> = multi
        .iter()
        .flat_map(|&i| lines[i].iter().copied())
        .collect();
    let bands = column_bands(&aligned);
    if bands.len() < 2 {
        return Vec::new();
    }

    let rows: Vec<Vec<String>> = lines[first..=last]
        .iter()
        .map(|line| {
            let mut cells = vec![String::new(); bands.len()];
            for fragment in line {
                let cell = &mut cells[column_of(&bands, fragment)];
                if !cell.is_empty() {
                    cell.push(' ');
                }
                cell.push_str(&fragment.text);
            }
            cells
        })
        .collect();

    let table = Table::new(rows);
    if table.is_empty() {
        Vec::new()
    } else {
        vec![table]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn place(items: &[(f32, f32, &str)]) -> PageLayout {
        let content: String = items
            .iter()
            .map(|(x, y, text)| format!("BT /F1 8 Tf {} {} Td ({}) Tj ET ", x, y, text))
            .collect();
        PageLayout::decode(content.as_bytes()).unwrap()
    }

    #[test]
    fn test_columns_from_alignment() {
        let layout = place(&[
            (40.0, 760.0, "Statement of Persons Nominated for Batley East"),
            (40.0, 700.0, "Surname"),
            (160.0, 700.0, "Other names"),
            (300.0, 700.0, "Description"),
            (40.0, 680.0, "SMITH"),
            (160.0, 680.0, "Alice"),
            (300.0, 680.0, "Labour Party"),
            (40.0, 660.0, "JONES"),
            (160.0, 660.0, "Bob"),
            (40.0, 600.0, "Dated 8 April"),
        ]);

        let tables = find_tables(&layout);

        assert_eq!(tables.len(), 1);
        assert_eq!(
            tables[0].rows,
            vec![
                vec!["Surname", "Other names", "Description"],
                vec!["SMITH", "Alice", "Labour Party"],
                vec!["JONES", "Bob", ""],
            ]
        );
    }

    #[test]
    fn test_wrapped_line_inside_table_kept() {
        let layout = place(&[
            (40.0, 700.0, "SMITH"),
            (160.0, 700.0, "Green Party"),
            (160.0, 690.0, "candidate"),
            (40.0, 680.0, "JONES"),
            (160.0, 680.0, "Labour"),
        ]);

        let tables = find_tables(&layout);
        assert_eq!(tables[0].rows[1], vec!["", "candidate"]);
    }

    #[test]
    fn test_plain_prose_has_no_table() {
        let layout = place(&[
            (40.0, 700.0, "Notice is hereby given that"),
            (40.0, 680.0, "the persons named below"),
        ]);
        assert!(find_tables(&layout).is_empty());
    }
}
