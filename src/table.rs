use std::{borrow::Cow, fmt::Write as _};

use crate::data::parse_numeric;

/// Cells wider than this are cut and end in `~`.
pub const MAX_CELL_WIDTH: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Align {
    Left,
    Right,
}

/// Renders `rows` under `headers`. Columns whose non-empty cells are all
/// numeric are right-aligned.
pub fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let columns = headers.len();
    let cell = |row: &[String], idx: usize| -> String {
        clip(&sanitize_cell(row.get(idx).map(String::as_str).unwrap_or_default())).into_owned()
    };

    let header_cells: Vec<String> = headers.iter().map(|h| clip(&sanitize_cell(h)).into_owned()).collect();
    let body: Vec<Vec<String>> = rows
        .iter()
        .map(|row| (0..columns).map(|idx| cell(row, idx)).collect())
        .collect();

    let mut widths: Vec<usize> = header_cells.iter().map(|h| h.chars().count().max(1)).collect();
    for row in &body {
        for (idx, value) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(value.chars().count());
        }
    }
    let aligns: Vec<Align> = (0..columns)
        .map(|idx| {
            let mut values = body.iter().map(|r| r[idx].as_str()).filter(|v| !v.is_empty()).peekable();
            if values.peek().is_some() && values.all(|v| parse_numeric(v).is_some()) {
                Align::Right
            } else {
                Align::Left
            }
        })
        .collect();

    let mut output = String::new();
    let _ = writeln!(output, "{}", format_row(&header_cells, &widths, &aligns));
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    let _ = writeln!(output, "{}", format_row(&rule, &widths, &aligns));
    for row in &body {
        let _ = writeln!(output, "{}", format_row(row, &widths, &aligns));
    }
    output
}

fn format_row(values: &[String], widths: &[usize], aligns: &[Align]) -> String {
    let line = values
        .iter()
        .zip(widths)
        .zip(aligns)
        .map(|((value, width), align)| match align {
            Align::Left => format!("{value:<width$}"),
            Align::Right => format!("{value:>width$}"),
        })
        .collect::<Vec<_>>()
        .join("  ");
    line.trim_end().to_string()
}

fn clip(value: &str) -> Cow<'_, str> {
    if value.chars().count() <= MAX_CELL_WIDTH {
        return Cow::Borrowed(value);
    }
    let mut clipped: String = value.chars().take(MAX_CELL_WIDTH - 1).collect();
    clipped.push('~');
    Cow::Owned(clipped)
}

fn sanitize_cell(value: &str) -> Cow<'_, str> {
    if value.contains(['\n', '\r', '\t']) {
        Cow::Owned(value.replace(['\n', '\r', '\t'], " "))
    } else {
        Cow::Borrowed(value)
    }
}
