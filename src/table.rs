//! Elastic plain-text tables for terminal previews.

use std::{borrow::Cow, fmt::Write as _};

use crate::frame::Frame;

/// Cells wider than this are cut and end with `…`.
pub const MAX_CELL_WIDTH: usize = 40;

pub fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let headers = headers.iter().map(|h| clip(h)).collect::<Vec<_>>();
    let rows = rows
        .iter()
        .map(|row| row.iter().map(|cell| clip(cell)).collect::<Vec<_>>())
        .collect::<Vec<_>>();

    let mut widths = headers.iter().map(|h| display_width(h)).collect::<Vec<_>>();
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(display_width(cell));
        }
    }

    let mut output = String::new();
    let _ = writeln!(output, "{}", format_row(&headers, &widths));
    let rule = widths
        .iter()
        .map(|w| Cow::<str>::Owned("-".repeat((*w).max(3))))
        .collect::<Vec<_>>();
    let rule_widths = widths.iter().map(|w| (*w).max(3)).collect::<Vec<_>>();
    let _ = writeln!(output, "{}", format_row(&rule, &rule_widths));
    for row in &rows {
        let _ = writeln!(output, "{}", format_row(row, &widths));
    }
    output
}

pub fn print_table(headers: &[String], rows: &[Vec<String>]) {
    print!("{}", render_table(headers, rows));
}

/// Renders up to `limit` rows of `frame`, noting how many were left out.
pub fn render_frame(frame: &Frame, limit: Option<usize>) -> String {
    let mut rendered = render_table(&frame.headers(), &frame.display_rows(limit));
    let shown = limit.map_or(frame.row_count(), |l| l.min(frame.row_count()));
    if shown < frame.row_count() {
        let _ = writeln!(rendered, "({shown} of {} rows shown)", frame.row_count());
    }
    rendered
}

pub fn print_frame(frame: &Frame, limit: Option<usize>) {
    print!("{}", render_frame(frame, limit));
}

fn format_row(values: &[Cow<'_, str>], widths: &[usize]) -> String {
    let mut line = values
        .iter()
        .zip(widths)
        .map(|(value, width)| {
            let padding = width.saturating_sub(display_width(value));
            format!("{value}{}", " ".repeat(padding))
        })
        .collect::<Vec<_>>()
        .join("  ");
    line.truncate(line.trim_end().len());
    line
}

fn display_width(value: &str) -> usize {
    value.chars().count()
}

fn clip(value: &str) -> Cow<'_, str> {
    let flattened: Cow<'_, str> = if value.contains(['\n', '\r', '\t']) {
        Cow::Owned(value.replace(['\n', '\r', '\t'], " "))
    } else {
        Cow::Borrowed(value)
    };
    if display_width(&flattened) <= MAX_CELL_WIDTH {
        return flattened;
    }
    let mut cut = flattened.chars().take(MAX_CELL_WIDTH - 1).collect::<String>();
    cut.push('…');
    Cow::Owned(cut)
}
