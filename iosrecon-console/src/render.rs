//! Terminal rendering of display messages and tables.

use colored::Colorize;
use iosrecon::display::{Message, MessageKind};

/// Color a message for the terminal.
pub fn render_message(message: &Message) -> String {
    match message.kind {
        MessageKind::Plain => message.text.clone(),
        MessageKind::Error => message.text.red().to_string(),
        MessageKind::Success => message.text.green().to_string(),
        MessageKind::Emphasis => message.text.bold().to_string(),
    }
}

/// Borderless, left-aligned table with a dashed rule under the header.
///
/// Each column is at least as wide as its `(title, min_width)` minimum.
pub fn table(columns: &[(&str, usize)], rows: &[Vec<String>]) -> String {
    let widths: Vec<usize> = columns
        .iter()
        .enumerate()
        .map(|(i, (title, min))| {
            rows.iter()
                .filter_map(|r| r.get(i))
                .map(|c| c.chars().count())
                .chain([title.chars().count(), *min])
                .max()
                .unwrap_or(0)
        })
        .collect();

    let line = |cells: Vec<&str>| -> String {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("  {:<width$}", cell, width = *width))
            .collect::<String>()
            .trim_end()
            .to_string()
    };

    let mut out = Vec::with_capacity(rows.len() + 2);
    out.push(line(columns.iter().map(|(title, _)| *title).collect()));
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    out.push(line(rule.iter().map(String::as_str).collect()));
    for row in rows {
        out.push(line(row.iter().map(String::as_str).collect()));
    }
    out.join("\n")
}

/// Underlined section heading.
pub fn heading(title: &str) -> String {
    format!("\n{}\n{}\n", title, "=".repeat(title.chars().count()))
}
