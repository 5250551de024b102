//! Markdown data dictionary.

use super::{default_text, nullable_text};
use dbcatalog_core::Snapshot;
use std::fmt::Write;

/// Escapes text for a Markdown table cell.
fn cell(text: &str) -> String {
    text.replace('|', "\\|").replace(['\r', '\n'], " ")
}

/// Renders the whole snapshot as one Markdown document.
pub fn render_markdown(snapshot: &Snapshot, database: &str) -> String {
    let mut out = String::new();
    // Writing to a String cannot fail
    let _ = writeln!(out, "# Database: {}\n", database);

    for table in snapshot.tables() {
        let _ = writeln!(out, "## {}\n", table.name);
        if !table.comment.is_empty() {
            let _ = writeln!(out, "**Comment:** {}\n", cell(&table.comment));
        }
        out.push_str("| Column | Type | Nullable | Default | Comment |\n");
        out.push_str("|---|---|---|---|---|\n");
        for column in &table.columns {
            let _ = writeln!(
                out,
                "| {} | {} | {} | {} | {} |",
                cell(&column.name),
                cell(&column.declared_type),
                nullable_text(column.nullable),
                cell(default_text(column.default_literal.as_deref())),
                cell(&column.comment)
            );
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbcatalog_core::{Column, Table};

    #[test]
    fn test_render_markdown_layout() {
        let snapshot = Snapshot::from_tables([
            Table::new(
                "orders",
                vec![
                    Column::new("id", "int", false),
                    Column::new("status", "enum('a'|'b')", true)
                        .with_default("'a'")
                        .with_comment("line one\nline two"),
                ],
            )
            .with_comment("Purchase headers"),
            Table::new("empty", Vec::new()),
        ])
        .unwrap();

        let markdown = render_markdown(&snapshot, "shop");
        let expected = "# Database: shop\n\n\
             ## orders\n\n\
             **Comment:** Purchase headers\n\n\
             | Column | Type | Nullable | Default | Comment |\n\
             |---|---|---|---|---|\n\
             | id | int | NO | NULL |  |\n\
             | status | enum('a'\\|'b') | YES | 'a' | line one line two |\n\n\
             ## empty\n\n\
             | Column | Type | Nullable | Default | Comment |\n\
             |---|---|---|---|---|\n\n";
        assert_eq!(markdown, expected);
    }
}
