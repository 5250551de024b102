//! CSV output, one file per table.

use super::{default_text, nullable_text};
use dbcatalog_core::Table;

const HEADER: [&str; 5] = ["Column", "Type", "Nullable", "Default", "Comment"];

/// Quotes a field when it contains a delimiter, quote or line break.
fn field(text: &str) -> String {
    if text.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", text.replace('"', "\"\""))
    } else {
        text.to_string()
    }
}

fn push_record(out: &mut String, fields: &[&str]) {
    let line: Vec<String> = fields.iter().map(|f| field(f)).collect();
    out.push_str(&line.join(","));
    out.push_str("\r\n");
}

/// Renders one table. A table comment, when present, is written as a
/// `Table Comment` row followed by an empty row before the columns.
pub fn render_table(table: &Table) -> String {
    let mut out = String::new();
    push_record(&mut out, &HEADER);

    if !table.comment.is_empty() {
        push_record(&mut out, &["Table Comment", "", "", "", &table.comment]);
        push_record(&mut out, &["", "", "", "", ""]);
    }

    for column in &table.columns {
        push_record(
            &mut out,
            &[
                &column.name,
                &column.declared_type,
                nullable_text(column.nullable),
                default_text(column.default_literal.as_deref()),
                &column.comment,
            ],
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbcatalog_core::Column;

    #[test]
    fn test_render_table_quotes_fields() {
        let table = Table::new(
            "orders",
            vec![
                Column::new("amount", "decimal(10,2)", false).with_default("0.00"),
                Column::new("note", "text", true).with_comment("Say \"hi\"\nthen leave"),
            ],
        )
        .with_comment("Purchase headers");

        assert_eq!(
            render_table(&table),
            "Column,Type,Nullable,Default,Comment\r\n\
             Table Comment,,,,Purchase headers\r\n\
             ,,,,\r\n\
             amount,\"decimal(10,2)\",NO,0.00,\r\n\
             note,text,YES,NULL,\"Say \"\"hi\"\"\nthen leave\"\r\n"
        );
    }

    #[test]
    fn test_render_table_without_comment() {
        let table = Table::new("t", vec![Column::new("id", "int", false)]);
        assert_eq!(
            render_table(&table),
            "Column,Type,Nullable,Default,Comment\r\nid,int,NO,NULL,\r\n"
        );
    }
}
