//! Excel output: one worksheet per table, split across workbooks of at most
//! `max_tables_per_file` tables.

use super::{default_text, nullable_text};
use dbcatalog_core::{DbCatalogError, Result, Snapshot, Table};
use rust_xlsxwriter::{Format, Workbook, Worksheet};
use std::collections::HashSet;

const HEADER: [&str; 5] = ["Column", "Type", "Nullable", "Default", "Comment"];

/// Excel rejects longer worksheet names.
const MAX_SHEET_NAME: usize = 31;

/// Renders the workbooks for `snapshot`.
///
/// A single workbook is named `<filename>.xlsx`; when the tables need more
/// than one, they are `<filename>_part1.xlsx`, `<filename>_part2.xlsx`, ...
///
/// # Errors
/// Returns `Render` if a workbook cannot be assembled
pub fn render_workbooks(
    snapshot: &Snapshot,
    filename: &str,
    max_tables_per_file: usize,
) -> Result<Vec<(String, Vec<u8>)>> {
    let tables: Vec<&Table> = snapshot.tables().collect();
    let chunks: Vec<&[&Table]> = if tables.is_empty() {
        vec![&tables[..]]
    } else {
        tables.chunks(max_tables_per_file.max(1)).collect()
    };

    let split = chunks.len() > 1;
    (1usize..)
        .zip(chunks)
        .map(|(part, chunk)| {
            let name = if split {
                format!("{}_part{}.xlsx", filename, part)
            } else {
                format!("{}.xlsx", filename)
            };
            tracing::debug!("Building {} with {} tables", name, chunk.len());
            Ok((name, workbook(chunk)?))
        })
        .collect()
}

fn workbook(tables: &[&Table]) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let header = Format::new().set_bold();
    let mut names = SheetNames::default();

    if tables.is_empty() {
        write_sheet(workbook.add_worksheet(), &header, &[]).map_err(excel_error)?;
    }
    for table in tables {
        let sheet = workbook.add_worksheet();
        sheet.set_name(names.assign(&table.name)).map_err(excel_error)?;
        write_sheet(sheet, &header, &rows(table)).map_err(excel_error)?;
    }

    workbook.save_to_buffer().map_err(excel_error)
}

fn excel_error(e: rust_xlsxwriter::XlsxError) -> DbCatalogError {
    DbCatalogError::render("Failed to build Excel workbook", e)
}

fn write_sheet(
    sheet: &mut Worksheet,
    header: &Format,
    rows: &[[&str; 5]],
) -> std::result::Result<(), rust_xlsxwriter::XlsxError> {
    for (col, title) in (0u16..).zip(HEADER) {
        sheet.write_string_with_format(0, col, title, header)?;
    }
    for (row, cells) in (1u32..).zip(rows) {
        for (col, text) in (0u16..).zip(cells) {
            if !text.is_empty() {
                sheet.write_string(row, col, *text)?;
            }
        }
    }
    sheet.autofit();
    Ok(())
}

/// Sheet rows below the header. A table comment, when present, is a
/// `Table Comment` row followed by an empty row.
fn rows(table: &Table) -> Vec<[&str; 5]> {
    let mut rows = Vec::with_capacity(table.columns.len().saturating_add(2));
    if !table.comment.is_empty() {
        rows.push(["Table Comment", "", "", "", table.comment.as_str()]);
        rows.push([""; 5]);
    }
    rows.extend(table.columns.iter().map(|c| {
        [
            c.name.as_str(),
            c.declared_type.as_str(),
            nullable_text(c.nullable),
            default_text(c.default_literal.as_deref()),
            c.comment.as_str(),
        ]
    }));
    rows
}

/// Worksheet names handed out within one workbook.
#[derive(Debug, Default)]
struct SheetNames {
    used: HashSet<String>,
}

impl SheetNames {
    /// Turns a table name into a worksheet name Excel accepts, unique
    /// within the workbook ignoring case.
    fn assign(&mut self, table: &str) -> String {
        let cleaned: String = table
            .chars()
            .map(|c| if matches!(c, '[' | ']' | ':' | '*' | '?' | '/' | '\\') { '_' } else { c })
            .collect();
        let cleaned = cleaned.trim_matches('\'');
        let base = if cleaned.is_empty() { "table" } else { cleaned };

        let mut name = truncate(base, MAX_SHEET_NAME);
        if name.len() < base.len() {
            tracing::warn!(
                "Table name '{}' truncated to '{}' for Excel compatibility",
                table,
                name
            );
        }

        let mut suffix = 1usize;
        while name.eq_ignore_ascii_case("history") || self.used.contains(&name.to_lowercase()) {
            suffix = suffix.saturating_add(1);
            let tag = format!("~{}", suffix);
            let room = MAX_SHEET_NAME.saturating_sub(tag.len());
            name = format!("{}{}", truncate(base, room), tag);
        }
        self.used.insert(name.to_lowercase());
        name
    }
}

/// The first `max` characters of `text`.
fn truncate(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
