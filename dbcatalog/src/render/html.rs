//! HTML output: paginated static pages and the searchable single page.

use super::{default_text, nullable_text};
use askama::Template;
use dbcatalog_core::codec::encode_data_block;
use dbcatalog_core::{DbCatalogError, Result, Snapshot, Table};

/// One column row as displayed.
struct ColumnRow<'a> {
    name: &'a str,
    declared_type: &'a str,
    nullable: &'static str,
    default: &'a str,
    comment: &'a str,
}

/// One table section as displayed.
struct TableSection<'a> {
    name: &'a str,
    comment: &'a str,
    columns: Vec<ColumnRow<'a>>,
}

impl<'a> From<&'a Table> for TableSection<'a> {
    fn from(table: &'a Table) -> Self {
        Self {
            name: &table.name,
            comment: &table.comment,
            columns: table
                .columns
                .iter()
                .map(|c| ColumnRow {
                    name: &c.name,
                    declared_type: &c.declared_type,
                    nullable: nullable_text(c.nullable),
                    default: default_text(c.default_literal.as_deref()),
                    comment: &c.comment,
                })
                .collect(),
        }
    }
}

/// Link from the table of contents to one part.
struct PartLink {
    file: String,
    first: usize,
    last: usize,
}

#[derive(Template)]
#[template(path = "page.html")]
struct PageTemplate<'a> {
    database: &'a str,
    tables: Vec<TableSection<'a>>,
    /// Set when an index page links the parts together
    paginated: bool,
}

#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate<'a> {
    database: &'a str,
    parts: Vec<PartLink>,
    table_count: usize,
}

#[derive(Template)]
#[template(path = "searchable.html")]
struct SearchableTemplate<'a> {
    database: &'a str,
    table_count: usize,
    /// Pre-encoded `const schemaData = {...};` statement
    data_block: String,
}

fn render_template(template: &impl Template, what: &str) -> Result<String> {
    template
        .render()
        .map_err(|e| DbCatalogError::render(format!("Failed to render {}", what), e))
}

/// Renders the paginated pages as `(file name, contents)` pairs.
///
/// A single page is written as `index.html`; otherwise the parts are
/// `part1.html`, `part2.html`, ... and `index.html` lists them.
///
/// # Errors
/// Returns `Render` if a template fails
pub fn render_pages(
    snapshot: &Snapshot,
    database: &str,
    max_tables_per_file: usize,
) -> Result<Vec<(String, String)>> {
    let tables: Vec<&Table> = snapshot.tables().collect();
    let chunks: Vec<&[&Table]> = if tables.is_empty() {
        vec![&tables[..]]
    } else {
        tables.chunks(max_tables_per_file.max(1)).collect()
    };
    let paginated = chunks.len() > 1;

    let mut pages = Vec::with_capacity(chunks.len().saturating_add(1));
    let mut parts = Vec::new();
    let mut first = 1usize;
    for (number, chunk) in (1usize..).zip(&chunks) {
        let file = if paginated {
            format!("part{}.html", number)
        } else {
            "index.html".to_string()
        };
        let page = PageTemplate {
            database,
            tables: chunk.iter().map(|t| TableSection::from(*t)).collect(),
            paginated,
        };
        pages.push((file.clone(), render_template(&page, &file)?));

        let last = first.saturating_add(chunk.len()).saturating_sub(1);
        parts.push(PartLink { file, first, last });
        first = last.saturating_add(1);
    }

    if paginated {
        let index = IndexTemplate {
            database,
            parts,
            table_count: tables.len(),
        };
        pages.insert(0, ("index.html".to_string(), render_template(&index, "index.html")?));
    }
    Ok(pages)
}

/// Renders the searchable page with the embedded snapshot.
///
/// # Errors
/// Returns `Serialization` or `Render` on failure
pub fn render_searchable(snapshot: &Snapshot, database: &str) -> Result<String> {
    let page = SearchableTemplate {
        database,
        table_count: snapshot.len(),
        data_block: encode_data_block(snapshot)?,
    };
    render_template(&page, "searchable page")
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbcatalog_core::Column;

    fn snapshot(count: usize) -> Snapshot {
        Snapshot::from_tables((0..count).map(|i| {
            Table::new(
                format!("t{i}"),
                vec![Column::new("id", "int", false).with_comment("<key> & id")],
            )
        }))
        .unwrap()
    }

    #[test]
    fn test_single_page_is_index() {
        let pages = render_pages(&snapshot(2), "shop", 50).unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].0, "index.html");
        let html = &pages[0].1;
        assert!(html.contains("<title>Data Dictionary - shop</title>"));
        assert!(html.contains("t1"));
        assert!(html.contains("&lt;key&gt; &amp; id"));
        assert!(!html.contains("Back to contents"));
    }

    #[test]
    fn test_pagination_writes_index_and_parts() {
        let pages = render_pages(&snapshot(5), "shop", 2).unwrap();
        let names: Vec<&str> = pages.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, ["index.html", "part1.html", "part2.html", "part3.html"]);

        let index = &pages[0].1;
        assert!(index.contains("href=\"part3.html\""));
        assert!(index.contains("Tables 5 - 5"));
        assert!(pages[1].1.contains("Back to contents"));
        assert!(pages[3].1.contains("t4"));
        assert!(!pages[3].1.contains("t3"));
    }

    #[test]
    fn test_empty_snapshot_still_renders() {
        let pages = render_pages(&Snapshot::new(), "shop", 50).unwrap();
        assert_eq!(pages.len(), 1);
    }

    #[test]
    fn test_searchable_page_embeds_data_block_once() {
        let html = render_searchable(&snapshot(3), "shop").unwrap();
        assert_eq!(html.matches(dbcatalog_core::codec::SNAPSHOT_SENTINEL).count(), 1);
        assert!(html.contains("<h1>Data Dictionary - shop</h1>"));
        // The block is inserted verbatim, not HTML-escaped
        assert!(html.contains("{\"t0\":{\"comment\":\"\""));
    }
}
