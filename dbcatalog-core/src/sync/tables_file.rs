//! Tables file: one table name per line.
//!
//! Blank lines and lines starting with `#` are ignored, surrounding
//! whitespace is trimmed and repeated names collapse to their first
//! occurrence.

use crate::error::{DbCatalogError, Result};
use std::collections::HashSet;
use std::path::Path;

/// Parses tables file contents.
pub fn parse_tables(text: &str) -> Vec<String> {
    dedupe(
        text.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string),
    )
}

/// Removes repeated and blank names, keeping first-occurrence order.
pub fn dedupe<I>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();
    names
        .into_iter()
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty() && seen.insert(name.clone()))
        .collect()
}

/// Reads and parses a tables file. A missing file yields an empty list.
///
/// # Errors
/// Returns `Io` if the file exists but cannot be read
pub async fn read_tables_file(path: &Path) -> Result<Vec<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => {
            let tables = parse_tables(&text);
            tracing::debug!("Read {} tables from {}", tables.len(), path.display());
            Ok(tables)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!("Tables file {} does not exist", path.display());
            Ok(Vec::new())
        }
        Err(e) => Err(DbCatalogError::io(
            format!("Failed to read tables file {}", path.display()),
            e,
        )),
    }
}
