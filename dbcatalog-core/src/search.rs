//! Keyword search over a snapshot.
//!
//! Matching is a case-insensitive substring test. Each [`SearchMode`]
//! authorizes a set of fields; a table is kept when any authorized field
//! matches, and evaluation stops at the first match.

use crate::models::{SearchMode, Snapshot, Table};

impl SearchMode {
    fn table_name(self) -> bool {
        matches!(self, SearchMode::All | SearchMode::TableName)
    }

    fn table_comment(self) -> bool {
        matches!(
            self,
            SearchMode::All | SearchMode::AnyComment | SearchMode::TableComment
        )
    }

    fn column_name(self) -> bool {
        matches!(self, SearchMode::All | SearchMode::ColumnName)
    }

    fn column_comment(self) -> bool {
        matches!(
            self,
            SearchMode::All | SearchMode::AnyComment | SearchMode::ColumnComment
        )
    }
}

fn contains(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}

/// Returns true if any field `mode` authorizes contains `keyword`,
/// ignoring case.
pub fn table_matches(table: &Table, keyword: &str, mode: SearchMode) -> bool {
    matches_lowercase(table, &keyword.to_lowercase(), mode)
}

fn matches_lowercase(table: &Table, needle: &str, mode: SearchMode) -> bool {
    (mode.table_name() && contains(&table.name, needle))
        || (mode.table_comment() && contains(&table.comment, needle))
        || (mode.column_name() && table.columns.iter().any(|c| contains(&c.name, needle)))
        || (mode.column_comment() && table.columns.iter().any(|c| contains(&c.comment, needle)))
}

/// Filters `snapshot` to the tables matching `keyword` under `mode`.
///
/// An absent or empty keyword returns the snapshot unchanged.
///
/// # Example
/// ```rust
/// use dbcatalog_core::models::{Column, SearchMode, Snapshot, Table};
/// use dbcatalog_core::search::filter;
///
/// let snapshot = Snapshot::from_tables([
///     Table::new("users", vec![Column::new("email", "text", false)]),
///     Table::new("orders", vec![Column::new("total", "numeric", false)]),
/// ])
/// .unwrap();
///
/// let hits = filter(&snapshot, Some("EMAIL"), SearchMode::ColumnName);
/// assert_eq!(hits.table_names().collect::<Vec<_>>(), ["users"]);
/// ```
pub fn filter(snapshot: &Snapshot, keyword: Option<&str>, mode: SearchMode) -> Snapshot {
    let needle = match keyword {
        Some(keyword) if !keyword.is_empty() => keyword.to_lowercase(),
        _ => return snapshot.clone(),
    };

    let result = snapshot.retain_matching(|table| matches_lowercase(table, &needle, mode));
    tracing::debug!(
        "Search '{}' ({}) kept {} of {} tables",
        needle,
        mode,
        result.len(),
        snapshot.len()
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Column;

    fn sample() -> Snapshot {
        Snapshot::from_tables([
            Table::new(
                "users",
                vec![
                    Column::new("id", "int", false),
                    Column::new("email", "varchar(255)", false).with_comment("Login address"),
                ],
            )
            .with_comment("Registered customers"),
            Table::new(
                "orders",
                vec![
                    Column::new("id", "int", false),
                    Column::new("user_id", "int", false).with_comment("Buyer"),
                ],
            )
            .with_comment("Purchase headers"),
            Table::new("audit_log", vec![Column::new("payload", "text", true)]),
        ])
        .unwrap()
    }

    fn hits(keyword: &str, mode: SearchMode) -> Vec<String> {
        filter(&sample(), Some(keyword), mode)
            .table_names()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_empty_keyword_returns_input() {
        let snapshot = sample();
        assert_eq!(filter(&snapshot, None, SearchMode::All), snapshot);
        assert_eq!(filter(&snapshot, Some(""), SearchMode::TableName), snapshot);
    }

    #[test]
    fn test_case_insensitive_table_name() {
        assert_eq!(hits("USER", SearchMode::TableName), ["users"]);
    }

    #[test]
    fn test_column_name_mode_ignores_table_names() {
        // "user" appears in the users table name but only orders has a
        // matching column
        assert_eq!(hits("user", SearchMode::ColumnName), ["orders"]);
    }

    #[test]
    fn test_comment_modes() {
        assert_eq!(hits("customers", SearchMode::TableComment), ["users"]);
        assert!(hits("customers", SearchMode::ColumnComment).is_empty());
        assert_eq!(hits("buyer", SearchMode::ColumnComment), ["orders"]);
        assert!(hits("buyer", SearchMode::TableComment).is_empty());
        assert_eq!(hits("buyer", SearchMode::AnyComment), ["orders"]);
        assert_eq!(hits("purchase", SearchMode::AnyComment), ["orders"]);
    }

    #[test]
    fn test_all_is_union_of_modes() {
        assert_eq!(hits("user", SearchMode::All), ["users", "orders"]);
        assert_eq!(hits("payload", SearchMode::All), ["audit_log"]);
        assert!(hits("nothing-matches", SearchMode::All).is_empty());
    }

    #[test]
    fn test_table_matches_ignores_keyword_case() {
        let snapshot = sample();
        let users = snapshot.get("users").unwrap();
        assert!(table_matches(users, "EMAIL", SearchMode::ColumnName));
        assert!(table_matches(users, "Registered", SearchMode::TableComment));
        assert!(!table_matches(users, "EMAIL", SearchMode::TableName));
    }

    #[test]
    fn test_filter_preserves_invariant() {
        let result = filter(&sample(), Some("id"), SearchMode::ColumnName);
        assert!(result.is_consistent());
        assert_eq!(result.len(), 2);
    }
}
