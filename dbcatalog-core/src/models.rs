//! Core data models for the schema snapshot.
//!
//! A [`Snapshot`] is the normalized catalog of one database at one point in
//! time. Its serialized form is the wire shape embedded in searchable
//! artifacts: a JSON object keyed by table name whose values carry only the
//! table comment and ordered columns.

use crate::error::{DbCatalogError, Result};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::str::FromStr;

/// A column as seen by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    /// Type exactly as the dialect declares it (e.g. `varchar(255)`)
    #[serde(rename = "type")]
    pub declared_type: String,
    #[serde(deserialize_with = "deserialize_nullable")]
    pub nullable: bool,
    /// Raw textual default, never coerced to a typed value
    #[serde(rename = "default")]
    pub default_literal: Option<String>,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub comment: String,
}

impl Column {
    /// Creates a column without a default or comment.
    pub fn new(name: impl Into<String>, declared_type: impl Into<String>, nullable: bool) -> Self {
        Self {
            name: name.into(),
            declared_type: declared_type.into(),
            nullable,
            default_literal: None,
            comment: String::new(),
        }
    }

    /// Builder method to set the default literal.
    pub fn with_default(mut self, default_literal: impl Into<String>) -> Self {
        self.default_literal = Some(default_literal.into());
        self
    }

    /// Builder method to set the comment.
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }
}

/// A base table with its comment and columns in ordinal order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub name: String,
    pub comment: String,
    pub columns: Vec<Column>,
}

impl Table {
    /// Creates a table without a comment.
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
        Self {
            name: name.into(),
            comment: String::new(),
            columns,
        }
    }

    /// Builder method to set the table comment.
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    /// Looks up a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// The first column name that appears more than once, if any.
    pub fn duplicate_column(&self) -> Option<&str> {
        let mut seen = HashSet::with_capacity(self.columns.len());
        self.columns
            .iter()
            .map(|c| c.name.as_str())
            .find(|name| !seen.insert(*name))
    }
}

/// Serialized table body; the name lives in the enclosing map key.
#[derive(Serialize)]
struct TableBodyRef<'a> {
    comment: &'a str,
    columns: &'a [Column],
}

#[derive(Deserialize)]
struct TableBody {
    #[serde(default, deserialize_with = "deserialize_text")]
    comment: String,
    columns: Vec<Column>,
}

/// Accepts `true`/`false` or the `"YES"`/`"NO"` strings older artifacts carry.
fn deserialize_nullable<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Nullable {
        Flag(bool),
        Text(String),
    }

    match Nullable::deserialize(deserializer)? {
        Nullable::Flag(flag) => Ok(flag),
        Nullable::Text(text) => match text.to_ascii_uppercase().as_str() {
            "YES" | "Y" | "TRUE" => Ok(true),
            "NO" | "N" | "FALSE" => Ok(false),
            other => Err(serde::de::Error::custom(format!(
                "invalid nullable value '{}'",
                other
            ))),
        },
    }
}

/// Treats JSON `null` as an empty string.
fn deserialize_text<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Normalized catalog of tables keyed by name.
///
/// Every key equals the `name` of its table. The only ways to obtain a
/// snapshot are the builder, [`Snapshot::from_tables`], deserialization,
/// [`Snapshot::merge`] and filtering, all of which maintain that invariant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    tables: IndexMap<String, Table>,
}

impl Snapshot {
    /// Creates an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a snapshot from tables, rejecting duplicate names.
    ///
    /// # Errors
    /// Returns `DuplicateTable` if two tables share a name.
    pub fn from_tables(tables: impl IntoIterator<Item = Table>) -> Result<Self> {
        let mut builder = SnapshotBuilder::new();
        for table in tables {
            builder.add(table)?;
        }
        Ok(builder.build())
    }

    /// Number of tables.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Returns true if the snapshot has no tables.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Looks up a table by name.
    pub fn get(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    /// Returns true if a table with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    /// Iterates tables in snapshot order.
    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.values()
    }

    /// Iterates table names in snapshot order.
    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    /// Iterates `(key, table)` pairs in snapshot order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Table)> {
        self.tables.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Checks that every key equals the name of its table.
    pub fn is_consistent(&self) -> bool {
        self.tables.iter().all(|(key, table)| *key == table.name)
    }

    /// Merges a partial snapshot over this one and returns the result.
    ///
    /// Tables present in `partial` replace the prior table as a whole row
    /// (keeping the prior position); tables only in `partial` are appended;
    /// tables only in `self` are kept untouched.
    pub fn merge(&self, partial: &Snapshot) -> Snapshot {
        let mut tables = self.tables.clone();
        for (name, table) in &partial.tables {
            tables.insert(name.clone(), table.clone());
        }
        Snapshot { tables }
    }

    /// Returns a new snapshot with only the tables matching `keep`.
    pub fn retain_matching(&self, mut keep: impl FnMut(&Table) -> bool) -> Snapshot {
        let tables = self
            .tables
            .iter()
            .filter(|(_, table)| keep(table))
            .map(|(name, table)| (name.clone(), table.clone()))
            .collect();
        Snapshot { tables }
    }

    /// Set of all table names.
    pub fn name_set(&self) -> BTreeSet<String> {
        self.tables.keys().cloned().collect()
    }
}

impl Serialize for Snapshot {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.tables.len()))?;
        for (name, table) in &self.tables {
            map.serialize_entry(
                name,
                &TableBodyRef {
                    comment: &table.comment,
                    columns: &table.columns,
                },
            )?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Snapshot {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(SnapshotVisitor)
    }
}

/// Reads the table map entry by entry so that a repeated table key is an
/// error instead of silently replacing the earlier entry.
struct SnapshotVisitor;

impl<'de> Visitor<'de> for SnapshotVisitor {
    type Value = Snapshot;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("a map of table names to table bodies")
    }

    fn visit_map<A>(self, mut access: A) -> std::result::Result<Snapshot, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut builder = SnapshotBuilder::new();
        while let Some((name, body)) = access.next_entry::<String, TableBody>()? {
            let table = Table {
                name,
                comment: body.comment,
                columns: body.columns,
            };
            builder.add(table).map_err(serde::de::Error::custom)?;
        }
        Ok(builder.build())
    }
}

/// Accumulates whole tables during extraction.
#[derive(Debug, Default)]
pub struct SnapshotBuilder {
    tables: IndexMap<String, Table>,
}

impl SnapshotBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a fully assembled table.
    ///
    /// # Errors
    /// - `DuplicateTable` if the name was already added
    /// - `DuplicateColumn` if the table lists a column name twice
    pub fn add(&mut self, table: Table) -> Result<()> {
        if self.tables.contains_key(&table.name) {
            return Err(DbCatalogError::DuplicateTable { name: table.name });
        }
        if let Some(column) = table.duplicate_column().map(str::to_string) {
            return Err(DbCatalogError::DuplicateColumn {
                table: table.name,
                column,
            });
        }
        self.tables.insert(table.name.clone(), table);
        Ok(())
    }

    /// Number of tables added so far.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Returns true if nothing was added.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Finishes the snapshot.
    pub fn build(self) -> Snapshot {
        Snapshot {
            tables: self.tables,
        }
    }
}

/// Which live database a snapshot or artifact corresponds to.
///
/// Used for validation and auditing only; never as a storage key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatabaseIdentity {
    pub logical_name: String,
    pub host: String,
    pub port: String,
    pub user: String,
}

impl fmt::Display for DatabaseIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}{}",
            self.logical_name,
            self.host,
            if self.port.is_empty() {
                String::new()
            } else {
                format!(":{}", self.port)
            }
        )
    }
}

/// Audit record written at the end of every catalog run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    /// Completion time, serialized as RFC 3339
    pub timestamp: DateTime<Utc>,
    pub identity: DatabaseIdentity,
    pub total_table_count: usize,
    pub all_table_names: BTreeSet<String>,
    /// Tables requested for refresh in this run
    pub updated_table_names: BTreeSet<String>,
}

impl SyncState {
    /// Creates a record for the resulting catalog and the tables refreshed
    /// this run.
    pub fn new<I, S>(identity: DatabaseIdentity, result: &Snapshot, updated: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            timestamp: Utc::now(),
            identity,
            total_table_count: result.len(),
            all_table_names: result.name_set(),
            updated_table_names: updated.into_iter().map(Into::into).collect(),
        }
    }
}

/// Which fields the search engine examines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SearchMode {
    /// Union of every other mode
    #[default]
    All,
    TableName,
    ColumnName,
    /// Table comment or any column comment
    AnyComment,
    TableComment,
    ColumnComment,
}

impl SearchMode {
    /// Every mode, in declaration order.
    pub const VARIANTS: [SearchMode; 6] = [
        SearchMode::All,
        SearchMode::TableName,
        SearchMode::ColumnName,
        SearchMode::AnyComment,
        SearchMode::TableComment,
        SearchMode::ColumnComment,
    ];

    /// Boundary spelling of the mode.
    pub fn as_str(self) -> &'static str {
        match self {
            SearchMode::All => "all",
            SearchMode::TableName => "table-name",
            SearchMode::ColumnName => "column-name",
            SearchMode::AnyComment => "any-comment",
            SearchMode::TableComment => "table-comment",
            SearchMode::ColumnComment => "column-comment",
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchMode {
    type Err = DbCatalogError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        SearchMode::VARIANTS
            .into_iter()
            .find(|mode| mode.as_str() == normalized)
            .ok_or_else(|| {
                DbCatalogError::configuration(format!(
                    "Invalid search mode '{}'; expected one of: all, table-name, column-name, \
                     any-comment, table-comment, column-comment",
                    s
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(name: &str, comment: &str) -> Table {
        Table::new(name, vec![Column::new("id", "int", false)]).with_comment(comment)
    }

    #[test]
    fn test_builder_rejects_duplicates() {
        let mut builder = SnapshotBuilder::new();
        builder.add(table("users", "")).unwrap();
        let err = builder.add(table("users", "again")).unwrap_err();
        assert!(matches!(err, DbCatalogError::DuplicateTable { ref name } if name == "users"));
        assert_eq!(builder.len(), 1);
    }

    #[test]
    fn test_builder_rejects_duplicate_columns() {
        let mut builder = SnapshotBuilder::new();
        let table = Table::new(
            "orders",
            vec![
                Column::new("id", "int", false),
                Column::new("total", "numeric", true),
                Column::new("id", "bigint", false),
            ],
        );
        assert_eq!(table.duplicate_column(), Some("id"));

        let err = builder.add(table).unwrap_err();
        assert!(matches!(
            err,
            DbCatalogError::DuplicateColumn { ref table, ref column } if table == "orders" && column == "id"
        ));
        assert!(builder.is_empty());
    }

    #[test]
    fn test_deserialize_rejects_repeated_table_key() {
        let json = r#"{
            "orders": {"comment": "first", "columns": [{"name": "id", "type": "int", "nullable": false, "default": null}]},
            "orders": {"comment": "second", "columns": []}
        }"#;
        let err = serde_json::from_str::<Snapshot>(json).unwrap_err();
        assert!(err.to_string().contains("Duplicate table 'orders'"));
    }

    #[test]
    fn test_merge_overwrite_semantics() {
        let prior = Snapshot::from_tables([table("A", "v1"), table("B", "v2")]).unwrap();
        let partial = Snapshot::from_tables([
            Table::new("A", vec![Column::new("other", "text", true)]).with_comment("v3"),
            table("C", "v4"),
        ])
        .unwrap();

        let merged = prior.merge(&partial);

        assert_eq!(merged.table_names().collect::<Vec<_>>(), ["A", "B", "C"]);
        let a = merged.get("A").unwrap();
        assert_eq!(a.comment, "v3");
        assert_eq!(a.columns.len(), 1);
        assert_eq!(a.columns[0].name, "other");
        assert_eq!(merged.get("B").unwrap(), prior.get("B").unwrap());
        assert_eq!(merged.get("C").unwrap().comment, "v4");
        assert!(merged.is_consistent());
        // The prior value is untouched
        assert_eq!(prior.get("A").unwrap().comment, "v1");
    }

    #[test]
    fn test_merge_into_itself_is_identity() {
        let snapshot = Snapshot::from_tables([table("a", "x"), table("b", "y")]).unwrap();
        assert_eq!(snapshot.merge(&snapshot), snapshot);
    }

    #[test]
    fn test_wire_shape() {
        let snapshot = Snapshot::from_tables([Table::new(
            "orders",
            vec![
                Column::new("id", "int", false),
                Column::new("note", "text", true)
                    .with_default("'n/a'")
                    .with_comment("free text"),
            ],
        )
        .with_comment("Customer orders")])
        .unwrap();

        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "orders": {
                    "comment": "Customer orders",
                    "columns": [
                        {"name": "id", "type": "int", "nullable": false, "default": null, "comment": ""},
                        {"name": "note", "type": "text", "nullable": true, "default": "'n/a'", "comment": "free text"}
                    ]
                }
            })
        );
    }

    #[test]
    fn test_deserialize_legacy_nullable_strings() {
        let json = r#"{"t": {"comment": null, "columns": [
            {"name": "a", "type": "INT", "nullable": "NO", "default": "NULL", "comment": ""},
            {"name": "b", "type": "TEXT", "nullable": "YES", "default": null}
        ]}}"#;
        let snapshot: Snapshot = serde_json::from_str(json).unwrap();
        let t = snapshot.get("t").unwrap();
        assert_eq!(t.name, "t");
        assert_eq!(t.comment, "");
        assert!(!t.columns[0].nullable);
        assert!(t.columns[1].nullable);
        assert_eq!(t.columns[1].comment, "");
        assert!(snapshot.is_consistent());
    }

    #[test]
    fn test_deserialize_rejects_bad_nullable() {
        let json = r#"{"t": {"comment": "", "columns": [
            {"name": "a", "type": "INT", "nullable": "maybe", "default": null, "comment": ""}
        ]}}"#;
        assert!(serde_json::from_str::<Snapshot>(json).is_err());
    }

    #[test]
    fn test_search_mode_parsing() {
        assert_eq!("all".parse::<SearchMode>().unwrap(), SearchMode::All);
        assert_eq!(
            "table_comment".parse::<SearchMode>().unwrap(),
            SearchMode::TableComment
        );
        assert_eq!(
            "Column-Name".parse::<SearchMode>().unwrap(),
            SearchMode::ColumnName
        );
        assert!("everything".parse::<SearchMode>().is_err());
        for mode in SearchMode::VARIANTS {
            assert_eq!(mode.to_string().parse::<SearchMode>().unwrap(), mode);
        }
    }

    #[test]
    fn test_sync_state_counts() {
        let identity = DatabaseIdentity {
            logical_name: "orders_db".into(),
            host: "db.internal".into(),
            port: "5432".into(),
            user: "reader".into(),
        };
        let snapshot = Snapshot::from_tables([table("users", ""), table("orders", "")]).unwrap();
        let state = SyncState::new(identity, &snapshot, ["orders"]);

        assert_eq!(state.total_table_count, 2);
        assert_eq!(
            state.all_table_names,
            BTreeSet::from(["orders".to_string(), "users".to_string()])
        );
        assert_eq!(
            state.updated_table_names,
            BTreeSet::from(["orders".to_string()])
        );
    }

    #[test]
    fn test_identity_display() {
        let identity = DatabaseIdentity {
            logical_name: "shop".into(),
            host: "localhost".into(),
            port: String::new(),
            user: "app".into(),
        };
        assert_eq!(identity.to_string(), "shop@localhost");
    }
}
