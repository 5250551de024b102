//! Scripted in-memory adapter shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use dbcatalog_core::adapters::{AdapterFeature, DatabaseAdapter, Dialect};
use dbcatalog_core::models::{Column, DatabaseIdentity, Table};
use dbcatalog_core::{DbCatalogError, Result};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Adapter answering from a fixed table list, with injectable failures.
#[derive(Debug, Default)]
pub struct ScriptedAdapter {
    pub logical_name: String,
    pub tables: Vec<Table>,
    /// Names listed twice by `list_tables`
    pub duplicated: Vec<String>,
    pub fail_connection: bool,
    pub fail_columns: HashSet<String>,
    pub fail_column_comments: HashSet<String>,
    /// Table comment lookups that never finish in time
    pub slow_table_comments: HashSet<String>,
    /// Per-table delay before columns are returned
    pub column_delays: HashMap<String, Duration>,
    /// Fired when the columns of this table are listed
    pub cancel_on: Option<(String, CancellationToken)>,
    pub concurrency: usize,
}

impl ScriptedAdapter {
    pub fn new(logical_name: &str, tables: Vec<Table>) -> Self {
        Self {
            logical_name: logical_name.to_string(),
            tables,
            concurrency: 1,
            ..Self::default()
        }
    }

    fn table(&self, name: &str) -> Result<&Table> {
        self.tables
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| DbCatalogError::query_failed(format!("no such table '{}'", name)))
    }
}

#[async_trait]
impl DatabaseAdapter for ScriptedAdapter {
    async fn test_connection(&self) -> Result<()> {
        if self.fail_connection {
            return Err(DbCatalogError::connection_failed(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            )));
        }
        Ok(())
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.tables.iter().map(|t| t.name.clone()).collect();
        names.extend(self.duplicated.iter().cloned());
        Ok(names)
    }

    async fn list_columns(&self, table: &str) -> Result<Vec<Column>> {
        if let Some((name, token)) = &self.cancel_on
            && name == table
        {
            token.cancel();
        }
        if let Some(delay) = self.column_delays.get(table) {
            tokio::time::sleep(*delay).await;
        }
        if self.fail_columns.contains(table) {
            return Err(DbCatalogError::query_failed(format!(
                "permission denied for '{}'",
                table
            )));
        }
        Ok(self
            .table(table)?
            .columns
            .iter()
            .map(|c| Column {
                comment: String::new(),
                ..c.clone()
            })
            .collect())
    }

    async fn table_comment(&self, table: &str) -> Result<String> {
        if self.slow_table_comments.contains(table) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        Ok(self.table(table)?.comment.clone())
    }

    async fn column_comments(&self, table: &str) -> Result<HashMap<String, String>> {
        if self.fail_column_comments.contains(table) {
            return Err(DbCatalogError::query_failed("comment catalog unavailable"));
        }
        Ok(self
            .table(table)?
            .columns
            .iter()
            .filter(|c| !c.comment.is_empty())
            .map(|c| (c.name.clone(), c.comment.clone()))
            .collect())
    }

    fn dialect(&self) -> Dialect {
        Dialect::PostgreSql
    }

    fn supports_feature(&self, feature: AdapterFeature) -> bool {
        matches!(
            feature,
            AdapterFeature::TableComments | AdapterFeature::ColumnComments
        )
    }

    fn identity(&self) -> DatabaseIdentity {
        DatabaseIdentity {
            logical_name: self.logical_name.clone(),
            host: "db.internal".to_string(),
            port: "5432".to_string(),
            user: "reader".to_string(),
        }
    }

    fn max_concurrency(&self) -> usize {
        self.concurrency
    }
}

/// `users` and `orders`, with comments on both levels.
pub fn shop_tables() -> Vec<Table> {
    vec![
        Table::new(
            "users",
            vec![
                Column::new("id", "integer", false),
                Column::new("email", "varchar(255)", false).with_comment("Login address"),
            ],
        )
        .with_comment("Registered customers"),
        Table::new(
            "orders",
            vec![
                Column::new("id", "integer", false),
                Column::new("total", "numeric(10,2)", true)
                    .with_default("0")
                    .with_comment("Order total"),
            ],
        )
        .with_comment("Purchase headers"),
    ]
}
