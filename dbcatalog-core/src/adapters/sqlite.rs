//! SQLite adapter.
//!
//! Uses `sqlite_master` for table enumeration and the `pragma_table_info`
//! table-valued function for columns. SQLite stores no comments, so the
//! comment lookups return empty values and the feature flags say so.
//!
//! # Security Guarantees
//! - The database file is opened read-only and never created
//! - No network access required

use super::helpers::{RowExt, map_sqlx_error};
use super::{AdapterFeature, ConnectionConfig, ConnectionDescriptor, DatabaseAdapter, Dialect};
use crate::Result;
use crate::models::{Column, DatabaseIdentity};
use async_trait::async_trait;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::collections::HashMap;

const LIST_TABLES: &str = r#"
    SELECT name
    FROM sqlite_master
    WHERE type = 'table'
      AND name NOT LIKE 'sqlite_%'
    ORDER BY name
"#;

const LIST_COLUMNS: &str = r#"
    SELECT name, type AS declared_type, "notnull" AS not_null, dflt_value AS default_literal
    FROM pragma_table_info(?)
    ORDER BY cid
"#;

/// SQLite adapter over a single database file.
pub struct SqliteAdapter {
    pool: SqlitePool,
    config: ConnectionConfig,
    identity: DatabaseIdentity,
    path: String,
}

impl std::fmt::Debug for SqliteAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteAdapter")
            .field("path", &self.path)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SqliteAdapter {
    /// Creates the adapter for the file named by `descriptor.database`.
    ///
    /// The pool connects lazily; a missing file surfaces from
    /// `test_connection`.
    ///
    /// # Errors
    /// Returns `Configuration` if the path is empty
    #[allow(clippy::unused_async)]
    pub async fn new(descriptor: &ConnectionDescriptor, config: &ConnectionConfig) -> Result<Self> {
        descriptor.validate()?;

        let options = SqliteConnectOptions::new()
            .filename(&descriptor.database)
            .read_only(config.read_only)
            .create_if_missing(false);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout)
            .connect_lazy_with(options);

        Ok(Self {
            pool,
            config: config.clone(),
            identity: descriptor.identity(),
            path: descriptor.database.clone(),
        })
    }

    /// Path of the database file.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Closes the connection pool gracefully.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl DatabaseAdapter for SqliteAdapter {
    async fn test_connection(&self) -> Result<()> {
        let result: i32 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                crate::error::DbCatalogError::connection_failed_with(
                    format!("Cannot open SQLite database '{}'", self.path),
                    e,
                )
            })?;

        if result != 1 {
            return Err(crate::error::DbCatalogError::configuration(
                "Basic connectivity test failed: unexpected result",
            ));
        }
        Ok(())
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(LIST_TABLES)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("Failed to list SQLite tables", e))?;

        let mut tables = Vec::with_capacity(rows.len());
        for row in &rows {
            let name: String = row.get_field("name", None)?;
            tables.push(name);
        }
        Ok(tables)
    }

    async fn list_columns(&self, table: &str) -> Result<Vec<Column>> {
        let rows = sqlx::query(LIST_COLUMNS)
            .bind(table)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(format!("Failed to list columns of '{}'", table), e))?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in &rows {
            let not_null: i64 = row.get_field("not_null", Some(table))?;
            columns.push(Column {
                name: row.get_field("name", Some(table))?,
                declared_type: row.get_field("declared_type", Some(table))?,
                nullable: not_null == 0,
                default_literal: row.get_field("default_literal", Some(table))?,
                comment: String::new(),
            });
        }
        Ok(columns)
    }

    async fn table_comment(&self, _table: &str) -> Result<String> {
        Ok(String::new())
    }

    async fn column_comments(&self, _table: &str) -> Result<HashMap<String, String>> {
        Ok(HashMap::new())
    }

    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn supports_feature(&self, feature: AdapterFeature) -> bool {
        // No comment catalog and no server-side statement timeout
        matches!(
            feature,
            AdapterFeature::ConnectionPooling | AdapterFeature::ReadOnlyMode
        )
    }

    fn identity(&self) -> DatabaseIdentity {
        self.identity.clone()
    }

    fn max_concurrency(&self) -> usize {
        usize::try_from(self.config.max_connections).unwrap_or(usize::MAX)
    }
}
