//! MySQL adapter backed by a lazily connected sqlx pool.
//!
//! Everything is read from `INFORMATION_SCHEMA` for the connection's default
//! database (`DATABASE()`). Text columns are cast to `CHAR` because some
//! server versions report them as binary strings.

use super::helpers::{RowExt, map_sqlx_error};
use super::{AdapterFeature, ConnectionConfig, ConnectionDescriptor, DatabaseAdapter, Dialect};
use crate::Result;
use crate::models::{Column, DatabaseIdentity};
use async_trait::async_trait;
use sqlx::MySqlPool;
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions};
use std::collections::HashMap;

const LIST_TABLES: &str = r#"
    SELECT CAST(TABLE_NAME AS CHAR) AS table_name
    FROM INFORMATION_SCHEMA.TABLES
    WHERE TABLE_SCHEMA = DATABASE()
      AND TABLE_TYPE = 'BASE TABLE'
    ORDER BY TABLE_NAME
"#;

const LIST_COLUMNS: &str = r#"
    SELECT
        CAST(COLUMN_NAME AS CHAR) AS column_name,
        CAST(COLUMN_TYPE AS CHAR) AS declared_type,
        CAST(IS_NULLABLE AS CHAR) AS is_nullable,
        CAST(COLUMN_DEFAULT AS CHAR) AS default_literal
    FROM INFORMATION_SCHEMA.COLUMNS
    WHERE TABLE_SCHEMA = DATABASE()
      AND TABLE_NAME = ?
    ORDER BY ORDINAL_POSITION
"#;

const TABLE_COMMENT: &str = r#"
    SELECT CAST(TABLE_COMMENT AS CHAR) AS comment
    FROM INFORMATION_SCHEMA.TABLES
    WHERE TABLE_SCHEMA = DATABASE()
      AND TABLE_NAME = ?
"#;

const COLUMN_COMMENTS: &str = r#"
    SELECT
        CAST(COLUMN_NAME AS CHAR) AS column_name,
        CAST(COLUMN_COMMENT AS CHAR) AS comment
    FROM INFORMATION_SCHEMA.COLUMNS
    WHERE TABLE_SCHEMA = DATABASE()
      AND TABLE_NAME = ?
"#;

/// MySQL adapter with connection pooling
pub struct MySqlAdapter {
    pool: MySqlPool,
    config: ConnectionConfig,
    identity: DatabaseIdentity,
}

impl std::fmt::Debug for MySqlAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlAdapter")
            .field("identity", &self.identity)
            .field("config", &self.config)
            .field("pool_size", &self.pool.size())
            .finish()
    }
}

impl MySqlAdapter {
    /// Creates the adapter with a lazily connected pool.
    ///
    /// # Errors
    /// Returns `Configuration` if the descriptor is incomplete
    #[allow(clippy::unused_async)]
    pub async fn new(descriptor: &ConnectionDescriptor, config: &ConnectionConfig) -> Result<Self> {
        descriptor.validate()?;

        let options = MySqlConnectOptions::new()
            .host(&descriptor.host)
            .port(descriptor.effective_port().unwrap_or(3306))
            .username(&descriptor.user)
            .password(descriptor.password.as_str())
            .database(&descriptor.database)
            .charset("utf8mb4");

        let read_only = config.read_only;
        let pool = MySqlPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout)
            .after_connect(move |conn, _meta| {
                Box::pin(async move {
                    use sqlx::Executor;

                    if read_only {
                        conn.execute("SET SESSION TRANSACTION READ ONLY").await?;
                    }
                    Ok(())
                })
            })
            .connect_lazy_with(options);

        Ok(Self {
            pool,
            config: config.clone(),
            identity: descriptor.identity(),
        })
    }
}

#[async_trait]
impl DatabaseAdapter for MySqlAdapter {
    async fn test_connection(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                crate::error::DbCatalogError::connection_failed_with(
                    format!("MySQL connectivity check for {} failed", self.identity),
                    e,
                )
            })?;
        Ok(())
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(LIST_TABLES)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("Failed to list MySQL tables", e))?;

        let mut tables = Vec::with_capacity(rows.len());
        for row in &rows {
            let name: String = row.get_field("table_name", None)?;
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
            let is_nullable: String = row.get_field("is_nullable", Some(table))?;
            columns.push(Column {
                name: row.get_field("column_name", Some(table))?,
                declared_type: row.get_field("declared_type", Some(table))?,
                nullable: is_nullable.eq_ignore_ascii_case("YES"),
                default_literal: row.get_field("default_literal", Some(table))?,
                comment: String::new(),
            });
        }
        Ok(columns)
    }

    async fn table_comment(&self, table: &str) -> Result<String> {
        let comment: Option<Option<String>> = sqlx::query_scalar(TABLE_COMMENT)
            .bind(table)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(format!("Failed to read comment of '{}'", table), e))?;
        Ok(comment.flatten().unwrap_or_default())
    }

    async fn column_comments(&self, table: &str) -> Result<HashMap<String, String>> {
        let rows = sqlx::query(COLUMN_COMMENTS)
            .bind(table)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                map_sqlx_error(format!("Failed to read column comments of '{}'", table), e)
            })?;

        let mut comments = HashMap::with_capacity(rows.len());
        for row in &rows {
            let name: String = row.get_field("column_name", Some(table))?;
            let comment: Option<String> = row.get_field("comment", Some(table))?;
            if let Some(comment) = comment.filter(|c| !c.is_empty()) {
                comments.insert(name, comment);
            }
        }
        Ok(comments)
    }

    fn dialect(&self) -> Dialect {
        Dialect::MySql
    }

    fn supports_feature(&self, feature: AdapterFeature) -> bool {
        matches!(
            feature,
            AdapterFeature::TableComments
                | AdapterFeature::ColumnComments
                | AdapterFeature::ConnectionPooling
                | AdapterFeature::ReadOnlyMode
        )
    }

    fn identity(&self) -> DatabaseIdentity {
        self.identity.clone()
    }

    fn max_concurrency(&self) -> usize {
        usize::try_from(self.config.max_connections).unwrap_or(usize::MAX)
    }
}
