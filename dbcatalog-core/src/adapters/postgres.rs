//! PostgreSQL adapter backed by a lazily connected sqlx pool.
//!
//! Tables come from `information_schema.tables` for the session's current
//! schema; columns, defaults and comments come from the system catalogs
//! (`pg_attribute`, `pg_attrdef`, `obj_description`, `col_description`) so
//! declared types keep their modifiers (e.g. `character varying(64)`).
//!
//! # Security Guarantees
//! - Sessions are read-only (`default_transaction_read_only`) by default
//! - `statement_timeout` bounds every query server-side
//! - Connection errors never include the password

use super::helpers::{RowExt, map_sqlx_error};
use super::{AdapterFeature, ConnectionConfig, ConnectionDescriptor, DatabaseAdapter, Dialect};
use crate::Result;
use crate::models::{Column, DatabaseIdentity};
use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use std::collections::HashMap;

const LIST_TABLES: &str = r#"
    SELECT table_name::text AS table_name
    FROM information_schema.tables
    WHERE table_schema = current_schema()
      AND table_type = 'BASE TABLE'
    ORDER BY table_name
"#;

const LIST_COLUMNS: &str = r#"
    SELECT
        a.attname::text AS column_name,
        format_type(a.atttypid, a.atttypmod) AS declared_type,
        NOT a.attnotnull AS nullable,
        pg_get_expr(d.adbin, d.adrelid) AS default_literal
    FROM pg_attribute a
    JOIN pg_class c ON c.oid = a.attrelid
    JOIN pg_namespace n ON n.oid = c.relnamespace
    LEFT JOIN pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum
    WHERE n.nspname = current_schema()
      AND c.relname = $1
      AND a.attnum > 0
      AND NOT a.attisdropped
    ORDER BY a.attnum
"#;

const TABLE_COMMENT: &str = r#"
    SELECT obj_description(c.oid, 'pg_class') AS comment
    FROM pg_class c
    JOIN pg_namespace n ON n.oid = c.relnamespace
    WHERE n.nspname = current_schema()
      AND c.relname = $1
"#;

const COLUMN_COMMENTS: &str = r#"
    SELECT
        a.attname::text AS column_name,
        col_description(a.attrelid, a.attnum) AS comment
    FROM pg_attribute a
    JOIN pg_class c ON c.oid = a.attrelid
    JOIN pg_namespace n ON n.oid = c.relnamespace
    WHERE n.nspname = current_schema()
      AND c.relname = $1
      AND a.attnum > 0
      AND NOT a.attisdropped
"#;

/// PostgreSQL adapter with connection pooling
pub struct PostgresAdapter {
    pool: PgPool,
    config: ConnectionConfig,
    identity: DatabaseIdentity,
}

impl std::fmt::Debug for PostgresAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresAdapter")
            .field("identity", &self.identity)
            .field("config", &self.config)
            .field("pool_size", &self.pool.size())
            .field("pool_idle", &self.pool.num_idle())
            .finish()
    }
}

impl PostgresAdapter {
    /// Creates the adapter. The pool connects lazily, so this only fails on
    /// an invalid descriptor; use `test_connection` to reach the server.
    ///
    /// # Errors
    /// Returns `Configuration` if the descriptor is incomplete
    #[allow(clippy::unused_async)]
    pub async fn new(descriptor: &ConnectionDescriptor, config: &ConnectionConfig) -> Result<Self> {
        descriptor.validate()?;

        let options = PgConnectOptions::new()
            .host(&descriptor.host)
            .port(descriptor.effective_port().unwrap_or(5432))
            .username(&descriptor.user)
            .password(descriptor.password.as_str())
            .database(&descriptor.database)
            .application_name(concat!("dbcatalog-", env!("CARGO_PKG_VERSION")));

        let query_timeout_ms = config.query_timeout.as_millis();
        let read_only = config.read_only;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout)
            .after_connect(move |conn, _meta| {
                Box::pin(async move {
                    use sqlx::Executor;

                    conn.execute(
                        format!("SET statement_timeout = {}", query_timeout_ms).as_str(),
                    )
                    .await?;
                    if read_only {
                        conn.execute("SET default_transaction_read_only = on")
                            .await?;
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

    /// Closes the connection pool gracefully
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl DatabaseAdapter for PostgresAdapter {
    async fn test_connection(&self) -> Result<()> {
        let result: i32 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                crate::error::DbCatalogError::connection_failed_with(
                    format!("PostgreSQL connectivity check for {} failed", self.identity),
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
            .map_err(|e| map_sqlx_error("Failed to list PostgreSQL tables", e))?;

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
            columns.push(Column {
                name: row.get_field("column_name", Some(table))?,
                declared_type: row.get_field("declared_type", Some(table))?,
                nullable: row.get_field("nullable", Some(table))?,
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

        let mut comments = HashMap::new();
        for row in &rows {
            let name: String = row.get_field("column_name", Some(table))?;
            let comment: Option<String> = row.get_field("comment", Some(table))?;
            if let Some(comment) = comment {
                comments.insert(name, comment);
            }
        }
        Ok(comments)
    }

    fn dialect(&self) -> Dialect {
        Dialect::PostgreSql
    }

    fn supports_feature(&self, feature: AdapterFeature) -> bool {
        matches!(
            feature,
            AdapterFeature::TableComments
                | AdapterFeature::ColumnComments
                | AdapterFeature::ConnectionPooling
                | AdapterFeature::QueryTimeout
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
