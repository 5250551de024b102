//! SQL Server adapter using the native TDS driver (tiberius).
//!
//! Each lookup opens its own connection, so lookups for different tables can
//! run in parallel without a shared pool. Tables are read from the `dbo`
//! schema; comments come from the `MS_Description` extended property.
//!
//! # Security
//! - Credentials are held only in the tiberius `Config`
//! - All errors are sanitized to prevent credential leakage

use super::{AdapterFeature, ConnectionConfig, ConnectionDescriptor, DatabaseAdapter, Dialect};
use crate::Result;
use crate::error::DbCatalogError;
use crate::models::{Column, DatabaseIdentity};
use async_trait::async_trait;
use std::collections::HashMap;
use tiberius::{AuthMethod, Client, Config, Row};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

const LIST_TABLES: &str = "SELECT TABLE_NAME FROM INFORMATION_SCHEMA.TABLES \
     WHERE TABLE_TYPE = 'BASE TABLE' AND TABLE_SCHEMA = 'dbo' ORDER BY TABLE_NAME";

const LIST_COLUMNS: &str = "SELECT COLUMN_NAME, DATA_TYPE, IS_NULLABLE, COLUMN_DEFAULT \
     FROM INFORMATION_SCHEMA.COLUMNS \
     WHERE TABLE_NAME = @P1 AND TABLE_SCHEMA = 'dbo' \
     ORDER BY ORDINAL_POSITION";

const TABLE_COMMENT: &str = "SELECT CAST(value AS NVARCHAR(4000)) \
     FROM sys.extended_properties \
     WHERE major_id = OBJECT_ID(QUOTENAME('dbo') + '.' + QUOTENAME(@P1)) \
       AND minor_id = 0 AND class = 1 AND name = 'MS_Description'";

const COLUMN_COMMENTS: &str = "SELECT c.name, CAST(ep.value AS NVARCHAR(4000)) \
     FROM sys.columns c \
     LEFT JOIN sys.extended_properties ep \
       ON ep.major_id = c.object_id AND ep.minor_id = c.column_id \
      AND ep.class = 1 AND ep.name = 'MS_Description' \
     WHERE c.object_id = OBJECT_ID(QUOTENAME('dbo') + '.' + QUOTENAME(@P1))";

/// SQL Server adapter with per-call connections
pub struct SqlServerAdapter {
    config: ConnectionConfig,
    connection_config: Config,
    identity: DatabaseIdentity,
}

impl std::fmt::Debug for SqlServerAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // tiberius::Config holds the password, so it is left out
        f.debug_struct("SqlServerAdapter")
            .field("identity", &self.identity)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SqlServerAdapter {
    /// Builds the driver configuration; no connection is opened here.
    ///
    /// The `driver` field of the descriptor names an ODBC driver and has no
    /// meaning for the native TDS client; it is ignored.
    ///
    /// # Errors
    /// Returns `Configuration` if the descriptor is incomplete
    pub fn new(descriptor: &ConnectionDescriptor, config: &ConnectionConfig) -> Result<Self> {
        descriptor.validate()?;
        if let Some(driver) = &descriptor.driver {
            tracing::debug!("Ignoring ODBC driver '{}' for native SQL Server client", driver);
        }

        let mut connection_config = Config::new();
        connection_config.host(&descriptor.host);
        connection_config.port(descriptor.effective_port().unwrap_or(1433));
        connection_config.database(&descriptor.database);
        connection_config.application_name("dbcatalog");
        connection_config.authentication(AuthMethod::sql_server(
            &descriptor.user,
            descriptor.password.as_str(),
        ));

        Ok(Self {
            config: config.clone(),
            connection_config,
            identity: descriptor.identity(),
        })
    }

    /// Opens a new connection bounded by the connect timeout.
    async fn connect(&self) -> Result<Client<Compat<TcpStream>>> {
        let addr = self.connection_config.get_addr();
        let tcp = tokio::time::timeout(self.config.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| {
                DbCatalogError::connection_timeout(
                    format!("SQL Server at {}", self.identity),
                    self.config.connect_timeout,
                )
            })?
            .map_err(|e| {
                DbCatalogError::connection_failed_with(
                    format!("Cannot reach SQL Server at {}", self.identity),
                    e,
                )
            })?;

        tcp.set_nodelay(true).map_err(|e| {
            DbCatalogError::connection_failed_with("Failed to configure SQL Server socket", e)
        })?;

        Client::connect(self.connection_config.clone(), tcp.compat_write())
            .await
            .map_err(|e| {
                DbCatalogError::connection_failed_with(
                    format!("SQL Server login to {} failed", self.identity),
                    e,
                )
            })
    }

    /// Runs a query with an optional table-name parameter and returns the
    /// first result set.
    async fn query_rows(&self, sql: &str, table: Option<&str>, context: &str) -> Result<Vec<Row>> {
        let mut client = self.connect().await?;
        let stream = match table {
            Some(table) => client.query(sql, &[&table]).await,
            None => client.query(sql, &[]).await,
        }
        .map_err(|e| DbCatalogError::query_failed_with(context, e))?;

        stream
            .into_first_result()
            .await
            .map_err(|e| DbCatalogError::query_failed_with(context, e))
    }
}

/// Reads an optional text column.
fn text(row: &Row, index: usize, context: &str) -> Result<Option<String>> {
    row.try_get::<&str, _>(index)
        .map(|value| value.map(str::to_string))
        .map_err(|e| DbCatalogError::query_failed_with(context, e))
}

/// Reads a required text column.
fn required_text(row: &Row, index: usize, context: &str) -> Result<String> {
    text(row, index, context)?
        .ok_or_else(|| DbCatalogError::query_failed(format!("{}: unexpected NULL", context)))
}

#[async_trait]
impl DatabaseAdapter for SqlServerAdapter {
    async fn test_connection(&self) -> Result<()> {
        self.query_rows("SELECT 1", None, "SQL Server connectivity check failed")
            .await
            .map(|_| ())
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        let context = "Failed to list SQL Server tables";
        let rows = self.query_rows(LIST_TABLES, None, context).await?;
        rows.iter()
            .map(|row| required_text(row, 0, context))
            .collect()
    }

    async fn list_columns(&self, table: &str) -> Result<Vec<Column>> {
        let context = format!("Failed to list columns of '{}'", table);
        let rows = self.query_rows(LIST_COLUMNS, Some(table), &context).await?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in &rows {
            let is_nullable = required_text(row, 2, &context)?;
            columns.push(Column {
                name: required_text(row, 0, &context)?,
                declared_type: required_text(row, 1, &context)?,
                nullable: is_nullable.eq_ignore_ascii_case("YES"),
                default_literal: text(row, 3, &context)?,
                comment: String::new(),
            });
        }
        Ok(columns)
    }

    async fn table_comment(&self, table: &str) -> Result<String> {
        let context = format!("Failed to read comment of '{}'", table);
        let rows = self.query_rows(TABLE_COMMENT, Some(table), &context).await?;
        match rows.first() {
            Some(row) => Ok(text(row, 0, &context)?.unwrap_or_default()),
            None => Ok(String::new()),
        }
    }

    async fn column_comments(&self, table: &str) -> Result<HashMap<String, String>> {
        let context = format!("Failed to read column comments of '{}'", table);
        let rows = self
            .query_rows(COLUMN_COMMENTS, Some(table), &context)
            .await?;

        let mut comments = HashMap::with_capacity(rows.len());
        for row in &rows {
            let name = required_text(row, 0, &context)?;
            if let Some(comment) = text(row, 1, &context)? {
                comments.insert(name, comment);
            }
        }
        Ok(comments)
    }

    fn dialect(&self) -> Dialect {
        Dialect::SqlServer
    }

    fn supports_feature(&self, feature: AdapterFeature) -> bool {
        matches!(
            feature,
            AdapterFeature::TableComments | AdapterFeature::ColumnComments
        )
    }

    fn identity(&self) -> DatabaseIdentity {
        self.identity.clone()
    }

    fn max_concurrency(&self) -> usize {
        usize::try_from(self.config.max_connections).unwrap_or(usize::MAX)
    }
}
