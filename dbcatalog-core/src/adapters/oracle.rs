//! Oracle adapter using the `oracle` crate (ODPI-C).
//!
//! The driver is synchronous, so every lookup opens a connection and runs on
//! tokio's blocking pool. Metadata comes from the `ALL_*` dictionary views
//! restricted to the connecting user's schema.
//!
//! # Note
//!
//! This adapter requires Oracle Instant Client to be installed on the system.

use super::{AdapterFeature, ConnectionConfig, ConnectionDescriptor, DatabaseAdapter, Dialect};
use crate::Result;
use crate::error::DbCatalogError;
use crate::models::{Column, DatabaseIdentity};
use async_trait::async_trait;
use std::collections::HashMap;
use zeroize::Zeroizing;

const LIST_TABLES: &str =
    "SELECT table_name FROM all_tables WHERE owner = UPPER(:1) ORDER BY table_name";

const LIST_COLUMNS: &str = "SELECT column_name, data_type, data_length, data_precision, \
     data_scale, nullable, data_default \
     FROM all_tab_columns WHERE owner = UPPER(:1) AND table_name = :2 ORDER BY column_id";

const TABLE_COMMENT: &str =
    "SELECT comments FROM all_tab_comments WHERE owner = UPPER(:1) AND table_name = :2";

const COLUMN_COMMENTS: &str =
    "SELECT column_name, comments FROM all_col_comments WHERE owner = UPPER(:1) AND table_name = :2";

type ColumnRow = (
    String,
    String,
    Option<i64>,
    Option<i64>,
    Option<i64>,
    String,
    Option<String>,
);

/// Oracle adapter with per-call blocking connections
pub struct OracleAdapter {
    config: ConnectionConfig,
    user: String,
    password: Zeroizing<String>,
    connect_string: String,
    identity: DatabaseIdentity,
}

impl std::fmt::Debug for OracleAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OracleAdapter")
            .field("connect_string", &self.connect_string)
            .field("user", &self.user)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl OracleAdapter {
    /// Creates the adapter. `descriptor.database` is the service name; the
    /// connect string is `//host:port/service`.
    ///
    /// # Errors
    /// Returns `Configuration` if the descriptor is incomplete
    pub fn new(descriptor: &ConnectionDescriptor, config: &ConnectionConfig) -> Result<Self> {
        descriptor.validate()?;
        if descriptor.user.is_empty() {
            return Err(DbCatalogError::configuration(
                "Oracle connections require a user (the user's schema is catalogued)",
            ));
        }

        Ok(Self {
            config: config.clone(),
            user: descriptor.user.clone(),
            password: descriptor.password.clone(),
            connect_string: format!(
                "//{}:{}/{}",
                descriptor.host,
                descriptor.effective_port().unwrap_or(1521),
                descriptor.database
            ),
            identity: descriptor.identity(),
        })
    }

    /// Runs `work` on a fresh connection inside the blocking pool.
    async fn run<T, F>(&self, context: String, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&oracle::Connection, &str) -> oracle::Result<T> + Send + 'static,
    {
        let user = self.user.clone();
        let password = self.password.clone();
        let connect_string = self.connect_string.clone();

        tokio::task::spawn_blocking(move || {
            let conn = oracle::Connection::connect(&user, password.as_str(), &connect_string)
                .map_err(|e| {
                    DbCatalogError::connection_failed_with(
                        format!("Oracle login to {} failed", connect_string),
                        e,
                    )
                })?;
            work(&conn, &user).map_err(|e| DbCatalogError::query_failed_with(context, e))
        })
        .await
        .map_err(|e| DbCatalogError::query_failed_with("Oracle worker task failed", e))?
    }
}

/// Renders the declared type the way Oracle DDL spells it.
fn declared_type(
    data_type: &str,
    length: Option<i64>,
    precision: Option<i64>,
    scale: Option<i64>,
) -> String {
    match data_type {
        "VARCHAR2" | "NVARCHAR2" | "CHAR" | "NCHAR" | "RAW" => match length {
            Some(length) => format!("{}({})", data_type, length),
            None => data_type.to_string(),
        },
        "NUMBER" => match (precision, scale) {
            (Some(p), Some(0)) => format!("NUMBER({})", p),
            (Some(p), Some(s)) => format!("NUMBER({},{})", p, s),
            (Some(p), None) => format!("NUMBER({})", p),
            (None, _) => "NUMBER".to_string(),
        },
        other => other.to_string(),
    }
}

#[async_trait]
impl DatabaseAdapter for OracleAdapter {
    async fn test_connection(&self) -> Result<()> {
        self.run("Oracle connectivity check failed".to_string(), |conn, _| {
            conn.query_row_as::<i64>("SELECT 1 FROM dual", &[])
                .map(|_| ())
        })
        .await
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        self.run("Failed to list Oracle tables".to_string(), |conn, user| {
            conn.query_as::<String>(LIST_TABLES, &[&user])?
                .collect()
        })
        .await
    }

    async fn list_columns(&self, table: &str) -> Result<Vec<Column>> {
        let table = table.to_string();
        let context = format!("Failed to list columns of '{}'", table);
        let rows: Vec<ColumnRow> = self
            .run(context, move |conn, user| {
                conn.query_as::<ColumnRow>(LIST_COLUMNS, &[&user, &table])?
                    .collect()
            })
            .await?;

        Ok(rows
            .into_iter()
            .map(
                |(name, data_type, length, precision, scale, nullable, default)| Column {
                    name,
                    declared_type: declared_type(&data_type, length, precision, scale),
                    nullable: nullable == "Y",
                    default_literal: default
                        .map(|d| d.trim_end().to_string())
                        .filter(|d| !d.is_empty()),
                    comment: String::new(),
                },
            )
            .collect())
    }

    async fn table_comment(&self, table: &str) -> Result<String> {
        let table = table.to_string();
        let context = format!("Failed to read comment of '{}'", table);
        self.run(context, move |conn, user| {
            let mut rows = conn.query_as::<Option<String>>(TABLE_COMMENT, &[&user, &table])?;
            Ok(rows.next().transpose()?.flatten().unwrap_or_default())
        })
        .await
    }

    async fn column_comments(&self, table: &str) -> Result<HashMap<String, String>> {
        let table = table.to_string();
        let context = format!("Failed to read column comments of '{}'", table);
        self.run(context, move |conn, user| {
            let rows = conn.query_as::<(String, Option<String>)>(COLUMN_COMMENTS, &[&user, &table])?;
            let mut comments = HashMap::new();
            for row in rows {
                let (name, comment) = row?;
                if let Some(comment) = comment {
                    comments.insert(name, comment);
                }
            }
            Ok(comments)
        })
        .await
    }

    fn dialect(&self) -> Dialect {
        Dialect::Oracle
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
