//! Schema extraction: turns a live database into a [`Snapshot`].
//!
//! Extraction enumerates base tables, applies the include/exclude filter and
//! then assembles each table from three independent lookups (columns, table
//! comment, column comments). Per-table work runs with bounded concurrency
//! but tables are folded into the snapshot in enumeration order, so the
//! result is deterministic for a fixed database state.
//!
//! Failure policy:
//! - the connectivity check and table enumeration are fatal
//! - a failed or timed-out column listing skips that table with a warning
//! - a failed or timed-out comment lookup leaves that comment empty with a
//!   warning

use crate::adapters::{AdapterFeature, DatabaseAdapter};
use crate::error::{DbCatalogError, Result};
use crate::models::{Column, Snapshot, SnapshotBuilder, Table};
use futures::StreamExt;
use futures::stream;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Which enumerated tables to extract.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableFilter {
    /// When set, only these tables are extracted
    pub include: Option<Vec<String>>,
    /// Removed after inclusion filtering
    pub exclude: Vec<String>,
}

impl TableFilter {
    /// Filter that keeps every table.
    pub fn all() -> Self {
        Self::default()
    }

    /// Builder method to restrict extraction to `tables`.
    pub fn include<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include = Some(tables.into_iter().map(Into::into).collect());
        self
    }

    /// Builder method to exclude `tables`.
    pub fn exclude<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude = tables.into_iter().map(Into::into).collect();
        self
    }

    /// Applies the filter to enumerated names, keeping enumeration order.
    pub fn apply(&self, listed: Vec<String>) -> Vec<String> {
        let excluded: HashSet<&str> = self.exclude.iter().map(String::as_str).collect();

        let retained: Vec<String> = match &self.include {
            Some(include) => {
                let wanted: HashSet<&str> = include.iter().map(String::as_str).collect();
                let present: HashSet<&str> = listed.iter().map(String::as_str).collect();
                for name in include.iter().filter(|n| !present.contains(n.as_str())) {
                    tracing::debug!("Requested table '{}' does not exist; ignoring", name);
                }
                listed
                    .into_iter()
                    .filter(|name| wanted.contains(name.as_str()))
                    .collect()
            }
            None => listed,
        };

        retained
            .into_iter()
            .filter(|name| !excluded.contains(name.as_str()))
            .collect()
    }
}

/// Result of an extraction: the snapshot plus every non-fatal problem.
#[derive(Debug, Default)]
pub struct Extraction {
    pub snapshot: Snapshot,
    /// `PartialMetadata` errors for degraded fields and skipped tables
    pub warnings: Vec<DbCatalogError>,
}

/// Outcome of assembling one table.
enum TableOutcome {
    Assembled(Table, Vec<DbCatalogError>),
    Skipped(DbCatalogError),
    Cancelled,
}

/// Configurable extraction driver.
#[derive(Debug, Clone)]
pub struct Extractor {
    query_timeout: Duration,
    connect_timeout: Duration,
    concurrency: Option<usize>,
    cancel: CancellationToken,
}

impl Default for Extractor {
    fn default() -> Self {
        Self {
            query_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(30),
            concurrency: None,
            cancel: CancellationToken::new(),
        }
    }
}

impl Extractor {
    /// Creates an extractor with 30 second timeouts and adapter-sized
    /// concurrency.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to set the per-call query timeout.
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// Builder method to set the connectivity check timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Builder method to cap concurrent per-table work. Zero is treated
    /// as one.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = Some(concurrency);
        self
    }

    /// Builder method to attach a cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token observed between tables.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Extracts the tables selected by `filter`.
    ///
    /// # Errors
    /// - `ConnectionTimeout` / `Connection` if the connectivity check or
    ///   table enumeration fails
    /// - `DuplicateTable` if the adapter enumerates a name twice
    /// - `DuplicateColumn` if a table reports a column name twice
    /// - `Cancelled` if the token fires before all tables are started
    pub async fn extract(
        &self,
        adapter: &dyn DatabaseAdapter,
        filter: &TableFilter,
    ) -> Result<Extraction> {
        let start = Instant::now();
        let identity = adapter.identity();

        if self.cancel.is_cancelled() {
            return Err(DbCatalogError::Cancelled);
        }

        tokio::time::timeout(self.connect_timeout, adapter.test_connection())
            .await
            .map_err(|_| {
                DbCatalogError::connection_timeout(identity.to_string(), self.connect_timeout)
            })??;

        let listed = tokio::time::timeout(self.query_timeout, adapter.list_tables())
            .await
            .map_err(|_| {
                DbCatalogError::connection_timeout(
                    format!("table enumeration on {}", identity),
                    self.query_timeout,
                )
            })??;
        let listed_count = listed.len();
        let names = filter.apply(listed);

        let concurrency = self
            .concurrency
            .unwrap_or_else(|| adapter.max_concurrency())
            .max(1);
        tracing::info!(
            "Extracting {} of {} tables from {} (concurrency {})",
            names.len(),
            listed_count,
            identity,
            concurrency
        );

        let mut outcomes = stream::iter(names)
            .map(|name| async move {
                if self.cancel.is_cancelled() {
                    return TableOutcome::Cancelled;
                }
                self.extract_table(adapter, name).await
            })
            .buffered(concurrency);

        let mut builder = SnapshotBuilder::new();
        let mut warnings = Vec::new();
        while let Some(outcome) = outcomes.next().await {
            match outcome {
                TableOutcome::Assembled(table, table_warnings) => {
                    warnings.extend(table_warnings);
                    builder.add(table)?;
                }
                TableOutcome::Skipped(warning) => warnings.push(warning),
                TableOutcome::Cancelled => {
                    tracing::warn!(
                        "Extraction cancelled after {} tables; nothing will be written",
                        builder.len()
                    );
                    return Err(DbCatalogError::Cancelled);
                }
            }
        }

        let snapshot = builder.build();
        tracing::info!(
            "Extracted {} tables with {} warnings in {:.2}s",
            snapshot.len(),
            warnings.len(),
            start.elapsed().as_secs_f64()
        );
        Ok(Extraction { snapshot, warnings })
    }

    /// Runs one lookup under the query timeout, turning failures into a
    /// reason string.
    async fn bounded<T>(&self, lookup: impl Future<Output = Result<T>>) -> std::result::Result<T, String> {
        match tokio::time::timeout(self.query_timeout, lookup).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("timed out after {:?}", self.query_timeout)),
        }
    }

    async fn extract_table(&self, adapter: &dyn DatabaseAdapter, name: String) -> TableOutcome {
        let mut columns: Vec<Column> = match self.bounded(adapter.list_columns(&name)).await {
            Ok(columns) => columns,
            Err(reason) => {
                tracing::warn!("Skipping table '{}': column listing failed: {}", name, reason);
                return TableOutcome::Skipped(DbCatalogError::partial_metadata(
                    name, "columns", reason,
                ));
            }
        };

        let table_comment = async {
            if adapter.supports_feature(AdapterFeature::TableComments) {
                self.bounded(adapter.table_comment(&name)).await
            } else {
                Ok(String::new())
            }
        };
        let column_comments = async {
            if adapter.supports_feature(AdapterFeature::ColumnComments) {
                self.bounded(adapter.column_comments(&name)).await
            } else {
                Ok(HashMap::new())
            }
        };
        let (table_comment, column_comments) = tokio::join!(table_comment, column_comments);

        let mut warnings = Vec::new();
        let comment = table_comment.unwrap_or_else(|reason| {
            tracing::warn!("Table comment for '{}' unavailable: {}", name, reason);
            warnings.push(DbCatalogError::partial_metadata(&name, "table_comment", reason));
            String::new()
        });
        let mut column_comments = column_comments.unwrap_or_else(|reason| {
            tracing::warn!("Column comments for '{}' unavailable: {}", name, reason);
            warnings.push(DbCatalogError::partial_metadata(&name, "column_comments", reason));
            HashMap::new()
        });

        for column in &mut columns {
            column.comment = column_comments.remove(&column.name).unwrap_or_default();
        }

        tracing::debug!("Assembled table '{}' ({} columns)", name, columns.len());
        TableOutcome::Assembled(
            Table {
                name,
                comment,
                columns,
            },
            warnings,
        )
    }
}

/// Extracts with default settings, logging and discarding warnings.
///
/// # Errors
/// See [`Extractor::extract`].
pub async fn extract(
    adapter: &dyn DatabaseAdapter,
    include_tables: Option<&[String]>,
    exclude_tables: Option<&[String]>,
) -> Result<Snapshot> {
    let filter = TableFilter {
        include: include_tables.map(<[String]>::to_vec),
        exclude: exclude_tables.map(<[String]>::to_vec).unwrap_or_default(),
    };
    Extractor::default()
        .extract(adapter, &filter)
        .await
        .map(|extraction| extraction.snapshot)
}
