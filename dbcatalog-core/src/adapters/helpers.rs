//! Helper utilities shared by the sqlx-backed adapters.
//!
//! Provides consistent field extraction and error classification so the
//! PostgreSQL, MySQL and SQLite adapters report failures the same way.

use crate::{Result, error::DbCatalogError};
use sqlx::{ColumnIndex, Decode, Row, Type};

/// Extension trait for extracting typed values from database rows
/// with consistent error handling.
///
/// # Example
/// ```rust,ignore
/// use crate::adapters::helpers::RowExt;
///
/// let name: String = row.get_field("column_name", Some("orders"))?;
/// let default: Option<String> = row.get_field("default_literal", Some("orders"))?;
/// ```
pub(crate) trait RowExt: Row {
    /// Extracts a typed field from the row with table context on failure.
    fn get_field<'r, T>(&'r self, field_name: &str, table_context: Option<&str>) -> Result<T>
    where
        T: Decode<'r, Self::Database> + Type<Self::Database>;
}

impl<R> RowExt for R
where
    R: Row,
    for<'a> &'a str: ColumnIndex<R>,
{
    fn get_field<'r, T>(&'r self, field_name: &str, table_context: Option<&str>) -> Result<T>
    where
        T: Decode<'r, Self::Database> + Type<Self::Database>,
    {
        self.try_get(field_name).map_err(|e| {
            let context = match table_context {
                Some(table) => format!("Failed to read field '{}' for table '{}'", field_name, table),
                None => format!("Failed to read field '{}'", field_name),
            };
            DbCatalogError::query_failed_with(context, e)
        })
    }
}

/// Classifies a sqlx error as a transport failure or a query failure.
///
/// Transport failures (I/O, TLS, pool exhaustion) become `Connection`
/// errors; everything else is `QueryExecution`.
pub(crate) fn map_sqlx_error(context: impl Into<String>, error: sqlx::Error) -> DbCatalogError {
    match error {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => DbCatalogError::connection_failed_with(context, error),
        other => DbCatalogError::query_failed_with(context, other),
    }
}
