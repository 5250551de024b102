//! SQLite catalog integration tests.
//!
//! SQLite needs no container: each test builds a database file in a temp
//! directory with sqlx, then reads it back through the adapter factory.

#![cfg(feature = "sqlite")]

use dbcatalog_core::adapters::{
    AdapterFeature, ConnectionConfig, ConnectionDescriptor, Dialect, create_adapter,
};
use dbcatalog_core::extract::{Extractor, TableFilter};
use dbcatalog_core::{DbCatalogError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};
use std::path::Path;

/// Helper function to create a database file with a small schema
async fn create_database(path: &Path) {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(options).await.unwrap();

    for statement in [
        "CREATE TABLE users (
            id INTEGER PRIMARY KEY,
            email VARCHAR(255) NOT NULL,
            status TEXT DEFAULT 'active'
        )",
        "CREATE TABLE orders (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL REFERENCES users(id),
            total NUMERIC(10,2) DEFAULT 0
        )",
        "CREATE VIEW active_users AS SELECT * FROM users WHERE status = 'active'",
        "CREATE TABLE audit_log (id INTEGER PRIMARY KEY AUTOINCREMENT, payload BLOB)",
    ] {
        sqlx::query(statement).execute(&pool).await.unwrap();
    }
    pool.close().await;
}

#[tokio::test]
async fn test_sqlite_extraction_from_url() -> Result<()> {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shop.db");
    create_database(&path).await;

    let descriptor = ConnectionDescriptor::from_url(&format!("sqlite://{}", path.display()))?;
    assert_eq!(descriptor.dialect, Dialect::Sqlite);
    assert_eq!(descriptor.identity().logical_name, "shop");

    let adapter = create_adapter(&descriptor, &ConnectionConfig::default()).await?;
    assert!(!adapter.supports_feature(AdapterFeature::TableComments));
    adapter.test_connection().await?;

    let extraction = Extractor::new()
        .extract(adapter.as_ref(), &TableFilter::all())
        .await?;
    assert!(extraction.warnings.is_empty());

    // Views and sqlite_sequence are not base tables
    let snapshot = extraction.snapshot;
    assert_eq!(
        snapshot.table_names().collect::<Vec<_>>(),
        ["audit_log", "orders", "users"]
    );

    let users = snapshot.get("users").unwrap();
    let names: Vec<&str> = users.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["id", "email", "status"]);

    let email = users.column("email").unwrap();
    assert_eq!(email.declared_type, "VARCHAR(255)");
    assert!(!email.nullable);
    assert_eq!(email.default_literal, None);
    assert_eq!(email.comment, "");

    let status = users.column("status").unwrap();
    assert!(status.nullable);
    assert_eq!(status.default_literal.as_deref(), Some("'active'"));

    let total = snapshot.get("orders").unwrap().column("total").unwrap();
    assert_eq!(total.declared_type, "NUMERIC(10,2)");
    assert_eq!(total.default_literal.as_deref(), Some("0"));
    Ok(())
}

#[tokio::test]
async fn test_sqlite_adapter_does_not_create_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing.db");
    let descriptor = ConnectionDescriptor::from_url(&path.display().to_string()).unwrap();

    let adapter = create_adapter(&descriptor, &ConnectionConfig::default())
        .await
        .unwrap();
    let err = Extractor::new()
        .extract(adapter.as_ref(), &TableFilter::all())
        .await
        .unwrap_err();

    assert!(matches!(err, DbCatalogError::Connection { .. }));
    assert!(!path.exists());
}
