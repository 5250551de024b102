//! Extraction behavior against a scripted adapter: ordering, fail-soft
//! metadata, timeouts, cancellation and duplicate detection.

mod common;

use common::{ScriptedAdapter, shop_tables};
use dbcatalog_core::extract::{Extractor, TableFilter};
use dbcatalog_core::models::{Column, Table};
use dbcatalog_core::DbCatalogError;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_extracts_tables_with_comments_in_enumeration_order() {
    let adapter = ScriptedAdapter::new("shop", shop_tables());
    let extraction = Extractor::new()
        .extract(&adapter, &TableFilter::all())
        .await
        .unwrap();

    assert!(extraction.warnings.is_empty());
    let snapshot = extraction.snapshot;
    assert_eq!(snapshot.table_names().collect::<Vec<_>>(), ["users", "orders"]);
    assert!(snapshot.is_consistent());

    let orders = snapshot.get("orders").unwrap();
    assert_eq!(orders.comment, "Purchase headers");
    let total = orders.column("total").unwrap();
    assert_eq!(total.declared_type, "numeric(10,2)");
    assert_eq!(total.default_literal.as_deref(), Some("0"));
    assert_eq!(total.comment, "Order total");
    assert_eq!(orders.column("id").unwrap().comment, "");
}

#[tokio::test]
async fn test_include_and_exclude() {
    let adapter = ScriptedAdapter::new("shop", shop_tables());
    let extractor = Extractor::new();

    let only_orders = extractor
        .extract(&adapter, &TableFilter::all().include(["orders", "missing"]))
        .await
        .unwrap();
    assert_eq!(only_orders.snapshot.table_names().collect::<Vec<_>>(), ["orders"]);

    let without_users = extractor
        .extract(&adapter, &TableFilter::all().exclude(["users"]))
        .await
        .unwrap();
    assert_eq!(without_users.snapshot.table_names().collect::<Vec<_>>(), ["orders"]);
}

#[tokio::test]
async fn test_failed_column_comments_degrade_to_empty() {
    let mut adapter = ScriptedAdapter::new("shop", shop_tables());
    adapter.fail_column_comments.insert("orders".to_string());

    let extraction = Extractor::new()
        .extract(&adapter, &TableFilter::all())
        .await
        .unwrap();

    let orders = extraction.snapshot.get("orders").unwrap();
    assert_eq!(orders.comment, "Purchase headers");
    assert!(orders.columns.iter().all(|c| c.comment.is_empty()));
    assert_eq!(
        extraction.snapshot.get("users").unwrap().column("email").unwrap().comment,
        "Login address"
    );

    assert_eq!(extraction.warnings.len(), 1);
    match &extraction.warnings[0] {
        DbCatalogError::PartialMetadata { table, field, .. } => {
            assert_eq!(table, "orders");
            assert_eq!(field, "column_comments");
        }
        other => panic!("unexpected warning: {other:?}"),
    }
}

#[tokio::test]
async fn test_failed_column_listing_skips_table() {
    let mut adapter = ScriptedAdapter::new("shop", shop_tables());
    adapter.fail_columns.insert("users".to_string());

    let extraction = Extractor::new()
        .extract(&adapter, &TableFilter::all())
        .await
        .unwrap();

    assert_eq!(extraction.snapshot.table_names().collect::<Vec<_>>(), ["orders"]);
    assert_eq!(extraction.warnings.len(), 1);
    assert!(!extraction.warnings[0].is_fatal());
}

#[tokio::test(start_paused = true)]
async fn test_slow_comment_lookup_times_out_softly() {
    let mut adapter = ScriptedAdapter::new("shop", shop_tables());
    adapter.slow_table_comments.insert("users".to_string());

    let extraction = Extractor::new()
        .with_query_timeout(Duration::from_secs(2))
        .extract(&adapter, &TableFilter::all())
        .await
        .unwrap();

    let users = extraction.snapshot.get("users").unwrap();
    assert_eq!(users.comment, "");
    assert_eq!(users.column("email").unwrap().comment, "Login address");
    assert!(matches!(
        &extraction.warnings[..],
        [DbCatalogError::PartialMetadata { field, .. }] if field == "table_comment"
    ));
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_extraction_keeps_enumeration_order() {
    let tables: Vec<Table> = (0..6)
        .map(|i| Table::new(format!("t{i}"), vec![Column::new("id", "integer", false)]))
        .collect();
    let mut adapter = ScriptedAdapter::new("shop", tables);
    adapter.concurrency = 4;
    // Earlier tables finish last
    for i in 0..6u64 {
        adapter
            .column_delays
            .insert(format!("t{i}"), Duration::from_millis(600 - i * 100));
    }

    let extraction = Extractor::new()
        .extract(&adapter, &TableFilter::all())
        .await
        .unwrap();
    assert_eq!(
        extraction.snapshot.table_names().collect::<Vec<_>>(),
        ["t0", "t1", "t2", "t3", "t4", "t5"]
    );
}

#[tokio::test]
async fn test_connection_failure_is_fatal() {
    let mut adapter = ScriptedAdapter::new("shop", shop_tables());
    adapter.fail_connection = true;

    let err = Extractor::new()
        .extract(&adapter, &TableFilter::all())
        .await
        .unwrap_err();
    assert!(matches!(err, DbCatalogError::Connection { .. }));
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_duplicate_enumeration_is_fatal() {
    let mut adapter = ScriptedAdapter::new("shop", shop_tables());
    adapter.duplicated.push("users".to_string());

    let err = Extractor::new()
        .extract(&adapter, &TableFilter::all())
        .await
        .unwrap_err();
    assert!(matches!(err, DbCatalogError::DuplicateTable { ref name } if name == "users"));
}

#[tokio::test]
async fn test_cancellation_between_tables() {
    let token = CancellationToken::new();
    let mut adapter = ScriptedAdapter::new("shop", shop_tables());
    adapter.cancel_on = Some(("users".to_string(), token.clone()));

    let err = Extractor::new()
        .with_concurrency(1)
        .with_cancellation(token)
        .extract(&adapter, &TableFilter::all())
        .await
        .unwrap_err();
    assert!(matches!(err, DbCatalogError::Cancelled));
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let token = CancellationToken::new();
    token.cancel();
    let adapter = ScriptedAdapter::new("shop", shop_tables());

    let err = Extractor::new()
        .with_cancellation(token)
        .extract(&adapter, &TableFilter::all())
        .await
        .unwrap_err();
    assert!(matches!(err, DbCatalogError::Cancelled));
}

#[tokio::test]
async fn test_free_extract_function() {
    let adapter = ScriptedAdapter::new("shop", shop_tables());
    let include = vec!["users".to_string()];
    let snapshot = dbcatalog_core::extract::extract(&adapter, Some(&include), None)
        .await
        .unwrap();
    assert_eq!(snapshot.len(), 1);
    assert!(snapshot.contains("users"));
}
