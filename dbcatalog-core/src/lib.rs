//! Core library for dbcatalog.
//!
//! Extracts table and column metadata (with comments) from a live database
//! into an ordered [`Snapshot`], filters it by keyword, and keeps a rendered
//! catalog up to date by merging incremental refreshes into the snapshot
//! embedded in the previously rendered artifact.
//!
//! # Security Guarantees
//! - All database operations are read-only catalog queries
//! - Passwords are held in zeroizing buffers and never logged
//! - Connection strings are redacted in errors and log output
//!
//! # Layout
//! - [`adapters`]: one read-only metadata adapter per SQL dialect
//! - [`extract`]: bounded-concurrency, fail-soft snapshot extraction
//! - [`search`]: keyword filtering under six search modes
//! - [`codec`]: the snapshot block embedded in rendered artifacts
//! - [`sync`]: full and incremental catalog runs with sync state records

pub mod adapters;
pub mod codec;
pub mod error;
pub mod extract;
pub mod logging;
pub mod models;
pub mod search;
pub mod sync;

// Re-export commonly used types
pub use adapters::{
    AdapterFeature, ConnectionConfig, ConnectionDescriptor, DatabaseAdapter, Dialect,
    create_adapter,
};
pub use codec::PriorArtifact;
pub use error::{DbCatalogError, Result};
pub use extract::{Extraction, Extractor, TableFilter};
pub use models::{
    Column, DatabaseIdentity, SearchMode, Snapshot, SnapshotBuilder, SyncState, Table,
};
pub use sync::{
    ArtifactSink, MergeConfirmation, MismatchPolicy, RefreshOptions, Resolution, SyncOptions,
    SyncOutcome, SyncStateStore, Synchronizer,
};
pub use tokio_util::sync::CancellationToken;
