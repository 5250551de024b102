//! Incremental synchronization.
//!
//! A sync run refreshes a subset of tables and folds them into the snapshot
//! embedded in the previously rendered artifact:
//!
//! ```text
//! Idle -> TablesResolved -> Extracted -> Merged | Replaced -> Persisted
//! ```
//!
//! The prior artifact is only merged when it is confirmed to describe the
//! same database, or when the injected [`MergeConfirmation`] agrees to merge
//! an unconfirmed one. Rendering goes through an [`ArtifactSink`]; if it
//! fails, no sync state is written.

mod state;
mod tables_file;

pub use state::SyncStateStore;
pub use tables_file::{dedupe, parse_tables, read_tables_file};

use crate::adapters::DatabaseAdapter;
use crate::codec::{self, PriorArtifact};
use crate::error::{DbCatalogError, Result};
use crate::extract::{Extractor, TableFilter};
use crate::models::{DatabaseIdentity, SearchMode, Snapshot, SyncState};
use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};

/// Progress of a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    TablesResolved,
    Extracted,
    Merged,
    Replaced,
    Persisted,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncPhase::Idle => "idle",
            SyncPhase::TablesResolved => "tables-resolved",
            SyncPhase::Extracted => "extracted",
            SyncPhase::Merged => "merged",
            SyncPhase::Replaced => "replaced",
            SyncPhase::Persisted => "persisted",
        };
        f.write_str(name)
    }
}

/// What is known when a prior artifact does not name the expected database.
#[derive(Debug, Clone)]
pub struct IdentityMismatchContext {
    pub expected: DatabaseIdentity,
    pub artifact: PathBuf,
    /// Number of tables in the unconfirmed prior snapshot
    pub prior_table_count: usize,
}

impl IdentityMismatchContext {
    /// The mismatch as an error value, for reporting.
    pub fn error(&self) -> DbCatalogError {
        DbCatalogError::IdentityMismatch {
            expected: self.expected.logical_name.clone(),
        }
    }
}

/// Decides whether an unconfirmed prior artifact may be merged.
pub trait MergeConfirmation: Send + Sync {
    /// Returns true to merge, false to replace the prior artifact.
    fn confirm(&self, context: &IdentityMismatchContext) -> bool;
}

/// Fixed answer for unattended runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MismatchPolicy {
    /// Discard the unconfirmed artifact
    #[default]
    Replace,
    /// Merge into it anyway
    Merge,
}

impl MergeConfirmation for MismatchPolicy {
    fn confirm(&self, context: &IdentityMismatchContext) -> bool {
        let merge = *self == MismatchPolicy::Merge;
        tracing::warn!(
            "{} at {}; policy is to {}",
            context.error(),
            context.artifact.display(),
            if merge { "merge" } else { "replace" }
        );
        merge
    }
}

/// Renders a snapshot into artifacts.
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    /// Writes the artifacts and returns the paths written.
    ///
    /// # Errors
    /// Any error aborts the run before sync state is written
    async fn render(&self, snapshot: &Snapshot, identity: &DatabaseIdentity) -> Result<Vec<PathBuf>>;
}

/// Why the prior artifact was not merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceReason {
    /// Full refresh; no merge attempted
    FullRefresh,
    /// No prior artifact exists
    NoPriorArtifact,
    /// The prior artifact could not be read or decoded
    PriorUnreadable,
    /// The prior artifact names another database and merging was declined
    IdentityDeclined,
}

/// How the resulting snapshot was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Merged,
    Replaced(ReplaceReason),
}

/// Inputs of an incremental run.
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Explicit tables; takes precedence over the tables file when non-empty
    pub tables_override: Vec<String>,
    pub tables_file: Option<PathBuf>,
    /// Searchable artifact holding the prior snapshot
    pub prior_artifact: PathBuf,
}

/// Inputs of a full run.
#[derive(Debug, Clone, Default)]
pub struct RefreshOptions {
    pub filter: TableFilter,
    /// Optional keyword reduction applied before rendering
    pub keyword: Option<String>,
    pub mode: SearchMode,
}

/// Result of a completed run.
#[derive(Debug)]
pub struct SyncOutcome {
    pub snapshot: Snapshot,
    pub state: SyncState,
    pub resolution: Resolution,
    /// Non-fatal problems (degraded metadata, unreadable prior artifact)
    pub warnings: Vec<DbCatalogError>,
    /// Paths written by the sink
    pub written: Vec<PathBuf>,
    /// Set when the artifacts were written but the state record was not
    pub state_error: Option<DbCatalogError>,
}

/// Drives full and incremental catalog runs.
pub struct Synchronizer {
    extractor: Extractor,
    confirmation: Box<dyn MergeConfirmation>,
    state_store: SyncStateStore,
}

impl fmt::Debug for Synchronizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Synchronizer")
            .field("extractor", &self.extractor)
            .field("state_store", &self.state_store)
            .finish_non_exhaustive()
    }
}

fn enter(phase: SyncPhase) {
    tracing::debug!("Sync phase: {}", phase);
}

impl Synchronizer {
    /// Creates a synchronizer that replaces unconfirmed artifacts.
    pub fn new(extractor: Extractor, state_store: SyncStateStore) -> Self {
        Self {
            extractor,
            confirmation: Box::new(MismatchPolicy::default()),
            state_store,
        }
    }

    /// Builder method to set the merge confirmation strategy.
    pub fn with_confirmation(mut self, confirmation: Box<dyn MergeConfirmation>) -> Self {
        self.confirmation = confirmation;
        self
    }

    /// Store receiving sync state records.
    pub fn state_store(&self) -> &SyncStateStore {
        &self.state_store
    }

    /// Resolves the tables to refresh: the override list when non-empty,
    /// otherwise the tables file.
    ///
    /// # Errors
    /// Returns `NoTablesSpecified` when both are empty, `Io` when the
    /// tables file is unreadable
    pub async fn resolve_tables(&self, options: &SyncOptions) -> Result<Vec<String>> {
        let overrides = dedupe(options.tables_override.iter().cloned());
        if !overrides.is_empty() {
            return Ok(overrides);
        }
        let from_file = match &options.tables_file {
            Some(path) => read_tables_file(path).await?,
            None => Vec::new(),
        };
        if from_file.is_empty() {
            return Err(DbCatalogError::no_tables_specified());
        }
        Ok(from_file)
    }

    /// Refreshes the listed tables and merges them into the prior artifact.
    ///
    /// # Errors
    /// - `NoTablesSpecified` if no table was requested
    /// - any fatal extraction error (`Connection`, `Cancelled`, ...)
    /// - any sink error
    pub async fn run(
        &self,
        adapter: &dyn DatabaseAdapter,
        options: &SyncOptions,
        sink: &dyn ArtifactSink,
    ) -> Result<SyncOutcome> {
        enter(SyncPhase::Idle);
        let identity = adapter.identity();

        let tables = self.resolve_tables(options).await?;
        enter(SyncPhase::TablesResolved);
        tracing::info!("Refreshing {} tables: {}", tables.len(), tables.join(", "));

        let filter = TableFilter::all().include(tables.iter().cloned());
        let extraction = self.extractor.extract(adapter, &filter).await?;
        enter(SyncPhase::Extracted);
        let mut warnings = extraction.warnings;
        let partial = extraction.snapshot;

        let (snapshot, resolution) = match load_prior(&options.prior_artifact, &identity).await {
            Ok(prior) => self.resolve(prior, partial, &identity, &options.prior_artifact),
            Err(e) => {
                tracing::warn!(
                    "Ignoring prior artifact {}: {}; it will be replaced",
                    options.prior_artifact.display(),
                    e
                );
                warnings.push(e);
                (partial, Resolution::Replaced(ReplaceReason::PriorUnreadable))
            }
        };
        enter(match resolution {
            Resolution::Merged => SyncPhase::Merged,
            Resolution::Replaced(_) => SyncPhase::Replaced,
        });

        self.finish(snapshot, identity, tables, resolution, warnings, sink)
            .await
    }

    /// Extracts the tables selected by `options.filter`, optionally reduces
    /// them by keyword and renders the result without consulting any prior
    /// artifact.
    ///
    /// # Errors
    /// Any fatal extraction error or sink error
    pub async fn refresh_all(
        &self,
        adapter: &dyn DatabaseAdapter,
        options: &RefreshOptions,
        sink: &dyn ArtifactSink,
    ) -> Result<SyncOutcome> {
        enter(SyncPhase::Idle);
        let identity = adapter.identity();
        enter(SyncPhase::TablesResolved);

        let extraction = self.extractor.extract(adapter, &options.filter).await?;
        enter(SyncPhase::Extracted);

        let snapshot = crate::search::filter(
            &extraction.snapshot,
            options.keyword.as_deref(),
            options.mode,
        );
        let updated: Vec<String> = snapshot.table_names().map(str::to_string).collect();
        enter(SyncPhase::Replaced);

        self.finish(
            snapshot,
            identity,
            updated,
            Resolution::Replaced(ReplaceReason::FullRefresh),
            extraction.warnings,
            sink,
        )
        .await
    }

    fn resolve(
        &self,
        prior: PriorArtifact,
        partial: Snapshot,
        identity: &DatabaseIdentity,
        artifact: &Path,
    ) -> (Snapshot, Resolution) {
        match prior {
            PriorArtifact::Absent => {
                (partial, Resolution::Replaced(ReplaceReason::NoPriorArtifact))
            }
            PriorArtifact::Confirmed(prior) => (prior.merge(&partial), Resolution::Merged),
            PriorArtifact::Unconfirmed(prior) => {
                let context = IdentityMismatchContext {
                    expected: identity.clone(),
                    artifact: artifact.to_path_buf(),
                    prior_table_count: prior.len(),
                };
                if self.confirmation.confirm(&context) {
                    (prior.merge(&partial), Resolution::Merged)
                } else {
                    (
                        partial,
                        Resolution::Replaced(ReplaceReason::IdentityDeclined),
                    )
                }
            }
        }
    }

    async fn finish(
        &self,
        snapshot: Snapshot,
        identity: DatabaseIdentity,
        updated: Vec<String>,
        resolution: Resolution,
        warnings: Vec<DbCatalogError>,
        sink: &dyn ArtifactSink,
    ) -> Result<SyncOutcome> {
        let written = sink.render(&snapshot, &identity).await?;

        let state = SyncState::new(identity, &snapshot, updated);
        let state_error = match self.state_store.write(&state).await {
            Ok(()) => {
                enter(SyncPhase::Persisted);
                None
            }
            Err(e) => {
                tracing::error!("Artifacts were written but sync state was not: {}", e);
                Some(e)
            }
        };

        tracing::info!(
            "Catalog now holds {} tables ({:?}, {} warnings)",
            snapshot.len(),
            resolution,
            warnings.len()
        );
        Ok(SyncOutcome {
            snapshot,
            state,
            resolution,
            warnings,
            written,
            state_error,
        })
    }
}

/// Reads the prior artifact for `identity`.
///
/// # Errors
/// `Io` or `CorruptArtifact` from the codec; the caller degrades either to
/// a replaced catalog with a warning.
async fn load_prior(path: &Path, identity: &DatabaseIdentity) -> Result<PriorArtifact> {
    let prior = codec::decode(path, &identity.logical_name).await?;
    tracing::debug!("Prior artifact {} is {}", path.display(), prior.label());
    Ok(prior)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> IdentityMismatchContext {
        IdentityMismatchContext {
            expected: DatabaseIdentity {
                logical_name: "orders_db".into(),
                host: "localhost".into(),
                port: "5432".into(),
                user: "reader".into(),
            },
            artifact: PathBuf::from("out/index.html"),
            prior_table_count: 3,
        }
    }

    #[tokio::test]
    async fn test_load_prior_reports_decode_errors() {
        let dir = tempfile::tempdir().unwrap();
        let identity = context().expected;

        let missing = dir.path().join("index.html");
        assert_eq!(load_prior(&missing, &identity).await.unwrap(), PriorArtifact::Absent);

        std::fs::write(&missing, "<html>no catalog here</html>").unwrap();
        let err = load_prior(&missing, &identity).await.unwrap_err();
        assert!(matches!(err, DbCatalogError::CorruptArtifact { .. }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_default_policy_replaces() {
        assert!(!MismatchPolicy::default().confirm(&context()));
        assert!(MismatchPolicy::Merge.confirm(&context()));
    }

    #[test]
    fn test_mismatch_context_error() {
        let error = context().error();
        assert!(matches!(error, DbCatalogError::IdentityMismatch { ref expected } if expected == "orders_db"));
    }

    #[tokio::test]
    async fn test_resolve_tables_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("tables.txt");
        std::fs::write(&file, "# refresh\nusers\n").unwrap();
        let sync = Synchronizer::new(
            Extractor::default(),
            SyncStateStore::new(dir.path().join("state.json")),
        );

        let options = SyncOptions {
            tables_override: vec!["orders".into(), "orders".into()],
            tables_file: Some(file.clone()),
            prior_artifact: PathBuf::new(),
        };
        assert_eq!(sync.resolve_tables(&options).await.unwrap(), ["orders"]);

        let options = SyncOptions {
            tables_override: Vec::new(),
            tables_file: Some(file),
            prior_artifact: PathBuf::new(),
        };
        assert_eq!(sync.resolve_tables(&options).await.unwrap(), ["users"]);
    }

    #[tokio::test]
    async fn test_resolve_tables_none_specified() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("tables.txt");
        std::fs::write(&file, "# nothing yet\n\n").unwrap();
        let sync = Synchronizer::new(
            Extractor::default(),
            SyncStateStore::new(dir.path().join("state.json")),
        );
        let options = SyncOptions {
            tables_override: Vec::new(),
            tables_file: Some(file),
            prior_artifact: PathBuf::new(),
        };
        let err = sync.resolve_tables(&options).await.unwrap_err();
        assert!(matches!(err, DbCatalogError::NoTablesSpecified { .. }));
    }
}
