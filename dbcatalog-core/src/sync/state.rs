//! Sync state persistence.
//!
//! The latest record is a pretty-printed JSON document that each run
//! overwrites; the optional history file receives one compact JSON line per
//! run.

use crate::error::{DbCatalogError, Result};
use crate::models::SyncState;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Where sync state records are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStateStore {
    latest: PathBuf,
    history: Option<PathBuf>,
}

impl SyncStateStore {
    /// Creates a store writing only the latest record.
    pub fn new(latest: impl Into<PathBuf>) -> Self {
        Self {
            latest: latest.into(),
            history: None,
        }
    }

    /// Builder method to also append every record to a JSON-lines history.
    pub fn with_history(mut self, history: impl Into<PathBuf>) -> Self {
        self.history = Some(history.into());
        self
    }

    /// Path of the latest-state document.
    pub fn latest_path(&self) -> &Path {
        &self.latest
    }

    /// Path of the history file, if configured.
    pub fn history_path(&self) -> Option<&Path> {
        self.history.as_deref()
    }

    /// Writes `state` as the latest record and appends it to the history.
    ///
    /// # Errors
    /// Returns `Serialization` or `Io` on failure
    pub async fn write(&self, state: &SyncState) -> Result<()> {
        let document = serde_json::to_string_pretty(state).map_err(|source| {
            DbCatalogError::Serialization {
                context: "Failed to encode sync state".to_string(),
                source,
            }
        })?;
        ensure_parent(&self.latest).await?;

        let temp = self.latest.with_extension("json.tmp");
        tokio::fs::write(&temp, document.as_bytes())
            .await
            .map_err(|e| DbCatalogError::io(format!("Failed to write {}", temp.display()), e))?;
        tokio::fs::rename(&temp, &self.latest).await.map_err(|e| {
            DbCatalogError::io(format!("Failed to replace {}", self.latest.display()), e)
        })?;

        if let Some(history) = &self.history {
            let mut line = serde_json::to_string(state).map_err(|source| {
                DbCatalogError::Serialization {
                    context: "Failed to encode sync history entry".to_string(),
                    source,
                }
            })?;
            line.push('\n');
            ensure_parent(history).await?;

            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(history)
                .await
                .map_err(|e| DbCatalogError::io(format!("Failed to open {}", history.display()), e))?;
            file.write_all(line.as_bytes())
                .await
                .map_err(|e| DbCatalogError::io(format!("Failed to append to {}", history.display()), e))?;
            file.flush()
                .await
                .map_err(|e| DbCatalogError::io(format!("Failed to flush {}", history.display()), e))?;
        }

        tracing::debug!("Sync state written to {}", self.latest.display());
        Ok(())
    }

    /// Reads the latest record; `None` if no run has completed yet.
    ///
    /// # Errors
    /// Returns `Io` or `Serialization` if the file exists but is unreadable
    pub async fn read_latest(&self) -> Result<Option<SyncState>> {
        let text = match tokio::fs::read_to_string(&self.latest).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(DbCatalogError::io(
                    format!("Failed to read {}", self.latest.display()),
                    e,
                ));
            }
        };
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|source| DbCatalogError::Serialization {
                context: format!("Invalid sync state in {}", self.latest.display()),
                source,
            })
    }

    /// Reads every history entry in write order; empty if no history exists.
    ///
    /// # Errors
    /// Returns `Io` or `Serialization` on an unreadable file or line
    pub async fn read_history(&self) -> Result<Vec<SyncState>> {
        let Some(history) = &self.history else {
            return Ok(Vec::new());
        };
        let text = match tokio::fs::read_to_string(history).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(DbCatalogError::io(
                    format!("Failed to read {}", history.display()),
                    e,
                ));
            }
        };
        text.lines()
            .filter(|line| !line.trim().is_empty())
            .enumerate()
            .map(|(i, line)| {
                serde_json::from_str(line).map_err(|source| DbCatalogError::Serialization {
                    context: format!("Invalid history entry {} in {}", i.saturating_add(1), history.display()),
                    source,
                })
            })
            .collect()
    }
}

async fn ensure_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| DbCatalogError::io(format!("Failed to create {}", parent.display()), e)),
        _ => Ok(()),
    }
}
