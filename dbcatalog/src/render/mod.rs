//! Artifact rendering.
//!
//! Each output format turns a [`Snapshot`] into one or more files under the
//! output directory. Every file is written to a temporary sibling first and
//! renamed into place, so a failed run never leaves a half-written artifact
//! where the next incremental run would look for its prior snapshot.

pub mod csv;
pub mod excel;
pub mod html;
pub mod markdown;

use async_trait::async_trait;
use dbcatalog_core::sync::ArtifactSink;
use dbcatalog_core::{DatabaseIdentity, DbCatalogError, Result, Snapshot};
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

/// Markdown documents above this many tables get unwieldy.
const MARKDOWN_TABLE_WARNING: usize = 100;

/// Supported artifact formats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    /// Single Markdown document
    Markdown,
    /// Excel workbooks, one sheet per table
    Excel,
    /// One CSV file per table
    Csv,
    /// Paginated static HTML
    Html,
    /// Single-page HTML with client-side search; carries the snapshot
    #[default]
    #[serde(alias = "interactive-html")]
    #[value(alias = "interactive-html")]
    SearchableHtml,
}

impl OutputFormat {
    /// Boundary spelling of the format.
    pub fn as_str(self) -> &'static str {
        match self {
            OutputFormat::Markdown => "markdown",
            OutputFormat::Excel => "excel",
            OutputFormat::Csv => "csv",
            OutputFormat::Html => "html",
            OutputFormat::SearchableHtml => "searchable-html",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where and how artifacts are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderSettings {
    /// Directory every artifact is written under
    pub output_dir: PathBuf,
    /// Base name shared by every artifact of one database
    pub filename: String,
    /// Tables per HTML page and per Excel workbook
    pub max_tables_per_file: usize,
}

impl RenderSettings {
    /// Markdown document path.
    pub fn markdown_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}.md", self.filename))
    }

    /// Directory receiving one CSV per table.
    pub fn csv_dir(&self) -> PathBuf {
        self.output_dir.join(format!("{}_csvs", self.filename))
    }

    /// Directory receiving the paginated HTML pages.
    pub fn html_dir(&self) -> PathBuf {
        self.output_dir.join(format!("{}_html", self.filename))
    }

    /// The searchable artifact, which is also the prior artifact of the next
    /// incremental run.
    pub fn searchable_path(&self) -> PathBuf {
        self.output_dir
            .join(format!("{}_interactive", self.filename))
            .join("index.html")
    }
}

/// Renders `snapshot` in `format` and returns the files written.
///
/// # Errors
/// Returns `Render` on a template failure and `Io` on a write failure
pub async fn render(
    format: OutputFormat,
    snapshot: &Snapshot,
    identity: &DatabaseIdentity,
    settings: &RenderSettings,
) -> Result<Vec<PathBuf>> {
    let database = identity.logical_name.as_str();
    let mut written = Vec::new();

    match format {
        OutputFormat::Markdown => {
            if snapshot.len() > MARKDOWN_TABLE_WARNING {
                tracing::warn!(
                    "Markdown output with {} tables may be hard to navigate; consider html or searchable-html",
                    snapshot.len()
                );
            }
            let path = settings.markdown_path();
            write_atomic(&path, markdown::render_markdown(snapshot, database)).await?;
            written.push(path);
        }
        OutputFormat::Excel => {
            for (name, workbook) in excel::render_workbooks(
                snapshot,
                &settings.filename,
                settings.max_tables_per_file,
            )? {
                let path = settings.output_dir.join(name);
                write_atomic(&path, &workbook).await?;
                written.push(path);
            }
        }
        OutputFormat::Csv => {
            let dir = settings.csv_dir();
            let mut stems = FileStems::default();
            for table in snapshot.tables() {
                let path = dir.join(format!("{}.csv", stems.assign(&table.name)));
                write_atomic(&path, csv::render_table(table)).await?;
                written.push(path);
            }
        }
        OutputFormat::Html => {
            let dir = settings.html_dir();
            for (name, page) in html::render_pages(snapshot, database, settings.max_tables_per_file)? {
                let path = dir.join(name);
                write_atomic(&path, page).await?;
                written.push(path);
            }
        }
        OutputFormat::SearchableHtml => {
            let path = settings.searchable_path();
            write_atomic(&path, html::render_searchable(snapshot, database)?).await?;
            written.push(path);
        }
    }

    tracing::info!(
        "Rendered {} tables as {} ({} files)",
        snapshot.len(),
        format,
        written.len()
    );
    Ok(written)
}

/// Writes `contents` next to `path` and renames it into place.
///
/// # Errors
/// Returns `Io` if the directory, the temporary file or the rename fails
pub async fn write_atomic(path: &Path, contents: impl AsRef<[u8]>) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| DbCatalogError::io(format!("Failed to create {}", parent.display()), e))?;
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| DbCatalogError::configuration(format!("{} is not a file path", path.display())))?;
    let temp = path.with_file_name(format!(".{}.tmp", file_name));

    tokio::fs::write(&temp, contents.as_ref())
        .await
        .map_err(|e| DbCatalogError::io(format!("Failed to write {}", temp.display()), e))?;
    if let Err(e) = tokio::fs::rename(&temp, path).await {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(DbCatalogError::io(
            format!("Failed to replace {}", path.display()),
            e,
        ));
    }
    tracing::debug!("Wrote {}", path.display());
    Ok(())
}

/// Table names become file names; path separators must not.
fn file_stem(table: &str) -> String {
    table
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
        .collect()
}

/// File stems handed out within one directory. Two tables whose stems
/// collide, even only by case, get `_2`, `_3`, ... appended.
#[derive(Debug, Default)]
struct FileStems {
    used: HashSet<String>,
}

impl FileStems {
    fn assign(&mut self, table: &str) -> String {
        let base = file_stem(table);
        let mut stem = base.clone();
        let mut suffix = 1usize;
        while !self.used.insert(stem.to_lowercase()) {
            suffix = suffix.saturating_add(1);
            stem = format!("{}_{}", base, suffix);
        }
        if stem != base {
            tracing::warn!("Table '{}' written as {}.csv to avoid a name collision", table, stem);
        }
        stem
    }
}

/// [`ArtifactSink`] writing one or more formats.
#[derive(Debug, Clone)]
pub struct CatalogSink {
    formats: Vec<OutputFormat>,
    settings: RenderSettings,
}

impl CatalogSink {
    /// Creates a sink for `formats`, rendered in the given order.
    pub fn new(formats: Vec<OutputFormat>, settings: RenderSettings) -> Self {
        Self { formats, settings }
    }

    /// Sink for incremental runs: the searchable artifact is always
    /// refreshed, plus `format` when it differs.
    pub fn for_sync(format: OutputFormat, settings: RenderSettings) -> Self {
        let mut formats = vec![OutputFormat::SearchableHtml];
        if format != OutputFormat::SearchableHtml {
            formats.push(format);
        }
        Self::new(formats, settings)
    }

    /// Where this sink writes.
    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }
}

#[async_trait]
impl ArtifactSink for CatalogSink {
    async fn render(&self, snapshot: &Snapshot, identity: &DatabaseIdentity) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();
        for format in &self.formats {
            written.extend(render(*format, snapshot, identity, &self.settings).await?);
        }
        Ok(written)
    }
}

/// Cell text shared by the tabular formats.
pub(crate) fn nullable_text(nullable: bool) -> &'static str {
    if nullable { "YES" } else { "NO" }
}

/// Cell text for a default; absent defaults read `NULL`.
pub(crate) fn default_text(default_literal: Option<&str>) -> &str {
    default_literal.unwrap_or("NULL")
}
