//! Artifact snapshot codec.
//!
//! Searchable artifacts are self-describing: they embed the snapshot they were
//! rendered from as a single JavaScript statement
//!
//! ```text
//! const schemaData = {"users": {"comment": "", "columns": [...]}};
//! ```
//!
//! and name their database in the `<title>` and first `<h1>` elements. This
//! module produces the embedded statement and recovers the snapshot and the
//! identity confirmation from a previously written artifact.

use crate::error::{DbCatalogError, Result};
use crate::models::Snapshot;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

/// Marks the start of the embedded data block.
pub const SNAPSHOT_SENTINEL: &str = "const schemaData =";

/// What was found at the prior-artifact location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PriorArtifact {
    /// No artifact exists yet
    Absent,
    /// The artifact names the expected database
    Confirmed(Snapshot),
    /// The artifact decoded but does not name the expected database
    Unconfirmed(Snapshot),
}

impl PriorArtifact {
    /// The decoded snapshot, if any.
    pub fn snapshot(&self) -> Option<&Snapshot> {
        match self {
            PriorArtifact::Absent => None,
            PriorArtifact::Confirmed(snapshot) | PriorArtifact::Unconfirmed(snapshot) => {
                Some(snapshot)
            }
        }
    }

    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            PriorArtifact::Absent => "absent",
            PriorArtifact::Confirmed(_) => "confirmed",
            PriorArtifact::Unconfirmed(_) => "unconfirmed",
        }
    }
}

/// Encodes `snapshot` as the embedded data statement.
///
/// `</` is written as `<\/` so the statement can sit inside a `<script>`
/// element; both spellings decode to the same JSON string.
///
/// # Errors
/// Returns `Serialization` if the snapshot cannot be encoded
pub fn encode_data_block(snapshot: &Snapshot) -> Result<String> {
    let json = serde_json::to_string(snapshot).map_err(|source| DbCatalogError::Serialization {
        context: "Failed to encode snapshot data block".to_string(),
        source,
    })?;
    Ok(format!("{} {};", SNAPSHOT_SENTINEL, json.replace("</", "<\\/")))
}

/// Reads the artifact at `path` and decodes its snapshot.
///
/// A missing file is `Absent`, not an error.
///
/// # Errors
/// - `Io` if the file exists but cannot be read
/// - `CorruptArtifact` if the data block cannot be recovered
pub async fn decode(path: &Path, expected_logical_name: &str) -> Result<PriorArtifact> {
    let text = match tokio::fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No prior artifact at {}", path.display());
            return Ok(PriorArtifact::Absent);
        }
        Err(e) => {
            return Err(DbCatalogError::io(
                format!("Failed to read prior artifact {}", path.display()),
                e,
            ));
        }
    };
    decode_str(&text, expected_logical_name)
}

/// Decodes artifact text already in memory.
///
/// # Errors
/// Returns `CorruptArtifact` if the data block is missing, unbalanced,
/// unterminated, duplicated, or not a snapshot.
pub fn decode_str(text: &str, expected_logical_name: &str) -> Result<PriorArtifact> {
    let block = locate_data_block(text)?;
    let snapshot: Snapshot = serde_json::from_str(block).map_err(|e| {
        DbCatalogError::corrupt_artifact(format!("data block is not a valid snapshot: {}", e))
    })?;

    if names_database(text, expected_logical_name) {
        Ok(PriorArtifact::Confirmed(snapshot))
    } else {
        tracing::debug!(
            "Artifact anchors do not name database '{}'",
            expected_logical_name
        );
        Ok(PriorArtifact::Unconfirmed(snapshot))
    }
}

/// Finds the JSON object following the sentinel.
fn locate_data_block(text: &str) -> Result<&str> {
    let (_, after_sentinel) = text
        .split_once(SNAPSHOT_SENTINEL)
        .ok_or_else(|| DbCatalogError::corrupt_artifact("data block sentinel not found"))?;

    let body = after_sentinel.trim_start();
    if !body.starts_with('{') {
        return Err(DbCatalogError::corrupt_artifact(
            "data block does not start with '{'",
        ));
    }

    let end = balanced_object_len(body)?;
    let (block, remainder) = body.split_at(end);

    if !remainder.trim_start().starts_with(';') {
        return Err(DbCatalogError::corrupt_artifact(
            "data block is not terminated by ';'",
        ));
    }
    if remainder.contains(SNAPSHOT_SENTINEL) {
        return Err(DbCatalogError::corrupt_artifact(
            "data block appears more than once",
        ));
    }
    Ok(block)
}

/// Length of the JSON object at the start of `body`, found by counting brace
/// depth outside string literals.
fn balanced_object_len(body: &str) -> Result<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (end, byte) in (1usize..).zip(body.bytes()) {
        if in_string {
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' => depth = depth.saturating_add(1),
            b'}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Ok(end);
                }
            }
            _ => {}
        }
    }

    Err(DbCatalogError::corrupt_artifact(
        "data block is unterminated (unbalanced braces)",
    ))
}

struct AnchorPatterns {
    title: Regex,
    heading: Regex,
    tag: Regex,
}

impl AnchorPatterns {
    // Literal patterns, exercised by every identity test below
    #[allow(clippy::expect_used)]
    fn instance() -> &'static Self {
        static PATTERNS: OnceLock<AnchorPatterns> = OnceLock::new();
        PATTERNS.get_or_init(|| AnchorPatterns {
            title: Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("Invalid title pattern"),
            heading: Regex::new(r"(?is)<h1[^>]*>(.*?)</h1>").expect("Invalid heading pattern"),
            tag: Regex::new(r"<[^>]*>").expect("Invalid tag pattern"),
        })
    }
}

/// Returns true if the title or first heading ends with `name` as a whole
/// token.
fn names_database(text: &str, name: &str) -> bool {
    if name.is_empty() {
        return false;
    }
    let patterns = AnchorPatterns::instance();
    [&patterns.title, &patterns.heading]
        .into_iter()
        .filter_map(|pattern| pattern.captures(text))
        .filter_map(|captures| captures.get(1))
        .any(|anchor| {
            let plain = patterns.tag.replace_all(anchor.as_str(), "");
            ends_with_token(&unescape_html(&plain), name)
        })
}

fn is_token_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '$')
}

fn ends_with_token(anchor: &str, name: &str) -> bool {
    let anchor = anchor.trim();
    match anchor.strip_suffix(name) {
        Some(prefix) => !prefix.chars().next_back().is_some_and(is_token_char),
        None => false,
    }
}

fn unescape_html(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#34;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&amp;", "&")
}
