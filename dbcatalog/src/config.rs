//! TOML configuration and connection resolution.
//!
//! A configuration file either describes one database in `[database]` or
//! several named ones under `[environments.<name>]`. The database used for a
//! run is chosen by, in order: an explicit database URL, `--env`,
//! `[environment].default`, and finally `[database]`.

use crate::render::{OutputFormat, RenderSettings};
use dbcatalog_core::adapters::{ConnectionDescriptor, Dialect};
use dbcatalog_core::{DatabaseIdentity, DbCatalogError, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "dbcatalog.toml";

/// Parsed configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CatalogConfig {
    #[serde(default)]
    pub environment: EnvironmentSection,
    pub database: Option<DatabaseSection>,
    #[serde(default)]
    pub environments: BTreeMap<String, DatabaseSection>,
    #[serde(default)]
    pub output: OutputSection,
    #[serde(default)]
    pub sync: SyncSection,
}

/// `[environment]`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnvironmentSection {
    pub default: Option<String>,
}

/// One database, from `[database]` or `[environments.<name>]`.
#[derive(Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseSection {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub host: String,
    pub port: Option<u16>,
    pub database: String,
    #[serde(default)]
    pub user: String,
    pub password: Option<String>,
    pub driver: Option<String>,
}

impl std::fmt::Debug for DatabaseSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseSection")
            .field("kind", &self.kind)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "****"))
            .field("driver", &self.driver)
            .finish()
    }
}

impl DatabaseSection {
    /// Converts the section into a connection descriptor.
    ///
    /// # Errors
    /// Returns `Configuration` for an unknown type or missing fields
    pub fn to_descriptor(&self) -> Result<ConnectionDescriptor> {
        let dialect: Dialect = self.kind.parse()?;
        let mut descriptor = ConnectionDescriptor::new(dialect, &self.host, &self.database)
            .with_user(&self.user);
        if let Some(port) = self.port {
            descriptor = descriptor.with_port(port);
        }
        if let Some(password) = &self.password {
            descriptor = descriptor.with_password(password.as_str());
        }
        if let Some(driver) = &self.driver {
            descriptor = descriptor.with_driver(driver.as_str());
        }
        descriptor.validate()?;
        Ok(descriptor)
    }
}

/// `[output]`
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct OutputSection {
    pub format: OutputFormat,
    /// Base name of the artifacts; empty means `<host>_<database>`
    pub filename: String,
    /// Directory artifacts are written under
    pub directory: PathBuf,
    /// Tables per HTML page and per Excel workbook
    pub max_tables_per_file: usize,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            filename: String::new(),
            directory: PathBuf::from("."),
            max_tables_per_file: 50,
        }
    }
}

/// `[sync]`
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SyncSection {
    pub tables_file: PathBuf,
    pub state_file: PathBuf,
    pub history_file: Option<PathBuf>,
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            tables_file: PathBuf::from("tables.txt"),
            state_file: PathBuf::from("sync_state.json"),
            history_file: None,
        }
    }
}

impl CatalogConfig {
    /// Parses configuration text.
    ///
    /// # Errors
    /// Returns `Configuration` with the TOML error on invalid input
    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text)
            .map_err(|e| DbCatalogError::configuration(format!("Invalid configuration: {}", e)))
    }

    /// Loads the configuration file.
    ///
    /// A missing file is only an error when the path was given explicitly;
    /// otherwise an empty configuration is returned so that a database URL
    /// alone is enough to run.
    ///
    /// # Errors
    /// Returns `Io` or `Configuration` on failure
    pub fn load(path: &Path, explicit: bool) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => {
                tracing::debug!("Loaded configuration from {}", path.display());
                Self::parse(&text)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !explicit => {
                tracing::debug!("No configuration file at {}", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(DbCatalogError::io(
                format!("Failed to read configuration {}", path.display()),
                e,
            )),
        }
    }

    /// Configured environment names in sorted order.
    pub fn environment_names(&self) -> impl Iterator<Item = &str> {
        self.environments.keys().map(String::as_str)
    }

    /// The default environment, if multi-environment mode is enabled.
    pub fn default_environment(&self) -> Option<&str> {
        self.environment.default.as_deref()
    }

    /// Selects the database section for a run.
    ///
    /// Returns the environment name used (if any) with its section.
    ///
    /// # Errors
    /// Returns `Configuration` if the named environment does not exist or
    /// nothing is configured
    pub fn select<'a>(&'a self, env: Option<&'a str>) -> Result<(Option<&'a str>, &'a DatabaseSection)> {
        if let Some(name) = env.or(self.default_environment()) {
            let section = self.environments.get(name).ok_or_else(|| {
                let known: Vec<&str> = self.environment_names().collect();
                DbCatalogError::configuration(format!(
                    "Environment '{}' is not configured (available: {})",
                    name,
                    if known.is_empty() {
                        "none".to_string()
                    } else {
                        known.join(", ")
                    }
                ))
            })?;
            return Ok((Some(name), section));
        }

        self.database.as_ref().map(|section| (None, section)).ok_or_else(|| {
            DbCatalogError::configuration(
                "No database configured: add a [database] section, configure environments, \
                 or pass --database-url",
            )
        })
    }

    /// Resolves the connection for a run; `database_url` wins over the file.
    ///
    /// # Errors
    /// Returns `Configuration` on an invalid URL or selection
    pub fn resolve_connection(
        &self,
        env: Option<&str>,
        database_url: Option<&str>,
    ) -> Result<ConnectionDescriptor> {
        if let Some(url) = database_url {
            tracing::debug!(
                "Using connection from database URL {}",
                dbcatalog_core::error::redact_database_url(url)
            );
            return ConnectionDescriptor::from_url(url);
        }
        let (name, section) = self.select(env)?;
        if let Some(name) = name {
            tracing::info!("Using environment '{}'", name);
        }
        section.to_descriptor()
    }

    /// Render settings for `identity`, with an optional directory override.
    pub fn render_settings(&self, identity: &DatabaseIdentity, output_dir: Option<&Path>) -> RenderSettings {
        let filename = if self.output.filename.trim().is_empty() {
            default_filename(identity)
        } else {
            self.output.filename.trim().to_string()
        };
        RenderSettings {
            output_dir: output_dir.map_or_else(|| self.output.directory.clone(), Path::to_path_buf),
            filename,
            max_tables_per_file: self.output.max_tables_per_file.max(1),
        }
    }
}

/// `<host>_<database>` with dots replaced, e.g. `db_internal_orders_db`.
pub fn default_filename(identity: &DatabaseIdentity) -> String {
    format!("{}_{}", identity.host, identity.logical_name).replace('.', "_")
}

/// Prompts for a missing password when stdin is a terminal.
///
/// SQLite never needs one, and a non-interactive run proceeds without a
/// password so the server can decide.
///
/// # Errors
/// Returns `Configuration` if the terminal prompt fails
pub fn prompt_for_password(descriptor: ConnectionDescriptor) -> Result<ConnectionDescriptor> {
    if descriptor.dialect == Dialect::Sqlite
        || descriptor.has_password()
        || !std::io::stdin().is_terminal()
    {
        return Ok(descriptor);
    }
    let prompt = format!("Password for {}: ", descriptor);
    let password = rpassword::prompt_password(prompt).map_err(|e| {
        DbCatalogError::configuration(format!("Failed to read password: {}", e))
    })?;
    Ok(descriptor.with_password(password))
}
