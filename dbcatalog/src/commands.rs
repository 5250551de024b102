//! Command handlers.

use crate::config::{CatalogConfig, DEFAULT_CONFIG_FILE, prompt_for_password};
use crate::prompt::TerminalConfirmation;
use crate::render::{CatalogSink, OutputFormat, RenderSettings};
use crate::{Cli, Command, ConnectionArgs, GenerateArgs, OnMismatch, OutputArgs, StatusArgs, SyncArgs};
use anyhow::{Context, Result};
use dbcatalog_core::adapters::{ConnectionConfig, DatabaseAdapter, Dialect, create_adapter};
use dbcatalog_core::sync::{
    MergeConfirmation, MismatchPolicy, RefreshOptions, SyncOptions, SyncOutcome, SyncStateStore,
    Synchronizer,
};
use dbcatalog_core::{DbCatalogError, Extractor, TableFilter};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Runs the parsed command.
///
/// # Errors
/// Returns any fatal error; non-fatal warnings are logged
pub async fn run(cli: Cli, cancel: CancellationToken) -> Result<ExitCode> {
    let config_path = cli
        .global
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    let config = CatalogConfig::load(&config_path, cli.global.config.is_some())
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    let session = Session {
        config,
        env: cli.global.env,
        database_url: cli.global.database_url,
        cancel,
    };

    match cli.command {
        Command::Generate(args) => session.generate(&args).await,
        Command::Sync(args) => session.sync(&args).await,
        Command::Status(args) => session.status(&args).await,
        Command::TestConnection(args) => session.test_connection(&args).await,
        Command::ListEnv => {
            list_environments(&session.config);
            Ok(ExitCode::SUCCESS)
        }
        Command::List => {
            list_dialects();
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Everything resolved before a command runs.
struct Session {
    config: CatalogConfig,
    env: Option<String>,
    database_url: Option<String>,
    cancel: CancellationToken,
}

impl Session {
    async fn connect(&self, args: &ConnectionArgs) -> Result<Box<dyn DatabaseAdapter>> {
        let descriptor = self
            .config
            .resolve_connection(self.env.as_deref(), self.database_url.as_deref())?;
        let descriptor = prompt_for_password(descriptor)?;

        let mut connection = ConnectionConfig::default().with_timeouts(
            Duration::from_secs(args.connect_timeout),
            Duration::from_secs(args.query_timeout),
        );
        if let Some(concurrency) = args.concurrency {
            let max = u32::try_from(concurrency.clamp(1, 64)).unwrap_or(64);
            connection = connection.with_max_connections(max);
        }

        create_adapter(&descriptor, &connection)
            .await
            .with_context(|| format!("Failed to set up {} adapter for {}", descriptor.dialect, descriptor))
    }

    fn extractor(&self, args: &ConnectionArgs) -> Extractor {
        let mut extractor = Extractor::new()
            .with_query_timeout(Duration::from_secs(args.query_timeout))
            .with_connect_timeout(Duration::from_secs(args.connect_timeout))
            .with_cancellation(self.cancel.clone());
        if let Some(concurrency) = args.concurrency {
            extractor = extractor.with_concurrency(concurrency);
        }
        extractor
    }

    fn state_store(&self, output: &OutputArgs) -> SyncStateStore {
        let latest = output
            .state_file
            .clone()
            .unwrap_or_else(|| self.config.sync.state_file.clone());
        let store = SyncStateStore::new(latest);
        match output
            .history_file
            .clone()
            .or_else(|| self.config.sync.history_file.clone())
        {
            Some(history) => store.with_history(history),
            None => store,
        }
    }

    fn render_settings(&self, adapter: &dyn DatabaseAdapter, output: &OutputArgs) -> RenderSettings {
        let mut settings = self
            .config
            .render_settings(&adapter.identity(), output.output.as_deref());
        if let Some(filename) = &output.filename {
            settings.filename.clone_from(filename);
        }
        if let Some(max) = output.max_tables_per_file {
            settings.max_tables_per_file = max.max(1);
        }
        settings
    }

    fn format(&self, output: &OutputArgs) -> OutputFormat {
        output.format.unwrap_or(self.config.output.format)
    }

    async fn generate(&self, args: &GenerateArgs) -> Result<ExitCode> {
        let adapter = self.connect(&args.connection).await?;
        let settings = self.render_settings(adapter.as_ref(), &args.output);
        let sink = CatalogSink::new(vec![self.format(&args.output)], settings);
        let synchronizer = Synchronizer::new(
            self.extractor(&args.connection),
            self.state_store(&args.output),
        );

        let filter = TableFilter {
            include: (!args.include_tables.is_empty()).then(|| args.include_tables.clone()),
            exclude: args.exclude_tables.clone(),
        };
        let options = RefreshOptions {
            filter,
            keyword: args.search.clone(),
            mode: args.search_mode,
        };

        let outcome = synchronizer
            .refresh_all(adapter.as_ref(), &options, &sink)
            .await
            .context("Catalog generation failed")?;
        Ok(report(&outcome))
    }

    async fn sync(&self, args: &SyncArgs) -> Result<ExitCode> {
        let adapter = self.connect(&args.connection).await?;
        let settings = self.render_settings(adapter.as_ref(), &args.output);
        let prior_artifact = settings.searchable_path();
        let sink = CatalogSink::for_sync(self.format(&args.output), settings);

        let synchronizer = Synchronizer::new(
            self.extractor(&args.connection),
            self.state_store(&args.output),
        )
        .with_confirmation(confirmation(args.on_mismatch));

        let options = SyncOptions {
            tables_override: args.tables.clone(),
            tables_file: Some(
                args.tables_file
                    .clone()
                    .unwrap_or_else(|| self.config.sync.tables_file.clone()),
            ),
            prior_artifact,
        };

        let outcome = synchronizer
            .run(adapter.as_ref(), &options, &sink)
            .await
            .context("Incremental sync failed")?;
        Ok(report(&outcome))
    }

    async fn status(&self, args: &StatusArgs) -> Result<ExitCode> {
        let output = OutputArgs {
            format: None,
            output: None,
            filename: None,
            max_tables_per_file: None,
            state_file: args.state_file.clone(),
            history_file: args.history_file.clone(),
        };
        let store = self.state_store(&output);

        let Some(state) = store.read_latest().await? else {
            println!(
                "No sync state at {}; run `dbcatalog generate` first.",
                store.latest_path().display()
            );
            return Ok(ExitCode::SUCCESS);
        };

        if args.json {
            let json = serde_json::to_string_pretty(&state).context("Failed to encode sync state")?;
            println!("{}", json);
            return Ok(ExitCode::SUCCESS);
        }

        println!("Database:     {}", state.identity);
        println!("Completed:    {}", state.timestamp.to_rfc3339());
        println!("Tables:       {}", state.total_table_count);
        println!(
            "Refreshed:    {}",
            state
                .updated_table_names
                .iter()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        );
        if store.history_path().is_some() {
            let history = store.read_history().await?;
            println!("History:      {} runs", history.len());
        }
        Ok(ExitCode::SUCCESS)
    }

    async fn test_connection(&self, args: &ConnectionArgs) -> Result<ExitCode> {
        let adapter = self.connect(args).await?;
        let timeout = Duration::from_secs(args.connect_timeout);
        let identity = adapter.identity();

        let result = match tokio::time::timeout(timeout, adapter.test_connection()).await {
            Ok(result) => result,
            Err(_) => Err(DbCatalogError::connection_timeout(identity.to_string(), timeout)),
        };
        match result {
            Ok(()) => {
                println!("Connection to {} ({}) succeeded", identity, adapter.dialect());
                Ok(ExitCode::SUCCESS)
            }
            Err(e) => {
                println!("Connection to {} failed: {}", identity, e);
                Ok(ExitCode::FAILURE)
            }
        }
    }
}

/// Picks the merge confirmation strategy for a sync run.
fn confirmation(choice: Option<OnMismatch>) -> Box<dyn MergeConfirmation> {
    let interactive = std::io::stdin().is_terminal();
    match choice {
        Some(OnMismatch::Merge) => Box::new(MismatchPolicy::Merge),
        Some(OnMismatch::Replace) => Box::new(MismatchPolicy::Replace),
        Some(OnMismatch::Prompt) if interactive => Box::new(TerminalConfirmation),
        None if interactive => Box::new(TerminalConfirmation),
        Some(OnMismatch::Prompt) | None => {
            tracing::debug!("No terminal available; an unconfirmed catalog will be replaced");
            Box::new(MismatchPolicy::Replace)
        }
    }
}

/// Logs warnings and written files; fails if sync state was not recorded.
fn report(outcome: &SyncOutcome) -> ExitCode {
    for warning in &outcome.warnings {
        tracing::warn!("{}", warning);
    }
    for path in &outcome.written {
        println!("Wrote {}", path.display());
    }
    println!(
        "{} tables in catalog, {} refreshed, {} warnings",
        outcome.state.total_table_count,
        outcome.state.updated_table_names.len(),
        outcome.warnings.len()
    );

    match &outcome.state_error {
        Some(e) => {
            tracing::error!("Sync state was not recorded: {}", e);
            ExitCode::FAILURE
        }
        None => ExitCode::SUCCESS,
    }
}

fn list_environments(config: &CatalogConfig) {
    let default = config.default_environment();
    let names: Vec<&str> = config.environment_names().collect();
    if names.is_empty() {
        if config.database.is_some() {
            println!("No environments configured; the [database] section is used.");
        } else {
            println!("No environments configured.");
        }
        return;
    }
    println!("Configured environments:");
    for name in names {
        let marker = if Some(name) == default { " (default)" } else { "" };
        println!("  {}{}", name, marker);
    }
}

fn list_dialects() {
    println!("Supported database types:");
    for dialect in Dialect::ALL {
        let example = match dialect {
            Dialect::Sqlite => "sqlite:///path/to/database.db".to_string(),
            other => format!("{}://user:pass@host:{}/database", other.scheme(), other.default_port().unwrap_or_default()),
        };
        let status = if dialect.is_enabled() {
            String::new()
        } else {
            format!(" [requires --features {}]", dialect.feature())
        };
        println!("  {:<12} {}{}", dialect.as_str(), example, status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_mismatch_choices() {
        let context = dbcatalog_core::sync::IdentityMismatchContext {
            expected: dbcatalog_core::DatabaseIdentity {
                logical_name: "shop".to_string(),
                host: "localhost".to_string(),
                port: String::new(),
                user: String::new(),
            },
            artifact: PathBuf::from("index.html"),
            prior_table_count: 1,
        };
        assert!(confirmation(Some(OnMismatch::Merge)).confirm(&context));
        assert!(!confirmation(Some(OnMismatch::Replace)).confirm(&context));
    }
}
