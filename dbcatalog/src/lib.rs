//! Command-line front end for dbcatalog.
//!
//! Generates a data dictionary for one database and keeps it current with
//! incremental refreshes. The binary in `main.rs` only parses arguments,
//! sets up logging and cancellation, and hands over to [`commands::run`].
//!
//! # Security Guarantees
//! - Read-only database operations only
//! - Passwords are prompted without echo and never logged
//! - Database URLs are redacted before they reach any log line

pub mod commands;
pub mod config;
pub mod prompt;
pub mod render;

use clap::{Args, Parser, Subcommand, ValueEnum};
use dbcatalog_core::SearchMode;
use render::OutputFormat;
use std::path::PathBuf;

/// CLI argument structure
#[derive(Debug, Parser)]
#[command(name = "dbcatalog")]
#[command(about = "Database data dictionary generator with incremental refresh")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = "
dbcatalog - data dictionaries for relational databases

Extracts tables, columns and their comments from a live database and renders
them as Markdown, CSV, paginated HTML or a single searchable HTML page. The
searchable page embeds the catalog it was built from, so `sync` can refresh a
handful of tables and merge them into the existing dictionary.

SUPPORTED DATABASES:
- MySQL / MariaDB (mysql://)
- PostgreSQL (postgres://)
- SQLite (sqlite:// or .db/.sqlite files)
- SQL Server (mssql://) [if compiled with --features mssql]
- Oracle (oracle://) [if compiled with --features oracle]

EXAMPLES:
  dbcatalog generate --format searchable-html
  dbcatalog --env prod generate --exclude-tables audit_log
  dbcatalog sync --tables orders,order_items
  dbcatalog --database-url sqlite://app.db generate --format markdown
")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Options accepted by every command.
#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// Increase verbosity
    #[arg(
        short,
        long,
        global = true,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v, -vv)"
    )]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true, help = "Suppress all output except errors")]
    pub quiet: bool,

    /// Configuration file
    #[arg(
        short,
        long,
        global = true,
        value_name = "FILE",
        help = "Configuration file (default: dbcatalog.toml)"
    )]
    pub config: Option<PathBuf>,

    /// Environment to use from the configuration file
    #[arg(short, long, global = true, value_name = "NAME")]
    pub env: Option<String>,

    /// Database connection URL
    #[arg(
        long,
        global = true,
        env = "DATABASE_URL",
        hide_env_values = true,
        help = "Database connection string; overrides the configuration file (credentials are redacted in logs)"
    )]
    pub database_url: Option<String>,
}

/// Available commands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Extract every table and render the full catalog
    Generate(GenerateArgs),
    /// Refresh selected tables and merge them into the existing catalog
    Sync(SyncArgs),
    /// Show the latest sync state
    Status(StatusArgs),
    /// Check that the database is reachable
    TestConnection(ConnectionArgs),
    /// List environments from the configuration file
    ListEnv,
    /// List supported database types
    List,
}

/// Connection timing and concurrency.
#[derive(Debug, Clone, Args)]
pub struct ConnectionArgs {
    /// Per-query timeout in seconds
    #[arg(long, default_value_t = 30, value_name = "SECONDS")]
    pub query_timeout: u64,

    /// Connectivity check timeout in seconds
    #[arg(long, default_value_t = 30, value_name = "SECONDS")]
    pub connect_timeout: u64,

    /// Tables extracted at once (default: connection pool size)
    #[arg(long, value_name = "N")]
    pub concurrency: Option<usize>,
}

/// Where artifacts go.
#[derive(Debug, Clone, Args)]
pub struct OutputArgs {
    /// Output format (default from configuration, else searchable-html)
    #[arg(short, long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Output directory
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Base name of the artifacts (default: <host>_<database>)
    #[arg(long, value_name = "NAME")]
    pub filename: Option<String>,

    /// Tables per page for paginated HTML and per Excel workbook
    #[arg(long, value_name = "N")]
    pub max_tables_per_file: Option<usize>,

    /// Sync state file (default from configuration)
    #[arg(long, value_name = "FILE")]
    pub state_file: Option<PathBuf>,

    /// Append every sync state to this JSON-lines file
    #[arg(long, value_name = "FILE")]
    pub history_file: Option<PathBuf>,
}

/// Options for a full catalog run.
#[derive(Debug, Args)]
pub struct GenerateArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[command(flatten)]
    pub output: OutputArgs,

    /// Only extract these tables
    #[arg(long, value_delimiter = ',', value_name = "TABLES")]
    pub include_tables: Vec<String>,

    /// Skip these tables
    #[arg(long, value_delimiter = ',', value_name = "TABLES")]
    pub exclude_tables: Vec<String>,

    /// Keep only tables matching this keyword
    #[arg(long, value_name = "KEYWORD")]
    pub search: Option<String>,

    /// Fields the keyword is matched against
    #[arg(long, default_value = "all", value_name = "MODE")]
    pub search_mode: SearchMode,
}

/// What to do when the existing catalog names another database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OnMismatch {
    /// Ask on the terminal
    Prompt,
    /// Discard the existing catalog
    Replace,
    /// Merge into it anyway
    Merge,
}

/// Options for an incremental run over selected tables.
#[derive(Debug, Args)]
pub struct SyncArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[command(flatten)]
    pub output: OutputArgs,

    /// Tables to refresh; takes precedence over the tables file
    #[arg(short, long, value_delimiter = ',', value_name = "TABLES")]
    pub tables: Vec<String>,

    /// File listing tables to refresh, one per line
    #[arg(long, value_name = "FILE")]
    pub tables_file: Option<PathBuf>,

    /// Existing catalog names another database (default: prompt on a terminal, otherwise replace)
    #[arg(long, value_enum)]
    pub on_mismatch: Option<OnMismatch>,
}

/// Options for reporting the last recorded run.
#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Sync state file (default from configuration)
    #[arg(long, value_name = "FILE")]
    pub state_file: Option<PathBuf>,

    /// Also summarize this JSON-lines history file
    #[arg(long, value_name = "FILE")]
    pub history_file: Option<PathBuf>,

    /// Print the state record as JSON
    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_sync_arguments() {
        let cli = Cli::try_parse_from([
            "dbcatalog",
            "--env",
            "prod",
            "sync",
            "--tables",
            "orders,order_items",
            "--on-mismatch",
            "merge",
            "-v",
        ])
        .unwrap();

        assert_eq!(cli.global.env.as_deref(), Some("prod"));
        assert_eq!(cli.global.verbose, 1);
        match cli.command {
            Command::Sync(args) => {
                assert_eq!(args.tables, ["orders", "order_items"]);
                assert_eq!(args.on_mismatch, Some(OnMismatch::Merge));
                assert_eq!(args.connection.query_timeout, 30);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_generate_arguments() {
        let cli = Cli::try_parse_from([
            "dbcatalog",
            "generate",
            "--format",
            "csv",
            "--exclude-tables",
            "audit_log,tmp",
            "--search",
            "user",
            "--search-mode",
            "column_comment",
        ])
        .unwrap();

        match cli.command {
            Command::Generate(args) => {
                assert_eq!(args.output.format, Some(OutputFormat::Csv));
                assert_eq!(args.exclude_tables, ["audit_log", "tmp"]);
                assert_eq!(args.search_mode, SearchMode::ColumnComment);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
