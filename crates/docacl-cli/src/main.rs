//! docacl command line.
//!
//! Checks, explains and applies a document's access rules offline, from the
//! rule records a document carries.
//!
//! # Quick Start
//!
//! ```bash
//! # Validate rules against the document's tables and columns
//! docacl check rules.json --schema schema.json
//!
//! # Why may an editor not rename a table?
//! docacl explain rules.json --action "RenameTable(T1)" --email ada@example.com --access editors
//!
//! # What does a viewer see of a table?
//! docacl filter rules.json --table T1 --data rows.json --email bob@example.com --access viewers
//! ```

mod commands;
mod style;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use docacl_config::{ConfigLoader, DocaclConfig};
use tracing_subscriber::EnvFilter;

use commands::common::UserArgs;

/// docacl - granular access rules for tabular documents.
#[derive(Parser)]
#[command(name = "docacl")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,

    /// Project directory holding docacl.toml (defaults to the current directory).
    #[arg(long, global = true)]
    project: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version information.
    Version,

    /// Build a policy from rule records and report problems.
    Check {
        /// Rule records (JSON with `resources` and `rules`).
        rules: PathBuf,

        /// Document tables and columns (JSON: `{"tables": {"T1": ["A", "B"]}}`).
        #[arg(short, long)]
        schema: Option<PathBuf>,

        /// Output format (text, json).
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Resolve one action for one user and show how each bit was decided.
    Explain {
        /// Rule records (JSON with `resources` and `rules`).
        rules: PathBuf,

        /// Action, e.g. `RenameTable(T1)`, `ModifyColumn(T1.Salary)`, `EditAccessRules`.
        #[arg(short, long)]
        action: String,

        #[command(flatten)]
        user: UserArgs,

        /// Existing row bound as `rec` (JSON object with `id`).
        #[arg(long)]
        row: Option<PathBuf>,

        /// Proposed row bound as `newRec` (JSON object with `id`).
        #[arg(long)]
        new_row: Option<PathBuf>,

        /// Output format (text, json).
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show the rows and columns of a table one user may read.
    Filter {
        /// Rule records (JSON with `resources` and `rules`).
        rules: PathBuf,

        /// Table id.
        #[arg(short, long)]
        table: String,

        /// Table rows (JSON array of objects with `id`).
        #[arg(short, long)]
        data: PathBuf,

        /// Columns to request, comma separated (defaults to every column in the data).
        #[arg(short, long, value_delimiter = ',')]
        columns: Vec<String>,

        #[command(flatten)]
        user: UserArgs,

        /// First visible row to show.
        #[arg(long, default_value = "0")]
        offset: usize,

        /// Maximum rows to show.
        #[arg(long, default_value = "100")]
        limit: usize,

        /// Output format (text, json).
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Configuration commands.
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the merged configuration.
    Show {
        /// Output format (text, json, toml).
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

fn load_config(project: Option<&PathBuf>) -> Result<DocaclConfig> {
    let mut loader = ConfigLoader::new();
    if let Some(dir) = project {
        loader = loader.with_project_dir(dir);
    }
    loader.load().context("Failed to load configuration")
}

fn init_logging(config: &DocaclConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.to_ascii_lowercase()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(!style::no_color())
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        style::set_no_color(true);
    }

    let config = load_config(cli.project.as_ref())?;
    init_logging(&config);
    let settings = config.engine.settings();

    match cli.command {
        Commands::Version => {
            commands::version::run();
            Ok(())
        }
        Commands::Check {
            rules,
            schema,
            format,
        } => commands::check::run(&rules, schema.as_deref(), settings, &format),
        Commands::Explain {
            rules,
            action,
            user,
            row,
            new_row,
            format,
        } => commands::explain::run(
            &rules,
            &action,
            &user,
            row.as_deref(),
            new_row.as_deref(),
            settings,
            &format,
        ),
        Commands::Filter {
            rules,
            table,
            data,
            columns,
            user,
            offset,
            limit,
            format,
        } => commands::filter::run(
            &commands::filter::FilterArgs {
                rules: &rules,
                table: &table,
                data: &data,
                columns: &columns,
                offset,
                limit,
                format: &format,
            },
            &user,
            settings,
        ),
        Commands::Config(ConfigCommands::Show { format }) => {
            commands::config::show(&config, &format)
        }
    }
}
