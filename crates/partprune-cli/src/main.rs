#![allow(clippy::doc_markdown)]
#![allow(clippy::uninlined_format_args)]
//! `partprune` CLI - inspect pruning and placement decisions
//!
//! Usage:
//!   `partprune partitions ./catalog.json orders`
//!   `partprune prune ./catalog.json orders --where @pred.json --params '[{"int":15}]'`
//!   `partprune place ./catalog.json orders --row '{"1":{"int":1500}}'`

mod commands;
mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use partprune_core::PruneConfig;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "partprune")]
#[command(
    author,
    version,
    about = "partprune CLI - Inspect partition pruning and row placement"
)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file (defaults to ./partprune.toml when present)
    #[arg(short, long, global = true, env = "PARTPRUNE_CONFIG")]
    config: Option<PathBuf>,

    /// Log at debug level regardless of configuration
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Output format option
#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// List the partitions of a table
    Partitions {
        /// Catalog fixture (JSON)
        catalog: PathBuf,

        /// Table name or class id
        table: String,

        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Compute the partitions a scan must visit
    Prune {
        /// Catalog fixture (JSON)
        catalog: PathBuf,

        /// Table name or class id
        table: String,

        /// Search predicate as JSON, or @file
        #[arg(short = 'w', long = "where")]
        predicate: Option<String>,

        /// Index scan as JSON, or @file
        #[arg(short, long)]
        index: Option<String>,

        /// Statement parameters as a JSON array, or @file
        #[arg(short, long)]
        params: Option<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Compute the partition a row belongs to
    Place {
        /// Catalog fixture (JSON)
        catalog: PathBuf,

        /// Table name, or partition name/id with --update
        table: String,

        /// Row as a JSON object keyed by attribute id, or @file
        #[arg(short, long)]
        row: String,

        /// Route as an update of a row read through TABLE
        #[arg(long)]
        update: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Print the effective configuration as TOML
    Config,
}

fn init_logging(config: &PruneConfig, verbose: bool) {
    let level = if verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    // a subscriber may already be installed by an embedding process
    let _ = if config.logging.format == "json" {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<PruneConfig> {
    let config = match path {
        Some(path) => PruneConfig::load_required(path)?,
        None => PruneConfig::load()?,
    };
    config.validate()?;
    Ok(config)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;
    init_logging(&config, cli.verbose);

    match cli.command {
        Commands::Partitions {
            catalog,
            table,
            format,
        } => {
            let report = commands::partitions(&config, &catalog, &table)?;
            output::print_partitions(&report, format)?;
        }
        Commands::Prune {
            catalog,
            table,
            predicate,
            index,
            params,
            format,
        } => {
            let request = commands::PruneRequest {
                table,
                predicate,
                index,
                params,
            };
            let report = commands::prune(&config, &catalog, &request)?;
            output::print_prune(&report, format)?;
        }
        Commands::Place {
            catalog,
            table,
            row,
            update,
            format,
        } => {
            let report = commands::place(&config, &catalog, &table, &row, update)?;
            output::print_placement(&report, format)?;
        }
        Commands::Config => {
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}
