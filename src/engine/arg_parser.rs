use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Watch a directory tree and keep a metadata index of its files.
#[derive(Clone, Parser)]
#[command(name = "metafiler")]
#[command(about = "Index a directory tree into SQLite and keep the index current as files change.")]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[command(flatten)]
    pub run: RunArgs,
}

/// Options for the default (watch) command.
#[derive(Clone, Debug, Default, clap::Args)]
pub struct RunArgs {
    /// Directory to watch. Default: `filesystem.path` from the config, else current directory.
    #[arg(value_name = "DIR")]
    pub dir: Option<PathBuf>,

    /// Config file. Default: `metafiler.toml` in the current directory, if present.
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// SQLite database file (overrides `storage.database`).
    #[arg(long, short)]
    pub db: Option<PathBuf>,

    /// Index the existing tree, wait for every task, then exit instead of watching.
    #[arg(long, num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub once: Option<bool>,

    /// Drop previously indexed documents at startup.
    #[arg(long, num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub fresh: Option<bool>,

    /// Only set up watches; don't index files that already exist.
    #[arg(long, num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub skip_initial_scan: Option<bool>,

    /// Log every dispatched event.
    #[arg(long, num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub log_events: Option<bool>,

    /// Max concurrently running indexing tasks.
    #[arg(long, short = 'w')]
    pub workers: Option<usize>,

    /// Verbose output.
    #[arg(long, short = 'v', num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub verbose: Option<bool>,
}

#[derive(Clone, Subcommand)]
pub enum Commands {
    /// Look up indexed documents.
    Query(QueryArgs),
    /// Write a default config file and exit.
    Init {
        /// Where to write it. Default: `metafiler.toml` in the current directory.
        #[arg(value_name = "FILE")]
        path: Option<PathBuf>,
    },
}

#[derive(Clone, Debug, clap::Args)]
pub struct QueryArgs {
    /// Config file used to locate the database.
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// SQLite database file (overrides the config).
    #[arg(long, short)]
    pub db: Option<PathBuf>,

    /// Print the document stored for this path as JSON.
    #[arg(long, conflicts_with_all = ["field", "value"])]
    pub path: Option<String>,

    /// Metadata field to match.
    #[arg(long, requires = "value")]
    pub field: Option<String>,

    /// Value the field must equal.
    #[arg(long, requires = "field")]
    pub value: Option<String>,

    /// Verbose output.
    #[arg(long, short = 'v', num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub verbose: Option<bool>,
}
