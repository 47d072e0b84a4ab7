//! CLI command handlers: watch (default), query, init.

use anyhow::{Context, Result};
use log::{debug, warn};
use std::path::{Path, PathBuf};

use crate::engine::arg_parser::{Cli, Commands, QueryArgs, RunArgs};
use crate::engine::running_as_root;
use crate::engine::service::run_service;
use crate::engine::store::StoragePool;
use crate::utils::config::{Config, PackagePaths};
use crate::utils::{load_config, setup_logging, write_default_config};

/// Layer CLI flags over the loaded config.
pub fn apply_run_args(cfg: &mut Config, args: &RunArgs) {
    if let Some(dir) = &args.dir {
        cfg.filesystem.path = dir.clone();
    }
    if let Some(db) = &args.db {
        cfg.storage.database = db.clone();
    }
    if let Some(once) = args.once {
        cfg.pipeline.run_once = once;
    }
    if let Some(fresh) = args.fresh {
        cfg.storage.drop_on_start = fresh;
    }
    if let Some(skip) = args.skip_initial_scan {
        cfg.filesystem.skip_initial_scan = skip;
    }
    if let Some(log_events) = args.log_events {
        cfg.filesystem.log_events = log_events;
    }
    if let Some(workers) = args.workers {
        cfg.pipeline.workers = workers;
    }
}

/// Dispatch to the selected command.
pub fn handle_run(cli: &Cli) -> Result<()> {
    match &cli.command {
        None => handle_watch(&cli.run),
        Some(Commands::Query(args)) => handle_query(args),
        Some(Commands::Init { path }) => handle_init(path.as_deref()),
    }
}

fn handle_watch(args: &RunArgs) -> Result<()> {
    setup_logging(args.verbose.unwrap_or(false));
    if running_as_root() {
        warn!("Running as root. The index will be readable by whoever can read the database file.");
    }
    let mut cfg = load_config(args.config.as_deref())?;
    apply_run_args(&mut cfg, args);
    debug!("{} CONFIG:{:#?}", PackagePaths::get().pkg_name().to_uppercase(), cfg);
    run_service(&cfg)
}

fn handle_query(args: &QueryArgs) -> Result<()> {
    setup_logging(args.verbose.unwrap_or(false));
    let mut cfg = load_config(args.config.as_deref())?;
    if let Some(db) = &args.db {
        cfg.storage.database = db.clone();
    }
    if !cfg.storage.database.exists() {
        anyhow::bail!("no index at {}", cfg.storage.database.display());
    }
    cfg.storage.pool_size = 1;
    cfg.storage.drop_on_start = false;
    let pool = StoragePool::open(&cfg.storage)?;

    let result = run_query(&pool, args);
    pool.close()?;
    result
}

fn run_query(pool: &StoragePool, args: &QueryArgs) -> Result<()> {
    if let Some(path) = &args.path {
        match pool.find(path)? {
            Some(record) => {
                let json = serde_json::to_string_pretty(&record).context("encode record")?;
                println!("{json}");
            }
            None => anyhow::bail!("no document for {path}"),
        }
        return Ok(());
    }
    match (&args.field, &args.value) {
        (Some(field), Some(value)) => {
            for record in pool.find_by_field(field, value)? {
                println!("{}", record.path);
            }
        }
        _ => println!("{} documents", pool.count()?),
    }
    Ok(())
}

fn handle_init(path: Option<&Path>) -> Result<()> {
    setup_logging(false);
    let path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(PackagePaths::get().config_filename()));
    write_default_config(&path)
}
