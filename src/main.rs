//! Metafiler CLI: watch a directory and index file metadata; `query` and `init` subcommands.

use anyhow::Result;
use clap::Parser;
use metafiler::engine::arg_parser::Cli;
use metafiler::engine::handle_run;
use std::time::Instant;

fn main() -> Result<()> {
    let start_time = Instant::now();
    let cli = Cli::parse();
    handle_run(&cli)?;
    log::debug!("Total time: {:?}", start_time.elapsed());
    Ok(())
}
