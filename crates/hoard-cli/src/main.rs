use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;
mod config;
mod listener;

fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();
    init_tracing(cli.verbose);

    let result = commands::run_command(cli);

    match hoard_project::sweep_orphaned_spill_files(&std::env::temp_dir()) {
        Ok(0) => {}
        Ok(removed) => tracing::debug!(removed, "removed orphaned spill files"),
        Err(error) => tracing::debug!(%error, "could not sweep spill files"),
    }
    result
}

/// Logs go to stderr so command output stays clean. `RUST_LOG` wins over
/// `--verbose`.
fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
