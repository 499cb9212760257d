mod args;
mod settings;

use std::io::{self, Write};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;
use wharf_backend::{EngineMode, prepare_submission};
use wharf_uri::UriResolver;

use crate::args::{Cli, Commands};
use crate::settings::{load_settings, settings_path};

// Transfers drive their own runtime through `wharf_uri::async_runtime`, so main stays synchronous.
fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let path = settings_path(cli.config.as_deref());
    let settings = load_settings(&path).overlay(&cli.settings_overrides());
    let params = settings.into_parameters(cli.submission_documents());

    let resolver = UriResolver::new(&params.storage).context("failed to initialize storage access")?;
    let mode = match cli.command {
        Commands::Run(_) => EngineMode::Run,
        Commands::Server(_) => EngineMode::Server,
    };
    let prepared = prepare_submission(&params, &resolver, mode).context("failed to prepare submission")?;
    info!(work_dir = %prepared.work_dir.display(), backend = %prepared.backend, "submission prepared");

    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, &prepared)?;
    writeln!(stdout)?;
    Ok(())
}

/// Filter from `RUST_LOG`, or `info` when unset or unparsable.
fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

// Logs go to stderr; stdout carries the prepared submission.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use tracing::Level;

    use super::*;

    fn enabled_levels() -> (bool, bool) {
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(env_filter())
            .with_writer(io::sink)
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            (tracing::enabled!(Level::INFO), tracing::enabled!(Level::DEBUG))
        })
    }

    #[test]
    fn info_is_the_default_level() {
        temp_env::with_var_unset("RUST_LOG", || {
            assert_eq!(enabled_levels(), (true, false));
        });
    }

    #[test]
    fn rust_log_raises_the_level() {
        temp_env::with_var("RUST_LOG", Some("debug"), || {
            assert_eq!(enabled_levels(), (true, true));
        });
    }
}
