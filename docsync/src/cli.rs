use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use docsync_core::contract::NoConversion;
use docsync_core::state::StateStore;
use docsync_core::synchronise::{synchronise, SyncMode};

use crate::backend::HttpBackend;
use crate::load_config::load_config;
use crate::markdown::MarkdownRenderer;

/// CLI for docsync: publish markdown trees as remote page hierarchies.
#[derive(Parser)]
#[clap(
    name = "docsync",
    version,
    about = "Synchronise a local markdown tree into a remote document backend, incrementally"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Synchronise the configured source tree to the backend
    Sync {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Force-sync a single file: bypasses change detection and replaces
        /// any existing remote page for it
        #[clap(long)]
        file: Option<PathBuf>,
        /// Report what would happen without any mutating backend call
        #[clap(long)]
        dry_run: bool,
    },
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Sync {
            config,
            file,
            dry_run,
        } => {
            let loaded = load_config(config)?;
            let mut options = loaded.options;
            options.dry_run = options.dry_run || dry_run;
            options.trace_loaded();

            let backend = HttpBackend::new(loaded.backend);
            let renderer = MarkdownRenderer::new();
            let converter = NoConversion;
            let mut store = StateStore::open(&options.state_file)?;

            let mode = match file {
                Some(path) => SyncMode::Single(path),
                None => SyncMode::Tree,
            };

            println!("Synchronise starting...");
            match synchronise(&options, mode, &backend, &renderer, &converter, &mut store).await
            {
                Ok(report) => {
                    println!("Synchronise complete.\nReport:");
                    println!("{report:#?}");
                    if report.failed > 0 {
                        anyhow::bail!("{} document(s) failed to sync", report.failed);
                    }
                    Ok(())
                }
                Err(e) => {
                    eprintln!("[ERROR] Synchronisation failed: {e}");
                    Err(e.into())
                }
            }
        }
    }
}
