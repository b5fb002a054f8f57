///
/// This module implements the CLI interface for snap-upload: command parsing,
/// config loading and the async entrypoint used by `main()` and tests.
///
/// All upload logic (manager, transport, response handling) lives in the
/// [`snap-upload-core`] crate. This module is CLI glue only.
///
/// [`snap-upload-core`]: ../../snap-upload-core/
use crate::load_config::load_config;
use crate::upload::{connect, upload_all};
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// CLI for snap-upload: publish screenshots to an image host.
#[derive(Parser)]
#[clap(
    name = "snap-upload",
    version,
    about = "Upload screenshots to an image host and print their links"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Upload the given image files concurrently
    Upload {
        /// Path to an optional YAML config file
        #[clap(long)]
        config: Option<PathBuf>,
        /// Print the image page link instead of the direct image link
        #[clap(long)]
        page_url: bool,
        /// Image files to upload
        #[clap(required = true)]
        files: Vec<PathBuf>,
    },
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Upload {
            config,
            page_url,
            files,
        } => {
            let mut config = load_config(config.as_deref())?;
            if page_url {
                config.direct_url = false;
            }
            tracing::info!(command = "upload", files = files.len(), "Starting uploads");

            let (manager, mut events) = connect(config)?;
            let interrupt = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %e, "Failed to listen for Ctrl-C");
                    std::future::pending::<()>().await;
                }
            };
            let report = upload_all(&manager, &mut events, &files, interrupt).await;

            if report.is_success() {
                tracing::info!(command = "upload", "All uploads succeeded");
                Ok(())
            } else {
                tracing::error!(
                    command = "upload",
                    failed = report.failed.len(),
                    "Some uploads failed"
                );
                anyhow::bail!("{} of {} uploads failed", report.failed.len(), files.len())
            }
        }
    }
}
