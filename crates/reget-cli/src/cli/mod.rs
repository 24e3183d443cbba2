//! CLI for the reget HTTP client.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use reget_core::config;
use std::path::PathBuf;

use commands::{run_get, run_prune};

/// Top-level CLI for reget.
#[derive(Debug, Parser)]
#[command(name = "reget")]
#[command(about = "reget: resuming, caching HTTP client", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Fetch a URL, resuming interrupted bodies and answering from the cache when possible.
    Get {
        /// HTTP/HTTPS URL to fetch.
        url: String,

        /// Request method.
        #[arg(short = 'X', long = "request", default_value = "GET", value_name = "METHOD")]
        method: String,

        /// Extra request header, `Name: value`. May be repeated.
        #[arg(short = 'H', long = "header", value_name = "HEADER")]
        headers: Vec<String>,

        /// Write the body to this file instead of stdout.
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Skip the response cache for this request.
        #[arg(long)]
        no_cache: bool,
    },

    /// Delete expired entries from the response cache.
    Prune,
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Get {
                url,
                method,
                headers,
                output,
                no_cache,
            } => run_get(&cfg, &url, &method, &headers, output.as_deref(), no_cache).await?,
            CliCommand::Prune => run_prune(&cfg).await?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
