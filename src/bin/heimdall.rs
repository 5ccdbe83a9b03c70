//! heimdall operator CLI
//!
//! Inspect the effective configuration and manage the result cache.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use heimdall::{Config, ControlPlane, Heimdall};

/// Heimdall control-plane operator tool
#[derive(Parser)]
#[command(name = "heimdall")]
#[command(version = heimdall::PKG_VERSION)]
#[command(about = "Admission and result-cache control plane")]
struct Args {
    /// Config file (default: ~/.heimdall/config.toml, then /etc/heimdall/config.toml)
    #[arg(short, long, env = "HEIMDALL_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the effective configuration (file + environment)
    Config,

    /// Show cache connectivity and store-wide hit counters
    Stats,

    /// Drop cached answers derived from a document
    Invalidate {
        /// Document identifier
        doc_id: String,
    },

    /// Drop every cache entry (requires cache.allow_clear)
    Clear {
        /// Confirm the destructive operation
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise tracing (default: warn for CLI; override with RUST_LOG).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();
    tracing::debug!(version = %heimdall::version_string(), "starting");
    let config = Config::from_env(args.config.as_deref())?;

    match args.command {
        Command::Config => {
            print!("{}", config.to_toml()?);
        }

        Command::Stats => {
            let plane = connected(config).await?;
            let stats = plane.store_stats().await;
            println!("status: {}", stats.status);
            println!("hits: {}", stats.hits);
            println!("misses: {}", stats.misses);
            println!("hit rate: {}", stats.hit_rate);
            plane.disconnect().await;
        }

        Command::Invalidate { doc_id } => {
            let plane = connected(config).await?;
            let removed = plane.invalidate_document(&doc_id).await;
            println!("invalidated {removed} entries for {doc_id}");
            plane.disconnect().await;
        }

        Command::Clear { yes } => {
            if !yes {
                eprintln!("refusing to clear the cache without --yes");
                std::process::exit(2);
            }
            let plane = connected(config).await?;
            plane.clear_cache().await?;
            println!("cache cleared");
            plane.disconnect().await;
        }
    }

    Ok(())
}

async fn connected(config: Config) -> heimdall::Result<ControlPlane> {
    let plane = Heimdall::builder().config(config).build()?;
    plane.connect().await;
    Ok(plane)
}
