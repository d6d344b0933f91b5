//! hianime CLI application.
//!
//! Lists episode servers, resolves stream links and serves the REST API.

mod api;
mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use shared::{Config, LogConfig};
use std::path::PathBuf;
use std::sync::Arc;
use stream_resolver::StreamService;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Write JSON output to this file instead of stdout
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the sub and dub servers of an episode
    Servers {
        /// Episode id, e.g. one-piece-100::ep=2142
        episode_id: String,
    },

    /// Resolve the stream link of an episode on one server
    Stream {
        /// Episode id, e.g. one-piece-100::ep=2142
        episode_id: String,

        /// Server type (sub or dub)
        #[arg(value_name = "TYPE")]
        kind: String,

        /// Server name, e.g. HD-1
        server: String,
    },

    /// Run the REST API
    Serve {
        /// Bind address (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Bind port (overrides config)
        #[arg(long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = Config::load(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    // Initialize logging
    let mut log_config = LogConfig::from_settings("hianime", &config.logging);
    if args.verbose {
        log_config.default_level = tracing::Level::DEBUG;
    }
    shared::logging::init(log_config)?;

    info!(config_file = %args.config.display(), "Loaded configuration");

    if let Err(e) = run(args, config).await {
        error!("{e:#}");
        std::process::exit(1);
    }

    Ok(())
}

async fn run(args: Args, mut config: Config) -> Result<()> {
    match args.command {
        Command::Servers { episode_id } => {
            let service = build_service(&config)?;
            let servers = service.servers(&episode_id).await?;
            output::write_json(&servers, args.output.as_deref())
        }
        Command::Stream {
            episode_id,
            kind,
            server,
        } => {
            let service = build_service(&config)?;
            let descriptor = service.stream(&episode_id, &kind, &server).await?;
            output::write_json(&descriptor, args.output.as_deref())
        }
        Command::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }

            let service = build_service(&config)?;
            api::serve(Arc::new(service), &config.server).await
        }
    }
}

fn build_service(config: &Config) -> Result<StreamService> {
    StreamService::from_config(config).context("Failed to create stream service")
}
