use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use connector_host::commands;
use connector_host::config::{self, ServerSettings};
use connector_host::logging;
use connector_host::security::HashAlgorithm;

#[derive(Parser, Debug)]
#[command(name = "connector-host")]
#[command(about = "Hosts connectors and serves them to remote clients", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file (TOML/JSON/YAML)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Debug, clap::Subcommand)]
enum Command {
    /// Run the connector server (default)
    Serve,
    /// Validate configuration and scan connector bundles
    Check,
    /// Read a shared secret from stdin and print its hash for `server.keyHash`
    HashSecret {
        /// SHA256 or SHA512
        #[arg(long, default_value = "SHA256")]
        algorithm: HashAlgorithm,
    },
}

fn load_settings(path: Option<&PathBuf>) -> anyhow::Result<ServerSettings> {
    let settings = match path {
        Some(path) => config::load_from_path(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => config::load_from_env_or_file().context("failed to load configuration")?,
    };
    Ok(settings)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let command = args.command.unwrap_or(Command::Serve);
    if let Command::HashSecret { algorithm } = command {
        commands::run_hash_secret(algorithm)?;
        return Ok(());
    }

    let settings = load_settings(args.config.as_ref())?;
    let mut logging_config = settings.logging.clone();
    if args.debug {
        logging_config.level = "debug".to_string();
    }
    logging::init(&logging_config)?;

    match command {
        Command::Check => commands::run_config_check(settings)?,
        _ => {
            info!(version = env!("CARGO_PKG_VERSION"), "Starting connector server");
            commands::run_server(settings).await?;
        }
    }
    Ok(())
}
