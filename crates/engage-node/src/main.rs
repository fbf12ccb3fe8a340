use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use engage_node::{api, config::NodeConfig, logging, EngageNode};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(name = "engage-node")]
#[command(about = "Engage - task engagement verification node", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbosity level (can be repeated)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the engage node
    Start {
        /// Port for the HTTP API
        #[arg(long)]
        api_port: Option<u16>,

        /// Data directory
        #[arg(short, long, default_value = "./data")]
        data_dir: PathBuf,
    },

    /// Write a default configuration file
    Init {
        /// Output directory for the configuration
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start { api_port, data_dir } => {
            start(cli.config, cli.verbose, api_port, data_dir).await
        }
        Commands::Init { output } => init(output),
    }
}

async fn start(
    config_path: Option<PathBuf>,
    verbose: u8,
    api_port: Option<u16>,
    data_dir: PathBuf,
) -> Result<()> {
    let mut config = match &config_path {
        Some(path) => NodeConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => NodeConfig::default(),
    };
    config.node.data_dir = data_dir;
    if let Some(port) = api_port {
        config.api.port = port;
    }
    config.apply_env_overrides();

    logging::init_logging(&config.logging, verbose)?;
    info!(
        name = %config.node.name,
        api_port = config.api.port,
        "🚀 Starting engage node"
    );

    let node = EngageNode::new(&config);
    let _heartbeat = node.spawn_heartbeat(Duration::from_secs(30));

    if config.api.enabled {
        let api_handle = api::start_api_server(node, &config.api);
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("🛑 Shutdown signal received");
            }
            _ = api_handle => {}
        }
    } else {
        tokio::signal::ctrl_c().await?;
        info!("🛑 Shutdown signal received");
    }

    Ok(())
}

fn init(output: PathBuf) -> Result<()> {
    let config = NodeConfig::default();
    let path = output.join("engage.toml");
    config
        .save_to_file(&path)
        .with_context(|| format!("Failed to write config to {}", path.display()))?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}
