//! WebSocket hub server binary.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use hub_server::{Config, Relay, Server};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[clap(name = "hub-server")]
#[clap(about = "WebSocket pub/sub hub")]
struct Cli {
    /// TOML config file (environment variables still override it)
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// Address to bind
    #[clap(short, long)]
    bind: Option<String>,

    /// Port to listen on
    #[clap(short, long)]
    port: Option<u16>,

    /// Upgrade path
    #[clap(long)]
    ws_path: Option<String>,

    /// Maximum simultaneous clients (0 = unlimited)
    #[clap(long)]
    max_clients: Option<usize>,

    /// Send welcome/join/leave notifications
    #[clap(long)]
    announce_presence: bool,

    /// Log level when RUST_LOG is not set
    #[clap(long, default_value = "info")]
    log_level: String,
}

impl Cli {
    fn apply(&self, mut config: Config) -> Config {
        if let Some(bind) = &self.bind {
            config.bind_addr = bind.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(path) = &self.ws_path {
            config.ws_path = path.clone();
        }
        if let Some(max) = self.max_clients {
            config.max_clients = max;
        }
        if self.announce_presence {
            config.announce_presence = true;
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    let config = cli.apply(config).validate()?;

    info!(
        addr = %config.socket_addr_string(),
        path = %config.ws_path,
        max_clients = config.max_clients,
        "starting hub-server"
    );

    let server = Server::bind(config, Arc::new(Relay))
        .await
        .context("binding listener")?;

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    Ok(())
}
