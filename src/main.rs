//! Gateway entry point: parse flags, load config, start serving.

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use git_gateway::config::{load_config, GatewayConfig};
use git_gateway::gateway::Gateway;
use git_gateway::http::HttpServer;
use git_gateway::observability::{logging, metrics};

#[derive(Parser, Debug)]
#[command(name = "git-gateway", version, about = "Git smart-HTTP gateway")]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Address to listen on (overrides the config file).
    #[arg(long)]
    listen_addr: Option<String>,

    /// Authorization backend URL (overrides the config file).
    #[arg(long)]
    auth_backend: Option<String>,

    /// Document root for static assets (overrides the config file).
    #[arg(long)]
    document_root: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };
    if let Some(listen_addr) = args.listen_addr {
        config.listener.bind_address = listen_addr;
    }
    if let Some(auth_backend) = args.auth_backend {
        config.backend.auth_backend = auth_backend;
    }
    if let Some(document_root) = args.document_root {
        config.static_files.document_root = document_root;
    }

    tracing::info!(
        bind_address = %config.listener.bind_address,
        auth_backend = %config.backend.auth_backend,
        document_root = %config.static_files.document_root.display(),
        "configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "listening for connections");

    let gateway = Gateway::new(&config)?;
    let server = HttpServer::new(gateway);
    server.run(listener).await?;

    tracing::info!("shutdown complete");
    Ok(())
}
