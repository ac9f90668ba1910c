//! Zentinel HTTP Mock - CLI Entry Point

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use zentinel_http_mock::{config, listen_for_signals, MockServer, Shutdown, TransactionLogger};

#[derive(Parser, Debug)]
#[command(
    name = "zentinel-http-mock",
    about = "Standalone HTTP mock server - fixed JSON responses for exact method/path pairs",
    version
)]
struct Args {
    /// HTTP server port
    #[arg(short, long)]
    port: u16,

    /// Path to JSON configuration file
    #[arg(short, long)]
    config: PathBuf,

    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'L', long, default_value = "info")]
    log_level: Level,

    /// Validate configuration file and exit (does not start the server)
    #[arg(long)]
    validate_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if args.validate_config {
        let report = config::validate_only(&args.config)
            .with_context(|| format!("Configuration file {:?} is invalid", args.config))?;
        println!("{}", report);
        return Ok(());
    }

    let table = config::load(&args.config)
        .with_context(|| format!("Failed to load configuration {:?}", args.config))?;

    let address = format!("{}:{}", args.host, args.port);
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("Port {} already in use or unavailable ({})", args.port, address))?;

    info!(
        port = args.port,
        config = %args.config.display(),
        endpoints = table.len(),
        "Mock server starting, press Ctrl+C to stop"
    );

    let shutdown = Shutdown::new();
    listen_for_signals(shutdown.clone());

    MockServer::new(table, TransactionLogger::stdout(), shutdown)
        .run(listener)
        .await?;

    info!("Mock server shut down");
    Ok(())
}
