//! Echo Mock Server - CLI Entry Point

use anyhow::Result;
use clap::Parser;
use echo_mock::config::DEFAULT_CONFIG;
use echo_mock::registry::seed;
use echo_mock::{Dispatcher, MockServerConfig, SqliteRegistry};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(
    name = "echo-mock",
    about = "Mock HTTP server - register endpoints at runtime and replay their responses",
    version
)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "echo-mock.yaml")]
    config: PathBuf,

    /// Address to listen on (overrides the config file)
    #[arg(short, long, value_name = "ADDR")]
    listen: Option<SocketAddr>,

    /// SQLite database URL (overrides the config file)
    #[arg(short, long, value_name = "URL")]
    database: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'L', long, default_value = "info")]
    log_level: Level,

    /// Do not register the endpoints listed in the configuration
    #[arg(long)]
    no_seed: bool,

    /// Print default configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,
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

    if args.print_config {
        println!("{}", DEFAULT_CONFIG);
        return Ok(());
    }

    // Load configuration
    let mut config = if args.config.exists() {
        info!(path = ?args.config, "Loading configuration");
        MockServerConfig::from_file(&args.config)?
    } else if args.validate {
        anyhow::bail!("Configuration file not found: {:?}", args.config);
    } else {
        info!("Using built-in configuration");
        MockServerConfig::builtin()?
    };

    if args.validate {
        println!(
            "Configuration is valid ({} endpoints defined)",
            config.endpoints.len()
        );
        return Ok(());
    }

    if let Some(listen) = args.listen {
        config.settings.listen = listen;
    }
    if let Some(database) = args.database {
        config.settings.database_url = database;
    }

    let registry = SqliteRegistry::connect(&config.settings.database_url).await?;
    if !args.no_seed {
        let created = seed(&registry, &config.endpoints).await?;
        info!(
            created,
            configured = config.endpoints.len(),
            "Seeded endpoints"
        );
    }

    let dispatcher = Dispatcher::new(Arc::new(registry), &config.settings);
    let app = dispatcher.clone().router();

    let listener = tokio::net::TcpListener::bind(config.settings.listen).await?;
    info!(listen = %config.settings.listen, "Starting mock server");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!(
        requests = dispatcher.total_requests(),
        matched = dispatcher.total_matched(),
        unmatched = dispatcher.total_unmatched(),
        "Mock server stopped"
    );
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
