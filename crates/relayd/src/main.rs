use anyhow::Result;
use dotenvy::dotenv;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

use relaycore::core::cookies::materialize_cookies;
use relaycore::core::logging::parse_level;
use relaycore::core::{init_logger, log_runtime_configuration};
use relaycore::download::{audio_only, discover};
use relaycore::{Config, Relay, RetentionManager, SystemGateway};

mod cli;
mod server;

use cli::{Cli, Commands, Settings};

/// Main entry point for relayd
///
/// Parses CLI arguments (backed by environment variables) and dispatches to
/// the selected subcommand; without one the server runs.
#[tokio::main]
async fn main() -> Result<()> {
    // Environment first: clap reads its defaults from it
    let _ = dotenv();
    let cli = Cli::parse_args();

    init_logger(parse_level(&cli.settings.log_level), cli.settings.log_file.as_deref())?;

    let config = prepare(&cli.settings)?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => run_server(config, cli.settings.port).await,
        Commands::Formats { url, all } => run_formats(config, &url, all).await,
        Commands::Sweep => run_sweep(config),
    }
}

/// Materialize credentials, create directories and log the effective setup.
fn prepare(settings: &Settings) -> Result<Config> {
    if let Some(ref encoded) = settings.cookie_b64 {
        if let Err(e) = materialize_cookies(encoded, &settings.cookie_file) {
            log::error!("❌ Failed to write cookie file from COOKIE_B64: {}", e);
        }
    } else {
        log::warn!("⚠️ COOKIE_B64 not found. Some videos may require it.");
    }

    let config = settings.to_config();
    config.ensure_dirs()?;
    log_runtime_configuration(&config);
    Ok(config)
}

async fn run_server(config: Config, port: u16) -> Result<()> {
    let sweep_interval = config.sweep_interval;
    let relay = Relay::new(config, Arc::new(SystemGateway::new()));

    // Pick up expiry records left by a previous run
    if let Err(e) = relay.retention().sweep() {
        log::error!("Startup retention sweep failed: {}", e);
    }
    spawn_periodic_sweep(relay.retention().clone(), sweep_interval);

    server::serve(relay, port, shutdown_signal()).await?;
    log::info!("Server stopped");
    Ok(())
}

fn spawn_periodic_sweep(retention: RetentionManager, every: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        // The first tick completes immediately and the startup sweep already ran
        interval.tick().await;
        loop {
            interval.tick().await;
            if let Err(e) = retention.sweep() {
                log::error!("Periodic retention sweep failed: {}", e);
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        log::error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    log::info!("Shutting down gracefully...");
}

async fn run_formats(config: Config, url: &str, all: bool) -> Result<()> {
    let gateway = SystemGateway::new();
    let formats = discover(&gateway, &config, url).await?;
    let formats = if all { formats } else { audio_only(&formats) };

    log::info!("✅ Formats fetched ({} options)", formats.len());
    println!("{}", serde_json::to_string_pretty(&formats)?);
    Ok(())
}

fn run_sweep(config: Config) -> Result<()> {
    let retention = RetentionManager::new(&config);
    let report = retention.sweep()?;
    println!(
        "expired: {}, pending: {}, invalid: {}, superseded: {}",
        report.expired,
        report.rearmed + report.pending,
        report.invalid,
        report.superseded
    );
    Ok(())
}
