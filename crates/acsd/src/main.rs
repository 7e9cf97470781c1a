//! acsd - Access-control device integration daemon
//!
//! Connects the configured devices, keeps their sessions alive and ingests
//! their events until Ctrl-C. One-shot subcommands run discovery or print SDK
//! health.
//!
//! Usage:
//!   acsd [--config acsd.toml] [run]
//!   acsd discover [--strategy probe|broadcast] [--json]
//!   acsd health [--json]

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use acs_sdk::{
    AccessControlService, AcsConfig, DiscoveryStrategy, InMemoryDeviceRepository,
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "acsd")]
#[command(author, version, about = "Access-control device integration daemon")]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, env = "ACSD_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect registered devices and ingest events until Ctrl-C (default)
    Run,

    /// Search the network for devices
    Discover {
        /// probe or broadcast; defaults to the configured strategy
        #[arg(short, long)]
        strategy: Option<DiscoveryStrategy>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Print native SDK health
    Health {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "acsd=info,acs_sdk=info,acs_core=info".into());
    let registry = tracing_subscriber::registry().with(filter);

    // Logs go to stderr so command output on stdout stays parseable
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = config::load(cli.config.as_deref())?;
    if let Some(path) = &cli.config {
        info!("Loaded config from: {}", path.display());
    }
    config::report_invalid_sections(&config);

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(config).await,
        Commands::Discover { strategy, json } => discover(config, strategy, json).await,
        Commands::Health { json } => health(config, json).await,
    }
}

fn build_service(config: AcsConfig) -> AccessControlService {
    let repository = Arc::new(InMemoryDeviceRepository::with_devices(config.devices.clone()));
    AccessControlService::new(config, repository)
}

async fn run(config: AcsConfig) -> Result<()> {
    info!("Starting acsd");
    let service = build_service(config);

    if let Err(e) = service.gateway().ensure_ready_async().await {
        warn!(error = %e, "Native SDK not ready, will retry on first use");
    }

    let summary = service
        .connect_registered()
        .await
        .context("Failed to read registered devices")?;
    for (device_id, error) in &summary.failed {
        warn!(device_id = %device_id, "Not connected: {}", error);
    }

    if let Err(e) = service.start() {
        warn!(error = %e, "Event ingestion disabled");
    }

    let cancel = CancellationToken::new();
    let event_log = {
        let mut events = service.subscribe();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    event = events.recv() => match event {
                        Ok(event) => info!(
                            device_id = %event.device_id,
                            kind = %event.kind,
                            occurred_at = %event.occurred_at,
                            payload = %event.payload,
                            "Device event"
                        ),
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                            warn!(missed, "Event log fell behind");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        })
    };

    info!("acsd running, press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    info!("Shutting down");
    cancel.cancel();
    service.shutdown().await;
    if let Err(e) = event_log.await {
        warn!(error = %e, "Event log task ended abnormally");
    }
    Ok(())
}

async fn discover(config: AcsConfig, strategy: Option<DiscoveryStrategy>, json: bool) -> Result<()> {
    let service = build_service(config);
    let devices = service.discover(strategy).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&devices)?);
    } else if devices.is_empty() {
        println!("No devices found");
    } else {
        println!("{:<24} {:<24} {:<22} {:<14} AUTH", "ID", "NAME", "ENDPOINT", "MODEL");
        for device in &devices {
            println!(
                "{:<24} {:<24} {:<22} {:<14} {}",
                device.id,
                device.name,
                format!("{}:{}", device.ip, device.port),
                device.model.as_deref().unwrap_or("-"),
                if device.auth_required { "required" } else { "ok" },
            );
        }
    }

    service.shutdown().await;
    Ok(())
}

async fn health(config: AcsConfig, json: bool) -> Result<()> {
    let service = build_service(config);
    // Health is only meaningful after an initialisation attempt
    if let Err(e) = service.gateway().ensure_ready_async().await {
        warn!(error = %e, "Native SDK initialisation failed");
    }
    let health = service.health();

    if json {
        println!("{}", serde_json::to_string_pretty(&health)?);
    } else {
        println!("initialized:     {}", health.initialized);
        println!("platform:        {}", health.platform);
        println!("active sessions: {}", health.active_sessions);
        match &health.library_location {
            Some(location) => println!("library:         {}", location.display()),
            None => println!("library:         (not loaded)"),
        }
        if let Some(error) = &health.last_error {
            println!("last error:      {} ({})", error.message, error.code);
            println!("hint:            {}", error.hint);
        }
        println!("search paths:");
        for path in &health.library_search_paths {
            println!("  {}", path.display());
        }
    }

    service.shutdown().await;
    Ok(())
}
