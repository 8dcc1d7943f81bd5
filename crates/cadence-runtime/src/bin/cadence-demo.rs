//! # Cadence Demo
//!
//! Polls a simulated, occasionally failing weather station and logs every
//! update the coordinator publishes.
//!
//! ## Usage
//! ```bash
//! # Defaults (30s interval), or ~/.config/cadence/cadence.toml if present
//! cargo run -p cadence-runtime --bin cadence-demo
//!
//! # Custom config file, verbose logs
//! RUST_LOG=debug cargo run -p cadence-runtime --bin cadence-demo -- --config ./cadence.toml
//!
//! # Faster polling for a quick look
//! cargo run -p cadence-runtime --bin cadence-demo -- --interval 5
//! ```
//!
//! Press Ctrl-C to stop; the coordinator shuts down through the host's stop
//! hooks.

use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cadence_core::{FetchError, FetchResult};
use cadence_runtime::{
    with_deadline, CadenceConfig, Coordinator, CoordinatorBuilder, DataSource, HostLifecycle,
};
use rand::Rng;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// One reading from the simulated station.
#[derive(Debug, Clone, PartialEq)]
struct Reading {
    temperature_c: i32,
    humidity_pct: u8,
}

/// Weather station that drops the connection or stalls now and then.
struct FlakyStation {
    polls: AtomicU64,
}

#[async_trait]
impl DataSource<Reading> for FlakyStation {
    async fn fetch(&self) -> FetchResult<Reading> {
        let poll = self.polls.fetch_add(1, Ordering::SeqCst) + 1;

        with_deadline(Duration::from_secs(2), async move {
            // ThreadRng is !Send: draw before the first await.
            let (stall, temperature_c, humidity_pct) = {
                let mut rng = rand::thread_rng();
                (
                    poll % 7 == 0,
                    rng.gen_range(18..=24),
                    rng.gen_range(40..=60),
                )
            };

            if poll % 5 == 0 {
                return Err(FetchError::Transport("station closed the connection".into()));
            }
            if stall {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }

            Ok(Reading {
                temperature_c,
                humidity_pct,
            })
        })
        .await
    }
}

fn print_help() {
    println!("Usage: cadence-demo [OPTIONS]");
    println!();
    println!("Options:");
    println!("  -c, --config <PATH>     Config file (default: platform config dir)");
    println!("  -i, --interval <SECS>   Override the update interval");
    println!("  -h, --help              Show this help message");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .init();

    let args: Vec<String> = env::args().collect();
    let mut config_path: Option<PathBuf> = None;
    let mut interval: Option<u64> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--interval" | "-i" => {
                if i + 1 < args.len() {
                    interval = args[i + 1].parse().ok();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            other => warn!(arg = %other, "Ignoring unknown argument"),
        }
        i += 1;
    }

    let mut config = CadenceConfig::load_or_default(config_path);
    if let Some(secs) = interval {
        config.coordinator.update_interval_secs = Some(secs.max(1));
    }
    info!(
        name = %config.coordinator.name,
        interval = ?config.update_interval(),
        "Configuration loaded"
    );

    let host = Arc::new(HostLifecycle::new());
    let coordinator: Coordinator<Reading> = CoordinatorBuilder::from_config(&config)
        .with_source(FlakyStation {
            polls: AtomicU64::new(0),
        })
        .with_host(host.clone())
        .build()?;
    coordinator.register_shutdown(host.clone())?;

    if let Err(err) = coordinator.config_entry_first_refresh().await {
        warn!(error = %err, "First refresh failed, polling anyway");
    }

    let reader = coordinator.clone();
    let subscription = coordinator.add_listener(move || match reader.data() {
        Some(reading) if reader.last_update_success() => info!(
            temperature_c = reading.temperature_c,
            humidity_pct = reading.humidity_pct,
            "Station update"
        ),
        _ => match reader.last_error() {
            Some(err) => error!(error = %err, "Station unavailable"),
            None => warn!("Station unavailable"),
        },
    });

    tokio::signal::ctrl_c().await?;
    info!("Ctrl-C received, stopping");

    subscription.unsubscribe();
    host.stop();

    info!(status = %coordinator.status().to_json()?, "Final status");
    Ok(())
}
