//! # fleetvisord
//!
//! Hosted deployment of the fleetvisor core: a device registry (SQLite or
//! in-memory), HTTP delivery, the scheduler's tick loop, and the operator
//! JSON surface, wired together behind one listener.
//!
//! ```bash
//! fleetvisord --listen 0.0.0.0:8080 --db /var/lib/fleetvisor/devices.db
//! ```
//!
//! Exits 0 on clean shutdown (SIGINT/SIGTERM) and non-zero when startup
//! fails (port bind, registry open, delivery construction).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;

use fleetvisor::server::{self, ApiState};
use fleetvisor::{
    DeviceRegistry, EngineConfig, HttpDelivery, MemoryRegistry, RolloutEngine, Scheduler,
    SchedulerConfig, SqliteRegistry,
};

/// Fleet update orchestration daemon.
#[derive(Parser, Debug)]
#[command(name = "fleetvisord")]
#[command(about = "Fleet update orchestration daemon", version)]
struct Args {
    /// Listen address for the HTTP surface.
    #[arg(long, default_value = "0.0.0.0:8080")]
    listen: String,

    /// SQLite database path for the device registry. In-memory registry
    /// when omitted.
    #[arg(long)]
    db: Option<PathBuf>,

    /// Scheduler tick interval in seconds.
    #[arg(long, default_value_t = 60)]
    tick_interval_secs: u64,

    /// Maximum concurrent device pushes per update.
    #[arg(long, default_value_t = 100)]
    max_concurrent: usize,

    /// Maximum concurrently running updates.
    #[arg(long, default_value_t = 5)]
    max_concurrent_updates: usize,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .parse_filters(&args.log_level)
        .init();

    let registry: Arc<dyn DeviceRegistry> = match &args.db {
        Some(path) => {
            let registry = SqliteRegistry::open(path)
                .with_context(|| format!("open registry {}", path.display()))?;
            log::info!("registry: sqlite at {}", path.display());
            Arc::new(registry)
        }
        None => {
            log::info!("registry: in-memory (state is lost on restart)");
            Arc::new(MemoryRegistry::new())
        }
    };

    let delivery = Arc::new(HttpDelivery::new().context("construct http delivery")?);
    let engine = Arc::new(
        RolloutEngine::new(
            EngineConfig {
                max_concurrent: args.max_concurrent,
                ..EngineConfig::default()
            },
            Arc::clone(&registry),
            delivery,
        )
        .context("construct rollout engine")?,
    );

    let scheduler = Arc::new(Scheduler::new(
        SchedulerConfig {
            tick_interval: Duration::from_secs(args.tick_interval_secs.max(1)),
            max_concurrent_updates: args.max_concurrent_updates,
        },
        engine,
        Arc::clone(&registry),
    ));
    scheduler
        .start()
        .map_err(|e| anyhow::anyhow!("start scheduler: {e}"))?;

    let state = Arc::new(ApiState {
        scheduler: Arc::clone(&scheduler),
        registry,
    });

    server::serve(&args.listen, state, shutdown_signal())
        .await
        .with_context(|| format!("serve on {}", args.listen))?;

    scheduler
        .stop()
        .await
        .map_err(|e| anyhow::anyhow!("stop scheduler: {e}"))?;
    log::info!("shutdown complete");
    Ok(())
}

/// Resolves when the process receives SIGINT or SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sig) => sig,
            Err(e) => {
                log::warn!("sigterm handler unavailable: {e}");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
