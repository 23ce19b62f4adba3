//! UTXO Locker daemon
//!
//! Hosts one locker per configured bridge, runs their reconciliation monitors
//! and the metrics endpoint, and shuts everything down in order on SIGINT or
//! SIGTERM.

use anyhow::Result;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

use utxo_locker::config::Settings;
use utxo_locker::logging;
use utxo_locker::metrics::MetricsServer;
use utxo_locker::UtxoLocker;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::load()?;

    // Initialize logging
    logging::init(&settings.logging);
    logging::install_panic_hook();

    info!("Starting UTXO Locker v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Loaded configuration for {} bridges",
        settings.enabled_bridges().len()
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // One locker and monitor per bridge
    let mut lockers = Vec::new();
    let mut monitors = Vec::new();
    for (name, bridge) in settings.enabled_bridges() {
        let locker = Arc::new(UtxoLocker::from_config(name, bridge, &settings.locker));
        info!(
            "Bridge {} on chain {} (default TTL {:?})",
            name,
            bridge.chain,
            locker.default_ttl()
        );
        monitors.push(locker.start_monitor());
        lockers.push(locker);
    }

    // Start metrics server
    let metrics_handle = if settings.metrics.enabled {
        let server = MetricsServer::new(settings.metrics.port);
        let shutdown = shutdown_rx.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = server.run(shutdown).await {
                error!("Metrics server error: {:#}", e);
            }
        }))
    } else {
        None
    };

    // Status loop
    let status_handle = tokio::spawn({
        let lockers = lockers.clone();
        let interval = settings.locker.status_interval_secs;
        let mut shutdown = shutdown_rx.clone();
        async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(tokio::time::Duration::from_secs(interval)) => {}
                    _ = shutdown.changed() => break,
                }

                for locker in &lockers {
                    info!(
                        "Bridge {} holds {} locked UTXOs",
                        locker.bridge(),
                        locker.locked_count().await
                    );
                }
            }
        }
    });

    info!("UTXO Locker is running");
    if settings.metrics.enabled {
        info!("Metrics: http://0.0.0.0:{}/metrics", settings.metrics.port);
    }

    // Wait for shutdown signal
    shutdown_signal().await;

    info!("Shutdown signal received, stopping...");

    // Graceful shutdown
    let _ = shutdown_tx.send(true);
    for monitor in monitors {
        monitor.stop().await;
    }
    if let Err(e) = status_handle.await {
        error!("Status task failed: {}", e);
    }
    if let Some(h) = metrics_handle {
        if let Err(e) = h.await {
            error!("Metrics task failed: {}", e);
        }
    }

    info!("UTXO Locker stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
