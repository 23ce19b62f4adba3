//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Locked UTXOs per bridge
//! - Claim outcomes and release reasons
//! - Sweep latency and faulting unlock conditions

use anyhow::{Context, Result};
use axum::{http::StatusCode, routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, Encoder,
    GaugeVec, HistogramVec, TextEncoder,
};
use std::net::SocketAddr;
use tokio::sync::watch;
use tracing::{error, info};

lazy_static! {
    pub static ref LOCKED_UTXOS: GaugeVec = register_gauge_vec!(
        "utxo_locker_locked_utxos",
        "Number of currently locked UTXOs",
        &["bridge"]
    ).unwrap();

    pub static ref CLAIMS: CounterVec = register_counter_vec!(
        "utxo_locker_claims_total",
        "Lock attempts by outcome (locked, conflict)",
        &["bridge", "outcome"]
    ).unwrap();

    pub static ref RELEASES: CounterVec = register_counter_vec!(
        "utxo_locker_releases_total",
        "Released UTXOs by reason (explicit, sweep)",
        &["bridge", "reason"]
    ).unwrap();

    pub static ref CONDITION_FAULTS: CounterVec = register_counter_vec!(
        "utxo_locker_condition_faults_total",
        "Unlock conditions that panicked during a sweep",
        &["bridge"]
    ).unwrap();

    pub static ref SWEEP_DURATION: HistogramVec = register_histogram_vec!(
        "utxo_locker_sweep_duration_seconds",
        "Duration of a reconciliation sweep",
        &["bridge"],
        vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]
    ).unwrap();
}

/// Why a UTXO was unlocked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseReason {
    Explicit,
    Sweep,
}

impl ReleaseReason {
    fn as_str(&self) -> &'static str {
        match self {
            ReleaseReason::Explicit => "explicit",
            ReleaseReason::Sweep => "sweep",
        }
    }
}

/// Prometheus metrics server
pub struct MetricsServer {
    port: u16,
}

impl MetricsServer {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    /// Serve `/metrics` until `shutdown` flips to true
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let app = Router::new().route("/metrics", get(metrics_handler));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting metrics server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind metrics server on {}", addr))?;
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.wait_for(|stop| *stop).await;
            })
            .await
            .context("Metrics server failed")?;

        Ok(())
    }
}

async fn metrics_handler() -> (StatusCode, String) {
    match render() {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, String::new())
        }
    }
}

/// Encode all registered metrics in the text exposition format
pub fn render() -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

// Helper functions to record metrics

pub fn record_claim(bridge: &str, locked: bool) {
    let outcome = if locked { "locked" } else { "conflict" };
    CLAIMS.with_label_values(&[bridge, outcome]).inc();
}

pub fn record_release(bridge: &str, reason: ReleaseReason) {
    RELEASES.with_label_values(&[bridge, reason.as_str()]).inc();
}

pub fn record_condition_fault(bridge: &str) {
    CONDITION_FAULTS.with_label_values(&[bridge]).inc();
}

pub fn record_locked_utxos(bridge: &str, count: usize) {
    LOCKED_UTXOS.with_label_values(&[bridge]).set(count as f64);
}

pub fn record_sweep_duration(bridge: &str, secs: f64) {
    SWEEP_DURATION.with_label_values(&[bridge]).observe(secs);
}
