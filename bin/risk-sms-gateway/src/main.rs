//! Risk SMS Gateway
//!
//! Polls a relational outbox table for pending outbound SMS, submits them
//! over one bound SMPP session per configured carrier service, and tracks
//! delivery status back into the same table.
//!
//! ## Usage
//!
//! ```text
//! risk-sms-gateway [CONFIG_PATH]
//! ```
//!
//! `CONFIG_PATH` defaults to `config/risk-sms.yml`.
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `RISK_SMS_METRICS_PORT` | `9090` | Health/metrics port |
//! | `RUST_LOG` | `info` | Log level |

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::extract::State;
use clap::Parser;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use risksms_gateway::Supervisor;
use tokio::signal;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "risk-sms-gateway", version, about = "Risk SMS outbound gateway")]
struct Cli {
    /// Path to the gateway's YAML configuration file.
    #[arg(default_value = "config/risk-sms.yml")]
    config_path: PathBuf,

    /// Health/metrics endpoint port.
    #[arg(long, env = "RISK_SMS_METRICS_PORT", default_value_t = 9090)]
    metrics_port: u16,
}

#[derive(Clone)]
struct AppState {
    supervisor: Arc<Supervisor>,
    prometheus: PrometheusHandle,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    risksms_common::logging::init_logging("risk-sms-gateway");

    let prometheus = PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    info!("Starting Risk SMS Gateway");

    let supervisor = match Supervisor::start(Some(&cli.config_path)).await {
        Ok(supervisor) => Arc::new(supervisor),
        Err(e) => {
            error!(error = %e, "Failed to start gateway");
            std::process::exit(1);
        }
    };

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let state = AppState {
        supervisor: Arc::clone(&supervisor),
        prometheus,
    };

    let metrics_addr = SocketAddr::from(([0, 0, 0, 0], cli.metrics_port));
    let metrics_app = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics_handler))
        .route("/health", axum::routing::get(health_handler))
        .route("/ready", axum::routing::get(ready_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let metrics_listener = tokio::net::TcpListener::bind(metrics_addr).await?;
    info!(%metrics_addr, "Health/metrics server listening");

    let metrics_handle = {
        let mut shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            axum::serve(metrics_listener, metrics_app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.recv().await;
                })
                .await
                .ok();
        })
    };

    info!("Risk SMS Gateway started. Press Ctrl+C to shutdown");
    shutdown_signal().await;
    info!("Shutdown signal received");

    let _ = shutdown_tx.send(());

    let _ = tokio::time::timeout(Duration::from_secs(30), async {
        supervisor.shutdown().await;
        let _ = metrics_handle.await;
    })
    .await;

    info!("Risk SMS Gateway shutdown complete");
    Ok(())
}

async fn metrics_handler(State(state): State<AppState>) -> String {
    state.prometheus.render()
}

async fn health_handler(State(state): State<AppState>) -> axum::Json<serde_json::Value> {
    let services: Vec<_> = state
        .supervisor
        .health()
        .await
        .into_iter()
        .map(|(name, alive)| serde_json::json!({ "service": name, "alive": alive }))
        .collect();
    let all_alive = services.iter().all(|s| s["alive"] == serde_json::json!(true));

    axum::Json(serde_json::json!({
        "status": if all_alive { "UP" } else { "DEGRADED" },
        "version": env!("CARGO_PKG_VERSION"),
        "services": services,
    }))
}

async fn ready_handler() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({ "status": "READY" }))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
