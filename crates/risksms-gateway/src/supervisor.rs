//! Loads configuration, spawns one `ServiceLoop` per configured service,
//! and installs a process-shutdown hook that drains every `Sender` and
//! `SessionManager`.

use risksms_config::{ConfigLoader, GatewayConfig, ServiceConfig};
use risksms_smpp::{SessionManager, SessionManagerConfig, SmppSession};
use risksms_sender::{Sender, SenderConfig};
use risksms_store::postgres::PostgresMessageStore;
use risksms_store::{LatencyStats, MessageStore};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::service_loop::ServiceLoop;

struct RunningService {
    name: String,
    sender: Arc<Sender>,
    session_manager: Arc<SessionManager>,
    /// `Mutex<Option<_>>` rather than a bare `JoinHandle` so `shutdown` can
    /// take the handle by value through `&self` and leave `health` able to
    /// inspect `is_finished()` without consuming anything.
    handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

/// Owns the process-lifetime set of per-service loops.
pub struct Supervisor {
    running: Arc<AtomicBool>,
    services: Vec<RunningService>,
}

impl Supervisor {
    /// Loads configuration from `config_path` (or the default path when
    /// `None`), connects the shared message store, and binds one session
    /// per configured service.
    pub async fn start(config_path: Option<&Path>) -> anyhow::Result<Self> {
        let config: GatewayConfig = ConfigLoader::new(config_path).load()?;
        let services = config.services();

        info!(count = services.len(), "Starting gateway with configured services");

        let store: Arc<dyn MessageStore> = Arc::new(
            PostgresMessageStore::connect(
                &config.datasource.postgres_url(),
                config.datasource.maximum_pool_size,
                config.datasource.minimum_idle,
                Duration::from_millis(config.datasource.idle_timeout_ms),
                Duration::from_millis(config.datasource.connection_timeout_ms),
            )
            .await?,
        );

        let running = Arc::new(AtomicBool::new(true));
        let mut running_services = Vec::with_capacity(services.len());

        for service_config in services {
            match Self::start_service(&service_config, Arc::clone(&store), Arc::clone(&running)).await {
                Ok(svc) => running_services.push(svc),
                Err(e) => error!(service = %service_config.nombre, error = %e, "Failed to start service, skipping"),
            }
        }

        if running_services.is_empty() {
            anyhow::bail!("no service could be started");
        }

        Ok(Self {
            running,
            services: running_services,
        })
    }

    async fn start_service(
        config: &ServiceConfig,
        store: Arc<dyn MessageStore>,
        running: Arc<AtomicBool>,
    ) -> anyhow::Result<RunningService> {
        let latency = Arc::new(LatencyStats::new(config.nombre.clone(), 100));
        let session_manager = SessionManager::new(Arc::clone(&store), Arc::clone(&latency));

        session_manager
            .bind(SessionManagerConfig {
                service_name: config.nombre.clone(),
                host: config.smpp.host.clone(),
                port: config.smpp.port,
                system_id: config.smpp.system_id.clone(),
                password: config.smpp.password.clone(),
                window_size: 50,
            })
            .await
            .map_err(|e| anyhow::anyhow!("initial bind failed for {}: {e}", config.nombre))?;

        let sender = Sender::new(
            SenderConfig {
                service_name: config.nombre.clone(),
                source_address: config.smpp.source_adress.clone(),
                max_attempts: config.maximo_intentos,
                worker_pool_size: 50,
            },
            Arc::clone(&store),
            Arc::clone(&session_manager),
            latency,
        );

        let service_loop = ServiceLoop::new(config.clone(), store, Arc::clone(&sender), Arc::clone(&running));
        let handle = tokio::spawn(async move {
            service_loop.run().await;
        });

        Ok(RunningService {
            name: config.nombre.clone(),
            sender,
            session_manager,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Per-service liveness: a service is healthy while its loop task has
    /// not finished and its SMPP session is still bound.
    pub async fn health(&self) -> Vec<(String, bool)> {
        let mut health = Vec::with_capacity(self.services.len());
        for service in &self.services {
            let loop_alive = service
                .handle
                .lock()
                .await
                .as_ref()
                .map(|h| !h.is_finished())
                .unwrap_or(false);
            let session_bound = match service.session_manager.current_session().await {
                Some(session) => session.is_bound(),
                None => false,
            };
            health.push((service.name.clone(), loop_alive && session_bound));
        }
        health
    }

    /// Sets the shared running flag false, drains every `Sender` and
    /// `SessionManager`, then waits for each service loop task to exit.
    pub async fn shutdown(&self) {
        info!("Shutdown requested, stopping service loops");
        self.running.store(false, Ordering::SeqCst);

        for service in &self.services {
            service.sender.shutdown().await;
            service.session_manager.shutdown(true).await;
        }

        for service in &self.services {
            let handle = service.handle.lock().await.take();
            if let Some(handle) = handle {
                if let Err(e) = handle.await {
                    warn!(service = %service.name, error = %e, "Service loop task ended abnormally");
                }
            }
        }

        info!("Gateway shutdown complete");
    }
}
