//! Owns the bound SMPP session and its window monitor for one carrier
//! service; exposes a stable "current session" provider to `Sender`.

use risksms_store::{LatencyStats, MessageStore};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};

use crate::inbound::InboundHandler;
use crate::production::ProductionSmppSession;
use crate::session::SmppSession;
use crate::window_monitor::{WindowMonitor, WindowMonitorConfig};

const REBIND_ATTEMPTS: u32 = 5;
const REBIND_POST_SHUTDOWN_DELAY: Duration = Duration::from_secs(15);
const REBIND_RETRY_DELAY: Duration = Duration::from_secs(2);
const UNBIND_WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct SessionManagerConfig {
    pub service_name: String,
    pub host: String,
    pub port: u16,
    pub system_id: String,
    pub password: String,
    pub window_size: usize,
}

/// One carrier service's session lifecycle. Holds at most one bound
/// session at a time; `rebind` is serialized against itself via
/// `rebind_lock`.
pub struct SessionManager {
    store: Arc<dyn MessageStore>,
    latency: Arc<LatencyStats>,
    config: RwLock<Option<SessionManagerConfig>>,
    session: RwLock<Option<Arc<dyn SmppSession>>>,
    monitor: Mutex<Option<(Arc<WindowMonitor>, tokio::task::JoinHandle<()>)>>,
    inbound_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
    rebind_lock: Mutex<()>,
    shutting_down: AtomicBool,
}

impl SessionManager {
    pub fn new(store: Arc<dyn MessageStore>, latency: Arc<LatencyStats>) -> Arc<Self> {
        Arc::new(Self {
            store,
            latency,
            config: RwLock::new(None),
            session: RwLock::new(None),
            monitor: Mutex::new(None),
            inbound_task: Mutex::new(None),
            rebind_lock: Mutex::new(()),
            shutting_down: AtomicBool::new(false),
        })
    }

    /// Current bound session, if any. Sender calls this on every send —
    /// it never caches the returned handle across calls.
    pub async fn current_session(&self) -> Option<Arc<dyn SmppSession>> {
        self.session.read().await.clone()
    }

    /// Installs a session directly, without going through `bind`'s TCP
    /// connect and inbound/monitor task setup. Used to inject a fake
    /// session in tests of components built against the `SmppSession`
    /// trait seam.
    pub async fn set_session(&self, session: Arc<dyn SmppSession>) {
        *self.session.write().await = Some(session);
    }

    pub async fn bind(self: &Arc<Self>, config: SessionManagerConfig) -> Result<(), String> {
        let session_name = format!("SMPP-RiskSession-{}", config.system_id);
        let session = ProductionSmppSession::bind(
            &config.host,
            config.port,
            &config.system_id,
            &config.password,
            &session_name,
        )
        .await
        .map_err(|e| e.to_string())?;

        let session: Arc<dyn SmppSession> = Arc::new(session);
        *self.session.write().await = Some(Arc::clone(&session));
        *self.config.write().await = Some(config.clone());

        let handler = Arc::new(InboundHandler::new(config.service_name.clone(), Arc::clone(&self.store)));
        let inbound_task = self.spawn_inbound_loop(Arc::clone(&session), handler);
        *self.inbound_task.lock().await = Some(inbound_task);

        let monitor_config = WindowMonitorConfig {
            max_window_size: config.window_size,
            ..WindowMonitorConfig::default()
        };
        let monitor = WindowMonitor::new(monitor_config);
        let manager = Arc::clone(self);
        let monitor_session = Arc::clone(&session);
        let latency = Arc::clone(&self.latency);
        let handle = monitor.spawn(monitor_session, latency, move || {
            let manager = Arc::clone(&manager);
            async move {
                manager.rebind().await;
            }
        });
        *self.monitor.lock().await = Some((monitor, handle));

        info!(service = %config.service_name, "Session bound");
        Ok(())
    }

    fn spawn_inbound_loop(
        &self,
        session: Arc<dyn SmppSession>,
        handler: Arc<InboundHandler>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match session.receive().await {
                    Ok(pdu) => {
                        handler
                            .handle(pdu.esm_class, &pdu.source_addr, &pdu.dest_addr, &pdu.short_message)
                            .await;
                    }
                    Err(e) => {
                        warn!(error = %e.to_string(), "Inbound receive loop ending");
                        break;
                    }
                }
            }
        })
    }

    pub async fn shutdown(&self, force: bool) {
        self.shutting_down.store(true, Ordering::SeqCst);

        if let Some((monitor, handle)) = self.monitor.lock().await.take() {
            monitor.stop();
            if force {
                handle.abort();
            }
        }

        if let Some(handle) = self.inbound_task.lock().await.take() {
            handle.abort();
        }

        let session = self.session.write().await.take();
        if let Some(session) = session {
            if session.is_bound() {
                if let Err(e) = session.unbind(UNBIND_WAIT).await {
                    error!(error = %e, "Error unbinding session during shutdown");
                }
            }
        }
    }

    /// Serialized against itself. Up to 5 attempts; between attempts,
    /// shutdown(false) then sleep 15s, then bind with memoized parameters;
    /// 2s between failed attempts.
    pub async fn rebind(self: &Arc<Self>) {
        let _guard = self.rebind_lock.lock().await;

        let config = match self.config.read().await.clone() {
            Some(c) => c,
            None => {
                error!("Cannot rebind: no memoized session configuration");
                return;
            }
        };

        for attempt in 1..=REBIND_ATTEMPTS {
            self.shutdown(false).await;
            tokio::time::sleep(REBIND_POST_SHUTDOWN_DELAY).await;

            match self.bind(config.clone()).await {
                Ok(()) => {
                    info!(service = %config.service_name, attempt, "Rebind succeeded");
                    return;
                }
                Err(e) => {
                    warn!(service = %config.service_name, attempt, error = %e, "Rebind attempt failed");
                    if attempt < REBIND_ATTEMPTS {
                        tokio::time::sleep(REBIND_RETRY_DELAY).await;
                    }
                }
            }
        }

        error!(service = %config.service_name, attempts = REBIND_ATTEMPTS, "Rebind exhausted all attempts");
    }
}
