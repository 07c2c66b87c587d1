//! Per-service polling loop: batch claim, dispatch, sleep, repeat until
//! shut down.

use risksms_config::ServiceConfig;
use risksms_sender::{DispatchMode, Sender};
use risksms_store::MessageStore;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

const COUNTER_WRAP: u32 = 100;

/// One configured service's batch-claim-dispatch-sleep cycle. Owns
/// nothing about the session itself — it only talks to `MessageStore`
/// and `Sender`.
pub struct ServiceLoop {
    config: ServiceConfig,
    store: Arc<dyn MessageStore>,
    sender: Arc<Sender>,
    running: Arc<AtomicBool>,
    counter: AtomicU32,
}

impl ServiceLoop {
    pub fn new(config: ServiceConfig, store: Arc<dyn MessageStore>, sender: Arc<Sender>, running: Arc<AtomicBool>) -> Self {
        Self {
            config,
            store,
            sender,
            running,
            counter: AtomicU32::new(1),
        }
    }

    pub async fn run(&self) {
        let interval = Duration::from_millis(self.config.intervalo_entre_lotes_ms);
        let mode: DispatchMode = self.config.modo_envio_lote.parse().unwrap_or(DispatchMode::SequentialSpaced);

        while self.running.load(Ordering::SeqCst) {
            let count = self.next_count();
            if let Err(e) = self.run_one_iteration(mode, count).await {
                error!(service = %self.config.nombre, count, error = %e, "Service loop iteration failed");
            }
            tokio::time::sleep(interval).await;
        }

        info!(service = %self.config.nombre, "Service loop stopped");
    }

    async fn run_one_iteration(&self, mode: DispatchMode, count: u32) -> anyhow::Result<()> {
        let messages = self
            .store
            .load_pending_messages(
                &self.config.smpp.source_adress,
                self.config.telefonia.as_deref(),
                self.config.clasificacion.as_deref(),
                self.config.cantidad_maxima_por_lote,
            )
            .await;

        if messages.is_empty() {
            debug!(service = %self.config.nombre, count, "No pending messages this cycle");
            return Ok(());
        }

        info!(service = %self.config.nombre, count, batch_size = messages.len(), "Dispatching batch");
        self.sender
            .send(mode, messages, self.config.smpp.send_delay_ms as i64)
            .await;
        Ok(())
    }

    fn next_count(&self) -> u32 {
        self.counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |c| {
                Some(if c >= COUNTER_WRAP { 1 } else { c + 1 })
            })
            .unwrap_or(1)
    }
}
