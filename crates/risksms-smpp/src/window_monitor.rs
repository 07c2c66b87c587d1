//! Periodic inspection of a session's in-flight submit window: cancels
//! stale slots and, on sustained saturation, triggers a rebind.

use risksms_store::LatencyStats;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::session::SmppSession;

const DEFAULT_HISTORY_LEN: usize = 10;
const DEFAULT_MIN_CRITICAL_OCCURRENCES: usize = 5;
const DEFAULT_SATURATION_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone)]
pub struct WindowMonitorConfig {
    pub initial_delay: Duration,
    pub period: Duration,
    pub threshold: Duration,
    pub max_window_size: usize,
    pub history_len: usize,
    pub min_critical_occurrences: usize,
    pub saturation_threshold: f64,
}

impl Default for WindowMonitorConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(15),
            period: Duration::from_secs(30),
            threshold: Duration::from_secs(30),
            max_window_size: 50,
            history_len: DEFAULT_HISTORY_LEN,
            min_critical_occurrences: DEFAULT_MIN_CRITICAL_OCCURRENCES,
            saturation_threshold: DEFAULT_SATURATION_THRESHOLD,
        }
    }
}

/// Circular boolean history of "was this inspection critical" flags, with
/// an incrementally maintained true-count so evaluating saturation never
/// needs to rescan the buffer.
struct CriticalHistory {
    flags: Vec<bool>,
    write_index: usize,
    true_count: usize,
}

impl CriticalHistory {
    fn new(len: usize) -> Self {
        Self {
            flags: vec![false; len],
            write_index: 0,
            true_count: 0,
        }
    }

    fn push(&mut self, critical: bool) {
        let outgoing = self.flags[self.write_index];
        if outgoing {
            self.true_count -= 1;
        }
        if critical {
            self.true_count += 1;
        }
        self.flags[self.write_index] = critical;
        self.write_index = (self.write_index + 1) % self.flags.len();
    }

    fn reset(&mut self) {
        self.flags.iter_mut().for_each(|f| *f = false);
        self.true_count = 0;
        self.write_index = 0;
    }
}

/// Owns one session's window inspection loop. The rebind callback is
/// invoked inline on the monitor's own task; it must not block for long,
/// since the next scheduled tick waits behind it.
pub struct WindowMonitor {
    config: WindowMonitorConfig,
    history: Mutex<CriticalHistory>,
    running: AtomicBool,
    liberated_total: AtomicUsize,
}

impl WindowMonitor {
    pub fn new(config: WindowMonitorConfig) -> Arc<Self> {
        let history_len = config.history_len;
        Arc::new(Self {
            config,
            history: Mutex::new(CriticalHistory::new(history_len)),
            running: AtomicBool::new(true),
            liberated_total: AtomicUsize::new(0),
        })
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Spawns the periodic inspection task. `on_rebind` is called at most
    /// once per sustained-saturation episode; after it runs the history
    /// is zeroed so the next episode requires a fresh run of critical
    /// inspections.
    pub fn spawn<F, Fut>(
        self: &Arc<Self>,
        session: Arc<dyn SmppSession>,
        latency: Arc<LatencyStats>,
        on_rebind: F,
    ) -> tokio::task::JoinHandle<()>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(monitor.config.initial_delay).await;
            let mut ticker = tokio::time::interval(monitor.config.period);
            while monitor.running.load(Ordering::SeqCst) {
                ticker.tick().await;
                if !monitor.running.load(Ordering::SeqCst) {
                    break;
                }
                monitor.inspect(session.as_ref(), latency.as_ref(), &on_rebind).await;
            }
        })
    }

    async fn inspect<F, Fut>(&self, session: &dyn SmppSession, latency: &LatencyStats, on_rebind: &F)
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = ()>,
    {
        let snapshot = session.window_snapshot().await;
        let window_len = snapshot.len();
        let mut liberated = 0usize;

        for entry in snapshot {
            let elapsed = entry.offered_at.elapsed();
            if elapsed > self.config.threshold {
                let elapsed_ms = elapsed.as_millis() as u64;
                if session.cancel_slot(entry.sequence_number).await {
                    liberated += 1;
                    latency.record_timeout(elapsed_ms);
                } else {
                    warn!(sequence_number = entry.sequence_number, "Failed to cancel stale slot");
                    latency.record_timeout(elapsed_ms);
                }
            }
        }

        if liberated > 0 {
            self.liberated_total.fetch_add(liberated, Ordering::Relaxed);
            metrics::counter!("risk_sms.window.slots_liberated_total").increment(liberated as u64);
        }
        metrics::gauge!("risk_sms.window.in_flight").set(window_len as f64);

        let critical = liberated as f64
            >= self.config.max_window_size as f64 * self.config.saturation_threshold;

        let mut history = self.history.lock().await;
        history.push(critical);
        let should_rebind = history.true_count >= self.config.min_critical_occurrences;
        if should_rebind {
            history.reset();
        }
        drop(history);

        if should_rebind {
            info!(liberated, "Window saturation threshold reached, triggering rebind");
            on_rebind().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_true_count_tracks_pushes_incrementally() {
        let mut history = CriticalHistory::new(4);
        history.push(true);
        history.push(true);
        history.push(false);
        assert_eq!(history.true_count, 2);
        history.push(true);
        history.push(true); // overwrites the first `true`, count stays bounded
        assert_eq!(history.true_count, 3);
    }

    #[test]
    fn reset_clears_count_and_flags() {
        let mut history = CriticalHistory::new(3);
        history.push(true);
        history.push(true);
        history.reset();
        assert_eq!(history.true_count, 0);
        assert!(history.flags.iter().all(|f| !f));
    }
}
