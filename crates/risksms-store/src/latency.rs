//! `LatencyStats` — submit-response latency and timeout accounting for one
//! service. Reads are best-effort monitoring, not billing: summary fields
//! are snapshotted independently rather than under one lock.

use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

#[derive(Debug, Default)]
struct Accumulator {
    count: AtomicU64,
    sum_ms: AtomicU64,
    min_ms: AtomicU64,
    max_ms: AtomicU64,
}

impl Accumulator {
    fn record(&self, ms: u64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum_ms.fetch_add(ms, Ordering::Relaxed);
        self.max_ms.fetch_max(ms, Ordering::Relaxed);
        // min starts at 0 (the atomic default); treat 0 as "unset" so the
        // first observation always wins regardless of its value.
        loop {
            let current = self.min_ms.load(Ordering::Relaxed);
            if current != 0 && current <= ms {
                break;
            }
            if self
                .min_ms
                .compare_exchange_weak(current, ms, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                break;
            }
        }
    }

    fn reset(&self) {
        self.count.store(0, Ordering::Relaxed);
        self.sum_ms.store(0, Ordering::Relaxed);
        self.min_ms.store(0, Ordering::Relaxed);
        self.max_ms.store(0, Ordering::Relaxed);
    }

    fn snapshot(&self) -> AccumulatorSnapshot {
        AccumulatorSnapshot {
            count: self.count.load(Ordering::Relaxed),
            sum_ms: self.sum_ms.load(Ordering::Relaxed),
            min_ms: self.min_ms.load(Ordering::Relaxed),
            max_ms: self.max_ms.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccumulatorSnapshot {
    pub count: u64,
    pub sum_ms: u64,
    pub min_ms: u64,
    pub max_ms: u64,
}

/// Thread-safe latency and timeout accumulator for one carrier service.
/// `record` feeds both the all-time and windowed accumulators; every
/// `report_every`-th successful record emits a summary line and resets the
/// window only (all-time figures are never reset).
pub struct LatencyStats {
    all_time: Accumulator,
    window: Accumulator,
    timeouts: Accumulator,
    report_every: u64,
    service_name: String,
}

impl LatencyStats {
    pub fn new(service_name: impl Into<String>, report_every: u64) -> Self {
        Self {
            all_time: Accumulator::default(),
            window: Accumulator::default(),
            timeouts: Accumulator::default(),
            report_every: report_every.max(1),
            service_name: service_name.into(),
        }
    }

    pub fn record(&self, ms: u64) {
        self.all_time.record(ms);
        self.window.record(ms);

        metrics::counter!("risk_sms.submit.latency_samples_total", "service" => self.service_name.clone()).increment(1);
        metrics::histogram!("risk_sms.submit.latency_ms", "service" => self.service_name.clone()).record(ms as f64);

        let window_count = self.window.count.load(Ordering::Relaxed);
        if window_count % self.report_every == 0 {
            let snap = self.window.snapshot();
            info!(
                service = %self.service_name,
                count = snap.count,
                avg_ms = if snap.count > 0 { snap.sum_ms / snap.count } else { 0 },
                min_ms = snap.min_ms,
                max_ms = snap.max_ms,
                "Latency window report"
            );
            self.window.reset();
        }
    }

    pub fn record_timeout(&self, ms: u64) {
        self.timeouts.record(ms);
        metrics::counter!("risk_sms.submit.timeouts_total", "service" => self.service_name.clone()).increment(1);
    }

    pub fn all_time_snapshot(&self) -> AccumulatorSnapshot {
        self.all_time.snapshot()
    }

    pub fn window_snapshot(&self) -> AccumulatorSnapshot {
        self.window.snapshot()
    }

    pub fn timeout_snapshot(&self) -> AccumulatorSnapshot {
        self.timeouts.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_accumulate_count_and_sum() {
        let stats = LatencyStats::new("svc", 100);
        stats.record(10);
        stats.record(20);
        let snap = stats.all_time_snapshot();
        assert_eq!(snap.count, 2);
        assert_eq!(snap.sum_ms, 30);
        assert_eq!(snap.min_ms, 10);
        assert_eq!(snap.max_ms, 20);
    }

    #[test]
    fn window_resets_every_report_every_records() {
        let stats = LatencyStats::new("svc", 3);
        stats.record(1);
        stats.record(2);
        stats.record(3);
        assert_eq!(stats.window_snapshot().count, 0);
        assert_eq!(stats.all_time_snapshot().count, 3);
    }

    #[test]
    fn timeouts_are_tracked_independently_of_successes() {
        let stats = LatencyStats::new("svc", 100);
        stats.record(5);
        stats.record_timeout(3000);
        assert_eq!(stats.all_time_snapshot().count, 1);
        assert_eq!(stats.timeout_snapshot().count, 1);
        assert_eq!(stats.timeout_snapshot().sum_ms, 3000);
    }
}
