use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;

/// Process-wide counters shared by every session and invocation.
///
/// All updates are single atomic operations; no invariant spans two counters.
#[derive(Debug)]
pub struct Metrics {
    started: Instant,
    completed: AtomicU64,
    latency_micros: AtomicU64,
    in_flight: AtomicI64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub queries_executed: u64,
    pub avg_latency_ms: f64,
    pub active_tasks: i64,
    pub uptime_seconds: u64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            completed: AtomicU64::new(0),
            latency_micros: AtomicU64::new(0),
            in_flight: AtomicI64::new(0),
        }
    }

    /// Counts one finished invocation. Sub-microsecond work is rounded up so a
    /// non-zero count never averages to zero.
    pub fn record_completion(&self, elapsed: Duration) {
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX).max(1);
        self.completed.fetch_add(1, Ordering::Relaxed);
        self.latency_micros.fetch_add(micros, Ordering::Relaxed);
    }

    pub fn record_task_start(&self) {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_task_end(&self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }

    /// Increments the in-flight count until the returned guard is dropped.
    pub fn track_task(&self) -> TaskGuard<'_> {
        self.record_task_start();
        TaskGuard { metrics: self }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let completed = self.completed.load(Ordering::Relaxed);
        let micros = self.latency_micros.load(Ordering::Relaxed);
        let avg_latency_ms = if completed == 0 {
            0.0
        } else {
            micros as f64 / completed as f64 / 1000.0
        };
        MetricsSnapshot {
            queries_executed: completed,
            avg_latency_ms,
            active_tasks: self.in_flight.load(Ordering::Relaxed),
            uptime_seconds: self.started.elapsed().as_secs(),
        }
    }
}

pub struct TaskGuard<'a> {
    metrics: &'a Metrics,
}

impl Drop for TaskGuard<'_> {
    fn drop(&mut self) {
        self.metrics.record_task_end();
    }
}
