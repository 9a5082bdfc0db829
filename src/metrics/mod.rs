//! Prometheus metrics for monitoring.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Metrics collector.
#[derive(Debug, Default)]
pub struct Metrics {
    /// Total requests dispatched
    pub requests_total: AtomicU64,
    /// Requests answered with a protocol error
    pub requests_failed: AtomicU64,
    /// Frames that could not be decoded
    pub malformed_frames: AtomicU64,
    /// Tool calls that reached a handler
    pub tool_calls: AtomicU64,
    /// Tool calls that returned `isError`
    pub tool_errors: AtomicU64,
    /// Requests that hit the request timeout
    pub timeouts: AtomicU64,
    /// Requests cancelled by the host
    pub cancellations: AtomicU64,
    /// Open sessions
    pub active_sessions: AtomicU64,
    /// Cumulative request latency in milliseconds
    pub request_latency_ms: AtomicU64,
}

impl Metrics {
    /// Create a new metrics collector.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn inc_requests(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_failed(&self) {
        self.requests_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_malformed(&self) {
        self.malformed_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_tool_calls(&self) {
        self.tool_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_tool_errors(&self) {
        self.tool_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_timeouts(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_cancellations(&self) {
        self.cancellations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_opened(&self) {
        self.active_sessions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_closed(&self) {
        // Never wraps below zero.
        let _ = self
            .active_sessions
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    pub fn observe_latency(&self, timer: &Timer) {
        self.request_latency_ms
            .fetch_add(timer.elapsed_ms(), Ordering::Relaxed);
    }

    /// Get all metrics as a snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_total: self.requests_total.load(Ordering::Relaxed),
            requests_failed: self.requests_failed.load(Ordering::Relaxed),
            malformed_frames: self.malformed_frames.load(Ordering::Relaxed),
            tool_calls: self.tool_calls.load(Ordering::Relaxed),
            tool_errors: self.tool_errors.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            cancellations: self.cancellations.load(Ordering::Relaxed),
            active_sessions: self.active_sessions.load(Ordering::Relaxed),
            request_latency_ms: self.request_latency_ms.load(Ordering::Relaxed),
        }
    }

    /// Export metrics in Prometheus format.
    pub fn to_prometheus(&self) -> String {
        let s = self.snapshot();
        let series: [(&str, &str, &str, u64); 9] = [
            ("requests_total", "counter", "Total number of requests", s.requests_total),
            ("requests_failed_total", "counter", "Requests answered with a protocol error", s.requests_failed),
            ("malformed_frames_total", "counter", "Frames that could not be decoded", s.malformed_frames),
            ("tool_calls_total", "counter", "Tool calls that reached a handler", s.tool_calls),
            ("tool_errors_total", "counter", "Tool calls that returned isError", s.tool_errors),
            ("timeouts_total", "counter", "Requests that timed out", s.timeouts),
            ("cancellations_total", "counter", "Requests cancelled by the host", s.cancellations),
            ("active_sessions", "gauge", "Open sessions", s.active_sessions),
            ("request_latency_ms_total", "counter", "Cumulative request latency in milliseconds", s.request_latency_ms),
        ];

        let mut out = String::new();
        for (name, kind, help, value) in series {
            out.push_str(&format!(
                "# HELP workspace_mcp_{name} {help}\n# TYPE workspace_mcp_{name} {kind}\nworkspace_mcp_{name} {value}\n\n"
            ));
        }
        out
    }
}

/// Metrics snapshot.
#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSnapshot {
    pub requests_total: u64,
    pub requests_failed: u64,
    pub malformed_frames: u64,
    pub tool_calls: u64,
    pub tool_errors: u64,
    pub timeouts: u64,
    pub cancellations: u64,
    pub active_sessions: u64,
    pub request_latency_ms: u64,
}

/// Timer for measuring durations.
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start a new timer.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed time in milliseconds.
    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    /// Get elapsed time in seconds.
    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_and_snapshot() {
        let metrics = Metrics::new();
        metrics.inc_requests();
        metrics.inc_requests();
        metrics.inc_failed();
        metrics.inc_tool_calls();
        metrics.inc_tool_errors();

        let s = metrics.snapshot();
        assert_eq!(s.requests_total, 2);
        assert_eq!(s.requests_failed, 1);
        assert_eq!(s.tool_calls, 1);
        assert_eq!(s.tool_errors, 1);
        assert_eq!(s.timeouts, 0);
    }

    #[test]
    fn test_sessions_gauge_saturates() {
        let metrics = Metrics::new();
        metrics.session_closed();
        assert_eq!(metrics.snapshot().active_sessions, 0);
        metrics.session_opened();
        metrics.session_opened();
        metrics.session_closed();
        assert_eq!(metrics.snapshot().active_sessions, 1);
    }

    #[test]
    fn test_prometheus_format() {
        let metrics = Metrics::new();
        metrics.inc_requests();
        metrics.session_opened();

        let text = metrics.to_prometheus();
        assert!(text.contains("# TYPE workspace_mcp_requests_total counter\nworkspace_mcp_requests_total 1\n"));
        assert!(text.contains("# TYPE workspace_mcp_active_sessions gauge\nworkspace_mcp_active_sessions 1\n"));
        assert!(text.contains("# HELP workspace_mcp_tool_errors_total"));
    }

    #[test]
    fn test_timer() {
        let timer = Timer::start();
        assert!(timer.elapsed_secs() >= 0.0);
    }
}
