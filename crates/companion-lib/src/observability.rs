//! Observability infrastructure for the companion sync layer
//!
//! Provides:
//! - Prometheus metrics (request counts, reply latency, in-flight state, list size)
//! - Structured logging of sync events with tracing

use crate::models::SyncStatus;
use crate::transport::ActivationState;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for reply latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<SyncMetricsInner> = OnceLock::new();

struct SyncMetricsInner {
    requests_sent: IntCounter,
    request_failures: IntCounterVec,
    reply_latency_seconds: Histogram,
    request_in_flight: IntGauge,
    pois_current: IntGauge,
    rows_touched: IntCounter,
    complication_refreshes: IntCounter,
    pushes_received: IntCounterVec,
}

impl SyncMetricsInner {
    fn new() -> Self {
        Self {
            requests_sent: register_int_counter!(
                "companion_sync_requests_sent_total",
                "Refresh requests sent to the peer device"
            )
            .expect("Failed to register requests_sent"),

            request_failures: register_int_counter_vec!(
                "companion_sync_failures_total",
                "Sync attempts that ended in a failure status",
                &["status"]
            )
            .expect("Failed to register request_failures"),

            reply_latency_seconds: register_histogram!(
                "companion_sync_reply_latency_seconds",
                "Time between sending a refresh request and handling its reply",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register reply_latency_seconds"),

            request_in_flight: register_int_gauge!(
                "companion_sync_request_in_flight",
                "1 while a refresh request is awaiting its reply"
            )
            .expect("Failed to register request_in_flight"),

            pois_current: register_int_gauge!(
                "companion_sync_pois_current",
                "Number of points of interest currently held"
            )
            .expect("Failed to register pois_current"),

            rows_touched: register_int_counter!(
                "companion_sync_rows_touched_total",
                "List rows rewritten by the reconciler"
            )
            .expect("Failed to register rows_touched"),

            complication_refreshes: register_int_counter!(
                "companion_sync_complication_refreshes_total",
                "Complication timeline reloads triggered by nearest changes"
            )
            .expect("Failed to register complication_refreshes"),

            pushes_received: register_int_counter_vec!(
                "companion_sync_pushes_received_total",
                "Payloads pushed by the peer, by delivery channel",
                &["channel"]
            )
            .expect("Failed to register pushes_received"),
        }
    }
}

/// Sync metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct SyncMetrics {
    _private: (),
}

impl Default for SyncMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(SyncMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &SyncMetricsInner {
        GLOBAL_METRICS.get_or_init(SyncMetricsInner::new)
    }

    pub fn inc_requests_sent(&self) {
        self.inner().requests_sent.inc();
    }

    pub fn inc_failures(&self, status: SyncStatus) {
        self.inner()
            .request_failures
            .with_label_values(&[status.as_str()])
            .inc();
    }

    pub fn observe_reply_latency(&self, duration_secs: f64) {
        self.inner().reply_latency_seconds.observe(duration_secs);
    }

    pub fn set_in_flight(&self, in_flight: bool) {
        self.inner().request_in_flight.set(i64::from(in_flight));
    }

    pub fn set_pois_current(&self, count: usize) {
        self.inner().pois_current.set(count as i64);
    }

    pub fn add_rows_touched(&self, rows: u64) {
        self.inner().rows_touched.inc_by(rows);
    }

    pub fn inc_complication_refreshes(&self) {
        self.inner().complication_refreshes.inc();
    }

    pub fn inc_pushes_received(&self, channel: &str) {
        self.inner()
            .pushes_received
            .with_label_values(&[channel])
            .inc();
    }
}

/// Structured logger for sync events
#[derive(Clone)]
pub struct SyncLogger {
    device_name: String,
}

impl SyncLogger {
    pub fn new(device_name: impl Into<String>) -> Self {
        Self {
            device_name: device_name.into(),
        }
    }

    pub fn log_startup(&self, version: &str) {
        info!(
            event = "companion_started",
            device = %self.device_name,
            version = %version,
            "Companion sync started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "companion_shutdown",
            device = %self.device_name,
            reason = %reason,
            "Companion sync shutting down"
        );
    }

    pub fn log_session_state(&self, state: ActivationState, reachable: bool) {
        info!(
            event = "session_state",
            device = %self.device_name,
            activation = %state.as_str(),
            reachable = reachable,
            "Session state changed"
        );
    }

    pub fn log_sync_started(&self, max_radius_km: f64, max_results: u32) {
        info!(
            event = "sync_started",
            device = %self.device_name,
            max_radius_km = max_radius_km,
            max_results = max_results,
            "Requesting nearby points of interest"
        );
    }

    pub fn log_sync_outcome(&self, status: SyncStatus, count: usize, detail: &str) {
        if status.is_ok() {
            info!(
                event = "sync_outcome",
                device = %self.device_name,
                status = %status,
                count = count,
                "Points of interest updated"
            );
        } else {
            warn!(
                event = "sync_outcome",
                device = %self.device_name,
                status = %status,
                detail = %detail,
                "Sync failed"
            );
        }
    }

    pub fn log_nearest_changed(&self, title: Option<&str>) {
        info!(
            event = "nearest_changed",
            device = %self.device_name,
            nearest = title.unwrap_or("none"),
            "Nearest point of interest changed"
        );
    }
}
