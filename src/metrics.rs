use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec_with_registry, register_int_counter_vec_with_registry,
    register_int_counter_with_registry, register_int_gauge_with_registry, Encoder, HistogramVec,
    IntCounter, IntCounterVec, IntGauge, Registry, TextEncoder,
};
use std::time::Instant;

use crate::{MonitorError, Result};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    pub static ref SERVICE_UP: IntGauge = register_int_gauge_with_registry!(
        "cpu_monitor_up",
        "Whether the service is up (1) or down (0)",
        REGISTRY
    ).unwrap();

    // Request metrics
    pub static ref REQUEST_COUNTER: IntCounter = register_int_counter_with_registry!(
        "cpu_monitor_requests_total",
        "Total number of CPU usage requests received",
        REGISTRY
    ).unwrap();

    pub static ref REQUEST_DURATION: HistogramVec = register_histogram_vec_with_registry!(
        "cpu_monitor_request_duration_seconds",
        "CPU usage request duration in seconds",
        &["outcome"],
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0],
        REGISTRY
    ).unwrap();

    pub static ref PIPELINE_FAILURES: IntCounterVec = register_int_counter_vec_with_registry!(
        "cpu_monitor_pipeline_failures_total",
        "Pipeline failures by error kind",
        &["kind"],
        REGISTRY
    ).unwrap();

    // Upstream metrics
    pub static ref UPSTREAM_CALL_DURATION: HistogramVec = register_histogram_vec_with_registry!(
        "cpu_monitor_upstream_call_duration_seconds",
        "Duration of a single directory or metrics backend call",
        &["service", "outcome"],
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0],
        REGISTRY
    ).unwrap();
}

pub fn init_metrics() {
    lazy_static::initialize(&REQUEST_COUNTER);
    lazy_static::initialize(&REQUEST_DURATION);
    lazy_static::initialize(&PIPELINE_FAILURES);
    lazy_static::initialize(&UPSTREAM_CALL_DURATION);
    SERVICE_UP.set(1);

    #[cfg(target_os = "linux")]
    {
        let collector = prometheus::process_collector::ProcessCollector::for_self();
        if let Err(e) = REGISTRY.register(Box::new(collector)) {
            tracing::warn!("Process metrics unavailable: {}", e);
        }
    }
}

/// Times one pipeline run; records the outcome on drop.
pub struct RequestTimer {
    start: Instant,
    outcome: &'static str,
}

impl RequestTimer {
    pub fn new() -> Self {
        REQUEST_COUNTER.inc();
        Self {
            start: Instant::now(),
            outcome: "error",
        }
    }

    pub fn succeed(&mut self) {
        self.outcome = "ok";
    }
}

impl Default for RequestTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RequestTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        REQUEST_DURATION
            .with_label_values(&[self.outcome])
            .observe(duration);
    }
}

pub fn record_failure(err: &MonitorError) {
    PIPELINE_FAILURES.with_label_values(&[err.kind()]).inc();
}

pub fn observe_upstream_call(service: &str, duration: f64, ok: bool) {
    let outcome = if ok { "ok" } else { "error" };
    UPSTREAM_CALL_DURATION
        .with_label_values(&[service, outcome])
        .observe(duration);
}

/// Renders the registry in the Prometheus text exposition format.
pub fn gather_text() -> Result<String> {
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&REGISTRY.gather(), &mut buffer)
        .map_err(|e| MonitorError::Internal(format!("Failed to encode metrics: {}", e)))?;
    String::from_utf8(buffer)
        .map_err(|e| MonitorError::Internal(format!("Metrics are not valid UTF-8: {}", e)))
}
