//! Prometheus metrics for pipeline runs.

use std::net::SocketAddr;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{info, warn};

use clipper_models::PipelineStage;

/// Metric names as constants for consistency.
pub mod names {
    pub const RUNS_TOTAL: &str = "clipper_runs_total";
    pub const SEGMENTS_TOTAL: &str = "clipper_segments_total";
    pub const STAGE_DURATION_SECONDS: &str = "clipper_stage_duration_seconds";
}

/// Start the Prometheus scrape endpoint when `CLIPPER_METRICS_ADDR` is set.
///
/// Must be called from within the tokio runtime. Returns whether an
/// exporter was installed.
pub fn init_from_env() -> bool {
    let Some(raw) = std::env::var("CLIPPER_METRICS_ADDR").ok() else {
        return false;
    };
    let addr: SocketAddr = match raw.parse() {
        Ok(addr) => addr,
        Err(e) => {
            warn!("Ignoring invalid CLIPPER_METRICS_ADDR '{}': {}", raw, e);
            return false;
        }
    };
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => {
            info!("Prometheus exporter listening on {}", addr);
            true
        }
        Err(e) => {
            warn!("Failed to install Prometheus exporter: {}", e);
            false
        }
    }
}

/// Record a finished run. `outcome` is "success", "partial" or an error kind.
pub fn record_run(format: &str, outcome: &str) {
    let labels = [
        ("format", format.to_string()),
        ("outcome", outcome.to_string()),
    ];
    counter!(names::RUNS_TOTAL, &labels).increment(1);
}

/// Record a segment outcome.
pub fn record_segment(format: &str, succeeded: bool) {
    let labels = [
        ("format", format.to_string()),
        ("outcome", if succeeded { "success" } else { "failure" }.to_string()),
    ];
    counter!(names::SEGMENTS_TOTAL, &labels).increment(1);
}

/// Record the wall time of one stage.
pub fn record_stage_duration(stage: PipelineStage, duration_secs: f64) {
    let labels = [("stage", stage.as_str().to_string())];
    histogram!(names::STAGE_DURATION_SECONDS, &labels).record(duration_secs);
}
