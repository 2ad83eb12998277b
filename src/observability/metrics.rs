//! Prometheus metrics
//!
//! Counters and histograms for flows, requests, and phases. Recording
//! functions are no-ops until a recorder is installed, so the engine calls
//! them unconditionally.

use std::sync::atomic::{AtomicBool, Ordering};

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::FlowgenError;
use crate::request::RequestRecord;

/// Guard to prevent double-initialization of the metrics recorder.
static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Maximum length of a label taken from suite files.
const MAX_LABEL_LEN: usize = 64;

/// Installs the global metrics recorder.
///
/// When `port` is `Some`, a Prometheus HTTP listener is started on
/// `127.0.0.1:<port>`. When `None`, metrics are recorded internally only.
///
/// # Errors
///
/// Returns `FlowgenError::Io` if the recorder or HTTP listener cannot be
/// installed (e.g. port already in use).
pub fn init_metrics(port: Option<u16>) -> Result<(), FlowgenError> {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        tracing::debug!("metrics already initialized, skipping");
        return Ok(());
    }
    port.map_or_else(
        || PrometheusBuilder::new().install_recorder().map(|_| ()),
        |p| {
            PrometheusBuilder::new()
                .with_http_listener(([127, 0, 0, 1], p))
                .install()
        },
    )
    .map_err(|e| FlowgenError::Io(std::io::Error::other(e.to_string())))?;

    describe_metrics();
    Ok(())
}

fn describe_metrics() {
    describe_counter!("flowgen_flows_started_total", "Flows that started their timed body");
    describe_counter!("flowgen_flows_finished_total", "Flows that finished");
    describe_gauge!("flowgen_flows_in_flight", "Flows currently executing");
    describe_counter!("flowgen_requests_total", "Completed requests by result");
    describe_histogram!(
        "flowgen_request_duration_ms",
        "Request duration in milliseconds"
    );
    describe_counter!("flowgen_phase_transitions_total", "Phases started");
}

/// Records a flow start.
pub fn record_flow_started(flow: &str) {
    counter!("flowgen_flows_started_total", "flow" => sanitize_label(flow)).increment(1);
}

/// Records a flow finish.
pub fn record_flow_finished(flow: &str, failed: bool) {
    let status = if failed { "failed" } else { "completed" };
    counter!(
        "flowgen_flows_finished_total",
        "flow" => sanitize_label(flow),
        "status" => status,
    )
    .increment(1);
}

/// Sets the in-flight flow gauge.
#[allow(clippy::cast_precision_loss)]
pub fn set_flows_in_flight(count: usize) {
    gauge!("flowgen_flows_in_flight").set(count as f64);
}

/// Records a completed request and its duration.
pub fn record_request(request: &RequestRecord) {
    counter!(
        "flowgen_requests_total",
        "name" => sanitize_label(&request.name),
        "result" => request.result.to_string(),
    )
    .increment(1);
    histogram!("flowgen_request_duration_ms", "name" => sanitize_label(&request.name))
        .record(request.duration_ms());
}

/// Records the start of a phase.
pub fn record_phase_transition(phase: &str) {
    counter!("flowgen_phase_transitions_total", "phase" => sanitize_label(phase)).increment(1);
}

/// Truncates a suite-provided name and replaces characters Prometheus
/// labels do not accept.
fn sanitize_label(name: &str) -> String {
    name.chars()
        .take(MAX_LABEL_LEN)
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
