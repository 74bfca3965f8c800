//! Observability metrics
//!
//! Counters for rate-limit backoffs, recovery probes, retries, remote requests and
//! row mutations. Recording is a no-op until a recorder is installed; `init_metrics`
//! installs the Prometheus exporter when the CLI is given `--metrics-addr`.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::OnceCell;
use std::net::SocketAddr;
use std::time::Instant;
use tracing::{debug, info};

static METRICS_INITIALIZED: OnceCell<SocketAddr> = OnceCell::new();

/// Install the Prometheus exporter on `addr`. Later calls are ignored.
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    if let Some(existing) = METRICS_INITIALIZED.get() {
        debug!(addr = %existing, "Metrics already initialized, skipping");
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        "remote_requests_total",
        Unit::Count,
        "Remote API requests by endpoint kind and status"
    );
    describe_histogram!(
        "remote_request_duration_seconds",
        Unit::Seconds,
        "Remote API request duration"
    );
    describe_counter!(
        "rate_limit_backoffs_total",
        Unit::Count,
        "Backoff windows opened or extended after a rate-limit response"
    );
    describe_counter!(
        "rate_limit_probes_total",
        Unit::Count,
        "Recovery probes started after a backoff window elapsed"
    );
    describe_counter!("retries_total", Unit::Count, "Retry attempts");
    describe_counter!(
        "mutations_completed_total",
        Unit::Count,
        "Row mutations confirmed complete by the remote service"
    );

    let _ = METRICS_INITIALIZED.set(addr);
    info!("Metrics system initialized on {}", addr);
    Ok(())
}

/// Timer for one remote request
pub struct RequestTimer {
    kind: &'static str,
    start: Instant,
}

impl RequestTimer {
    /// Start timing a request of the given kind ("list", "get", "mutate", "status")
    pub fn start(kind: &'static str) -> Self {
        Self {
            kind,
            start: Instant::now(),
        }
    }

    /// Record completion with the HTTP status code (0 when no response arrived)
    pub fn finish(self, status: u16) {
        counter!(
            "remote_requests_total",
            "kind" => self.kind,
            "status" => status.to_string(),
        )
        .increment(1);
        histogram!("remote_request_duration_seconds", "kind" => self.kind)
            .record(self.start.elapsed().as_secs_f64());
    }
}

/// A backoff window was opened or extended
pub fn record_rate_limit_backoff() {
    counter!("rate_limit_backoffs_total").increment(1);
}

/// A caller became the recovery probe
pub fn record_recovery_probe() {
    counter!("rate_limit_probes_total").increment(1);
}

/// A failed call is about to be retried
pub fn record_retry() {
    counter!("retries_total").increment(1);
}

/// A mutation was confirmed complete
pub fn record_mutation_completed(rows: usize) {
    counter!("mutations_completed_total").increment(1);
    debug!(rows, "Mutation completed");
}
