//! Metric emission through the `metrics` facade.
//!
//! All metrics follow Prometheus naming conventions:
//! - `loadgen_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `endpoint`: 8 values (one per service endpoint)
//! - `tag`: 2 values (prep, measured)
//! - `outcome`: 2 values (accepted, unexpected)
//! - `check`: bounded by code (one per action plus scenario body checks)
//!
//! Without an installed recorder every call here is a no-op; the binary
//! installs the Prometheus exporter when `LOADGEN_METRICS_ADDR` is set.

use crate::outcome::{ActionKind, Tag, Verdict};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::net::SocketAddr;
use std::time::Duration;

/// Request latency buckets, seconds. Dense around the 300ms p95 targets.
const REQUEST_BUCKETS: &[f64] = &[
    0.005, 0.010, 0.025, 0.050, 0.100, 0.200, 0.300, 0.500, 1.000, 2.000, 5.000,
];

fn prometheus_builder() -> Result<PrometheusBuilder, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("loadgen_http_request".to_string()),
            REQUEST_BUCKETS,
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))
}

/// Install the Prometheus recorder and serve `/metrics` on `addr`.
///
/// Must be called from within the tokio runtime, before any metric is
/// recorded.
///
/// # Errors
///
/// Returns error if the recorder fails to install (e.g., already installed)
/// or the listener cannot bind.
pub fn init_metrics_exporter(addr: SocketAddr) -> Result<(), String> {
    prometheus_builder()?
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))
}

/// Record one completed service call.
///
/// Metric: `loadgen_http_requests_total`, `loadgen_http_request_duration_seconds`
/// Labels: `endpoint`, `tag`, `outcome`
pub fn record_http_request(action: ActionKind, tag: Tag, verdict: Verdict, duration: Duration) {
    histogram!("loadgen_http_request_duration_seconds",
        "endpoint" => action.endpoint(),
        "tag" => tag.as_str()
    )
    .record(duration.as_secs_f64());

    counter!("loadgen_http_requests_total",
        "endpoint" => action.endpoint(),
        "tag" => tag.as_str(),
        "outcome" => verdict_label(verdict)
    )
    .increment(1);
}

/// Record a named check.
///
/// Metric: `loadgen_checks_total`
/// Labels: `check`, `result`
pub fn record_check(name: &'static str, passed: bool) {
    counter!("loadgen_checks_total",
        "check" => name,
        "result" => if passed { "pass" } else { "fail" }
    )
    .increment(1);
}

/// Metric: `loadgen_iterations_total`
pub fn record_iteration() {
    counter!("loadgen_iterations_total").increment(1);
}

/// Metric: `loadgen_dropped_iterations_total`
pub fn record_dropped_iteration() {
    counter!("loadgen_dropped_iterations_total").increment(1);
}

/// Metric: `loadgen_active_vus`
#[allow(clippy::cast_precision_loss)]
pub fn set_active_vus(count: u64) {
    gauge!("loadgen_active_vus").set(count as f64);
}

fn verdict_label(verdict: Verdict) -> &'static str {
    match verdict {
        Verdict::Accepted => "accepted",
        Verdict::Unexpected | Verdict::Skipped => "unexpected",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};

    #[test]
    fn test_request_metrics_recorded_with_bounded_labels() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            record_http_request(
                ActionKind::CreatePullRequest,
                Tag::Measured,
                Verdict::Accepted,
                Duration::from_millis(12),
            );
            record_http_request(
                ActionKind::CreatePullRequest,
                Tag::Measured,
                Verdict::Unexpected,
                Duration::from_millis(40),
            );
            record_check("create_pull_request", true);
            record_iteration();
            record_dropped_iteration();
            set_active_vus(3);
        });

        let snapshot = snapshotter.snapshot().into_vec();
        let names: Vec<String> = snapshot
            .iter()
            .map(|(key, _, _, _)| key.key().name().to_string())
            .collect();

        for expected in [
            "loadgen_http_requests_total",
            "loadgen_http_request_duration_seconds",
            "loadgen_checks_total",
            "loadgen_iterations_total",
            "loadgen_dropped_iterations_total",
            "loadgen_active_vus",
        ] {
            assert!(
                names.iter().any(|n| n == expected),
                "missing metric {expected}, got {names:?}"
            );
        }

        let request_counters: Vec<_> = snapshot
            .iter()
            .filter(|(key, _, _, _)| key.key().name() == "loadgen_http_requests_total")
            .collect();
        assert_eq!(request_counters.len(), 2, "one series per outcome label");
        for (_, _, _, value) in request_counters {
            assert_eq!(value, &DebugValue::Counter(1));
        }
    }

    #[test]
    fn test_prometheus_rendering_uses_request_buckets() {
        let recorder = prometheus_builder().unwrap().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            record_http_request(
                ActionKind::FetchTeam,
                Tag::Measured,
                Verdict::Accepted,
                Duration::from_millis(120),
            );
            record_iteration();
        });

        let rendered = handle.render();
        assert!(rendered.contains("loadgen_http_requests_total"));
        assert!(rendered.contains("loadgen_http_request_duration_seconds_bucket"));
        assert!(rendered.contains("le=\"0.3\""));
        assert!(rendered.contains("loadgen_iterations_total 1"));
    }

    #[test]
    fn test_skipped_folds_into_unexpected_label() {
        assert_eq!(verdict_label(Verdict::Skipped), "unexpected");
        assert_eq!(verdict_label(Verdict::Accepted), "accepted");
    }
}
