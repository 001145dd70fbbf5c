//! Observability for the load generator.
//!
//! Two sinks receive every request sample:
//!
//! - the `metrics` facade ([`metrics`]), exported over HTTP in Prometheus
//!   format when `LOADGEN_METRICS_ADDR` is set;
//! - the in-process [`MetricsCollector`], which the threshold evaluator reads
//!   at the end of a run.
//!
//! # Metrics
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `loadgen_http_requests_total` | Counter | `endpoint`, `tag`, `outcome` | Request count by verdict |
//! | `loadgen_http_request_duration_seconds` | Histogram | `endpoint`, `tag` | Request latency |
//! | `loadgen_checks_total` | Counter | `check`, `result` | Named check results |
//! | `loadgen_iterations_total` | Counter | none | Completed workload iterations |
//! | `loadgen_dropped_iterations_total` | Counter | none | Arrival-rate starts with no free stream |
//! | `loadgen_active_vus` | Gauge | none | Streams currently executing |

pub mod collector;
pub mod metrics;

pub use collector::{CheckSummary, LatencySummary, MetricsCollector, RunMetrics, TagMetrics};
