//! In-process aggregation of request samples.
//!
//! The collector is cloned into every stream; clones share one aggregate.
//! Latencies go into an HDR histogram per tag, so memory stays bounded
//! however long the run and quantiles are accurate to three significant
//! digits.

use super::metrics as emit;
use crate::outcome::{ActionKind, Tag, Verdict};
use hdrhistogram::Histogram;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Significant digits kept by the latency histograms.
const LATENCY_SIGFIG: u8 = 3;

#[derive(Debug, Default)]
struct TagAggregate {
    requests: u64,
    failed: u64,
    /// Microseconds. Created on the first sample.
    latency_us: Option<Histogram<u64>>,
    by_action: BTreeMap<ActionKind, ActionCounts>,
}

impl TagAggregate {
    fn record_latency(&mut self, elapsed: Duration) {
        if self.latency_us.is_none() {
            self.latency_us = Histogram::new(LATENCY_SIGFIG).ok();
        }
        if let Some(histogram) = self.latency_us.as_mut() {
            let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
            histogram.saturating_record(micros);
        }
    }
}

/// Per-action request counts.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ActionCounts {
    pub requests: u64,
    pub failed: u64,
}

#[derive(Debug, Default, Clone, Copy)]
struct CheckCounts {
    passes: u64,
    fails: u64,
}

#[derive(Debug, Default)]
struct Aggregates {
    prep: TagAggregate,
    measured: TagAggregate,
    checks: BTreeMap<&'static str, CheckCounts>,
}

impl Aggregates {
    fn tag_mut(&mut self, tag: Tag) -> &mut TagAggregate {
        match tag {
            Tag::Prep => &mut self.prep,
            Tag::Measured => &mut self.measured,
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    aggregates: Mutex<Aggregates>,
    iterations: AtomicU64,
    dropped_iterations: AtomicU64,
}

/// Shared sink for request, check and iteration samples.
#[derive(Debug, Clone, Default)]
pub struct MetricsCollector {
    inner: Arc<Inner>,
}

impl MetricsCollector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Aggregates> {
        // A panic while holding the lock cannot leave the counters torn in a
        // way that matters for reporting.
        self.inner
            .aggregates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Record one completed request. Skipped actions are not requests and
    /// must not be passed here.
    pub fn record_request(&self, action: ActionKind, tag: Tag, verdict: Verdict, elapsed: Duration) {
        emit::record_http_request(action, tag, verdict, elapsed);
        emit::record_check(action.as_str(), verdict == Verdict::Accepted);

        let failed = verdict != Verdict::Accepted;
        let mut aggregates = self.lock();
        {
            let bucket = aggregates.tag_mut(tag);
            bucket.requests += 1;
            bucket.record_latency(elapsed);
            let counts = bucket.by_action.entry(action).or_default();
            counts.requests += 1;
            if failed {
                bucket.failed += 1;
                counts.failed += 1;
            }
        }
        let check = aggregates.checks.entry(action.as_str()).or_default();
        if failed {
            check.fails += 1;
        } else {
            check.passes += 1;
        }
    }

    /// Record a named assertion about a response.
    pub fn record_check(&self, name: &'static str, passed: bool) {
        emit::record_check(name, passed);
        let mut aggregates = self.lock();
        let check = aggregates.checks.entry(name).or_default();
        if passed {
            check.passes += 1;
        } else {
            check.fails += 1;
        }
    }

    pub fn record_iteration(&self) {
        emit::record_iteration();
        self.inner.iterations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped_iteration(&self) {
        emit::record_dropped_iteration();
        self.inner.dropped_iterations.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn iterations(&self) -> u64 {
        self.inner.iterations.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn dropped_iterations(&self) -> u64 {
        self.inner.dropped_iterations.load(Ordering::Relaxed)
    }

    /// Freeze the current aggregates. `elapsed` is the measured window used
    /// for per-second rates.
    #[must_use]
    pub fn snapshot(&self, elapsed: Duration) -> RunMetrics {
        let aggregates = self.lock();
        RunMetrics {
            prep: TagMetrics::from_aggregate(&aggregates.prep),
            measured: TagMetrics::from_aggregate(&aggregates.measured),
            checks: aggregates
                .checks
                .iter()
                .map(|(name, counts)| CheckSummary {
                    name: (*name).to_string(),
                    passes: counts.passes,
                    fails: counts.fails,
                })
                .collect(),
            iterations: self.iterations(),
            dropped_iterations: self.dropped_iterations(),
            elapsed_secs: elapsed.as_secs_f64(),
        }
    }
}

/// Aggregated metrics for one tag (or both merged).
#[derive(Debug, Clone, Default, Serialize)]
pub struct TagMetrics {
    pub requests: u64,
    pub failed: u64,
    pub latency: LatencySummary,
    pub by_action: BTreeMap<ActionKind, ActionCounts>,
    #[serde(skip)]
    latency_us: Option<Histogram<u64>>,
}

impl TagMetrics {
    fn from_aggregate(aggregate: &TagAggregate) -> Self {
        Self {
            requests: aggregate.requests,
            failed: aggregate.failed,
            latency: LatencySummary::from_histogram(aggregate.latency_us.as_ref()),
            by_action: aggregate.by_action.clone(),
            latency_us: aggregate.latency_us.clone(),
        }
    }

    /// Combine two tag subsets into one.
    #[must_use]
    pub fn merged(&self, other: &TagMetrics) -> TagMetrics {
        let latency_us = match (&self.latency_us, &other.latency_us) {
            (Some(ours), Some(theirs)) => {
                let mut combined = ours.clone();
                // Auto-resizing histograms always accept the addition.
                combined.add(theirs).ok();
                Some(combined)
            }
            (ours, theirs) => ours.clone().or_else(|| theirs.clone()),
        };

        let mut by_action = self.by_action.clone();
        for (action, counts) in &other.by_action {
            let entry = by_action.entry(*action).or_default();
            entry.requests += counts.requests;
            entry.failed += counts.failed;
        }

        TagMetrics {
            requests: self.requests + other.requests,
            failed: self.failed + other.failed,
            latency: LatencySummary::from_histogram(latency_us.as_ref()),
            by_action,
            latency_us,
        }
    }

    /// Fraction of requests outside their accepted set; 0 when empty.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn failure_rate(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.failed as f64 / self.requests as f64
        }
    }

    /// Latency percentile in milliseconds; 0 when empty.
    #[must_use]
    pub fn percentile_ms(&self, p: f64) -> f64 {
        self.latency_us
            .as_ref()
            .map_or(0.0, |h| micros_to_ms(h.value_at_quantile(p.clamp(0.0, 100.0) / 100.0)))
    }

    /// Number of latency samples behind the summary.
    #[must_use]
    pub fn latency_samples(&self) -> u64 {
        self.latency_us.as_ref().map_or(0, Histogram::len)
    }
}

/// Latency distribution summary in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LatencySummary {
    pub avg: f64,
    pub min: f64,
    pub med: f64,
    pub max: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
}

impl LatencySummary {
    fn from_histogram(histogram: Option<&Histogram<u64>>) -> Self {
        let Some(h) = histogram.filter(|h| !h.is_empty()) else {
            return Self::default();
        };
        Self {
            avg: h.mean() / 1000.0,
            min: micros_to_ms(h.min()),
            med: micros_to_ms(h.value_at_quantile(0.50)),
            max: micros_to_ms(h.max()),
            p90: micros_to_ms(h.value_at_quantile(0.90)),
            p95: micros_to_ms(h.value_at_quantile(0.95)),
            p99: micros_to_ms(h.value_at_quantile(0.99)),
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn micros_to_ms(micros: u64) -> f64 {
    micros as f64 / 1000.0
}

/// Pass/fail totals of one named check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckSummary {
    pub name: String,
    pub passes: u64,
    pub fails: u64,
}

/// Frozen end-of-run metrics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunMetrics {
    pub prep: TagMetrics,
    pub measured: TagMetrics,
    pub checks: Vec<CheckSummary>,
    pub iterations: u64,
    pub dropped_iterations: u64,
    pub elapsed_secs: f64,
}

impl RunMetrics {
    /// Metrics for one tag, or both tags merged when `tag` is `None`.
    #[must_use]
    pub fn select(&self, tag: Option<Tag>) -> TagMetrics {
        match tag {
            Some(Tag::Prep) => self.prep.clone(),
            Some(Tag::Measured) => self.measured.clone(),
            None => self.prep.merged(&self.measured),
        }
    }

    /// Overall check pass rate; 0 when no checks ran.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn check_pass_rate(&self) -> f64 {
        let passes: u64 = self.checks.iter().map(|c| c.passes).sum();
        let total: u64 = self.checks.iter().map(|c| c.passes + c.fails).sum();
        if total == 0 {
            0.0
        } else {
            passes as f64 / total as f64
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn within(actual: f64, expected: f64, tolerance: f64) -> bool {
        (actual - expected).abs() <= expected * tolerance
    }

    #[test]
    fn test_percentiles_from_histogram() {
        let collector = MetricsCollector::new();
        for ms in [10, 20, 30, 40] {
            collector.record_request(
                ActionKind::FetchTeam,
                Tag::Measured,
                Verdict::Accepted,
                Duration::from_millis(ms),
            );
        }

        let measured = collector.snapshot(Duration::from_secs(1)).measured;
        assert!(within(measured.percentile_ms(100.0), 40.0, 0.001));
        assert!(within(measured.percentile_ms(0.0), 10.0, 0.001));
        assert!(within(measured.latency.avg, 25.0, 0.001));
        assert!(within(measured.latency.min, 10.0, 0.001));
        assert_eq!(measured.latency_samples(), 4);
        assert_eq!(TagMetrics::default().percentile_ms(95.0), 0.0);
    }

    #[test]
    fn test_long_run_latencies_stay_summarised() {
        let collector = MetricsCollector::new();
        for i in 0..200_000u64 {
            collector.record_request(
                ActionKind::CreatePullRequest,
                Tag::Measured,
                Verdict::Accepted,
                Duration::from_micros(1_000 + (i % 200) * 1_000),
            );
        }

        let measured = collector.snapshot(Duration::from_secs(600)).measured;
        assert_eq!(measured.requests, 200_000);
        assert_eq!(measured.latency_samples(), 200_000);
        // Samples are uniform over 1..=200 ms.
        assert!(within(measured.percentile_ms(50.0), 100.0, 0.01));
        assert!(within(measured.latency.p95, 190.0, 0.01));
        assert!(within(measured.latency.max, 200.0, 0.001));
    }

    #[test]
    fn test_tags_are_partitioned() {
        let collector = MetricsCollector::new();
        collector.record_request(
            ActionKind::CreateTeam,
            Tag::Prep,
            Verdict::Unexpected,
            Duration::from_millis(500),
        );
        collector.record_request(
            ActionKind::CreatePullRequest,
            Tag::Measured,
            Verdict::Accepted,
            Duration::from_millis(10),
        );
        collector.record_request(
            ActionKind::CreatePullRequest,
            Tag::Measured,
            Verdict::Accepted,
            Duration::from_millis(20),
        );

        let metrics = collector.snapshot(Duration::from_secs(1));
        assert_eq!(metrics.measured.requests, 2);
        assert_eq!(metrics.measured.failed, 0);
        assert_eq!(metrics.prep.requests, 1);
        assert_eq!(metrics.prep.failed, 1);
        assert!(metrics.measured.latency.max < 25.0);

        let all = metrics.select(None);
        assert_eq!(all.requests, 3);
        assert_eq!(all.failed, 1);
        assert!((all.latency.max - 500.0).abs() < 1.0);
    }

    #[test]
    fn test_clones_share_aggregates() {
        let collector = MetricsCollector::new();
        let clone = collector.clone();
        clone.record_iteration();
        clone.record_dropped_iteration();
        collector.record_iteration();
        assert_eq!(collector.iterations(), 2);
        assert_eq!(collector.dropped_iterations(), 1);
    }

    #[test]
    fn test_checks_tracked_by_name() {
        let collector = MetricsCollector::new();
        collector.record_check("response has team name", true);
        collector.record_check("response has team name", false);
        collector.record_request(
            ActionKind::FetchTeam,
            Tag::Measured,
            Verdict::Accepted,
            Duration::from_millis(3),
        );

        let metrics = collector.snapshot(Duration::from_secs(1));
        let body_check = metrics
            .checks
            .iter()
            .find(|c| c.name == "response has team name")
            .unwrap();
        assert_eq!((body_check.passes, body_check.fails), (1, 1));
        assert!((metrics.check_pass_rate() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_rates_are_zero() {
        let metrics = MetricsCollector::new().snapshot(Duration::ZERO);
        assert_eq!(metrics.measured.failure_rate(), 0.0);
        assert_eq!(metrics.check_pass_rate(), 0.0);
        assert_eq!(metrics.measured.latency, LatencySummary::default());
    }
}
