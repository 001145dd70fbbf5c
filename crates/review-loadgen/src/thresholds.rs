//! Declarative pass/fail thresholds over end-of-run metrics.
//!
//! A threshold pairs a metric selector with a predicate, written the way
//! load-test thresholds are usually spelled:
//!
//! ```text
//! http_req_failed{prep:false}:rate<0.001
//! http_req_duration{prep:false}:p(95)<300
//! http_req_duration:avg<=120
//! checks:rate>0.99
//! dropped_iterations:count==0
//! ```
//!
//! Durations are in milliseconds. `{prep:false}` restricts the selector to
//! measured traffic, `{prep:true}` to setup/teardown traffic, and no filter
//! covers both.

use crate::observability::RunMetrics;
use crate::outcome::Tag;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use thiserror::Error;

/// `selector:predicate`, split on the first ':' outside the tag filter.
#[allow(clippy::expect_used)] // Literal pattern, exercised by the parse tests
static THRESHOLD_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<selector>[^{:]*(?:\{[^}]*\})?)\s*:(?P<predicate>.*)$")
        .expect("threshold pattern is valid")
});

/// `metric` with an optional `{key:value}` filter.
#[allow(clippy::expect_used)] // Literal pattern, exercised by the parse tests
static SELECTOR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?P<metric>[A-Za-z_]+)\s*(?:\{(?P<filter>[^}]*)\})?\s*$")
        .expect("selector pattern is valid")
});

/// `aggregation comparator bound`; two-character comparators are tried first.
#[allow(clippy::expect_used)] // Literal pattern, exercised by the parse tests
static PREDICATE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?:p\(\s*(?P<percentile>[0-9.]+)\s*\)|(?P<aggregation>[a-z]+))\s*(?P<comparator><=|>=|==|!=|<|>)\s*(?P<bound>[-+0-9.eE]+)\s*$",
    )
    .expect("predicate pattern is valid")
});

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ThresholdParseError {
    #[error("Threshold '{0}' is missing a ':' between selector and predicate")]
    MissingSeparator(String),

    #[error("Unknown metric '{0}'")]
    UnknownMetric(String),

    #[error("Invalid tag filter '{0}', expected {{prep:true}} or {{prep:false}}")]
    InvalidTagFilter(String),

    #[error("Invalid predicate '{0}'")]
    InvalidPredicate(String),

    #[error("Aggregation '{aggregation}' is not defined for metric '{metric}'")]
    UnsupportedAggregation { metric: String, aggregation: String },
}

/// Metric a threshold reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricName {
    /// Requests whose status fell outside the action's accepted set.
    HttpReqFailed,
    /// Request latency.
    HttpReqDuration,
    /// Request count.
    HttpReqs,
    /// Named checks.
    Checks,
    /// Completed iterations.
    Iterations,
    /// Arrival-rate starts dropped for lack of a free stream.
    DroppedIterations,
}

impl MetricName {
    fn as_str(self) -> &'static str {
        match self {
            MetricName::HttpReqFailed => "http_req_failed",
            MetricName::HttpReqDuration => "http_req_duration",
            MetricName::HttpReqs => "http_reqs",
            MetricName::Checks => "checks",
            MetricName::Iterations => "iterations",
            MetricName::DroppedIterations => "dropped_iterations",
        }
    }

    fn supports(self, aggregation: Aggregation) -> bool {
        match self {
            MetricName::HttpReqFailed => {
                matches!(aggregation, Aggregation::Rate | Aggregation::Count)
            }
            MetricName::HttpReqDuration => !matches!(
                aggregation,
                Aggregation::Rate | Aggregation::Count
            ),
            MetricName::Checks => matches!(aggregation, Aggregation::Rate),
            MetricName::HttpReqs | MetricName::Iterations | MetricName::DroppedIterations => {
                matches!(aggregation, Aggregation::Rate | Aggregation::Count)
            }
        }
    }
}

impl FromStr for MetricName {
    type Err = ThresholdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "http_req_failed" => Ok(MetricName::HttpReqFailed),
            "http_req_duration" => Ok(MetricName::HttpReqDuration),
            "http_reqs" => Ok(MetricName::HttpReqs),
            "checks" => Ok(MetricName::Checks),
            "iterations" => Ok(MetricName::Iterations),
            "dropped_iterations" => Ok(MetricName::DroppedIterations),
            other => Err(ThresholdParseError::UnknownMetric(other.to_string())),
        }
    }
}

/// Metric plus optional tag filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selector {
    pub metric: MetricName,
    pub tag: Option<Tag>,
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.tag {
            Some(tag) => write!(f, "{}{{prep:{}}}", self.metric.as_str(), tag.prep_label()),
            None => f.write_str(self.metric.as_str()),
        }
    }
}

impl FromStr for Selector {
    type Err = ThresholdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = SELECTOR_PATTERN
            .captures(s)
            .ok_or_else(|| ThresholdParseError::UnknownMetric(s.trim().to_string()))?;
        let metric = caps
            .name("metric")
            .map_or("", |m| m.as_str())
            .parse()?;
        let tag = match caps.name("filter").map(|f| f.as_str().replace(' ', "")) {
            None => None,
            Some(f) if f == "prep:true" => Some(Tag::Prep),
            Some(f) if f == "prep:false" => Some(Tag::Measured),
            Some(f) => return Err(ThresholdParseError::InvalidTagFilter(format!("{{{f}}}"))),
        };
        Ok(Selector { metric, tag })
    }
}

/// How the selected samples are reduced to one number.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Aggregation {
    Rate,
    Count,
    Avg,
    Min,
    Max,
    Med,
    Percentile(f64),
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Aggregation::Rate => f.write_str("rate"),
            Aggregation::Count => f.write_str("count"),
            Aggregation::Avg => f.write_str("avg"),
            Aggregation::Min => f.write_str("min"),
            Aggregation::Max => f.write_str("max"),
            Aggregation::Med => f.write_str("med"),
            Aggregation::Percentile(p) => write!(f, "p({p})"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl Comparator {
    fn as_str(self) -> &'static str {
        match self {
            Comparator::Lt => "<",
            Comparator::Le => "<=",
            Comparator::Gt => ">",
            Comparator::Ge => ">=",
            Comparator::Eq => "==",
            Comparator::Ne => "!=",
        }
    }

    fn holds(self, observed: f64, bound: f64) -> bool {
        match self {
            Comparator::Lt => observed < bound,
            Comparator::Le => observed <= bound,
            Comparator::Gt => observed > bound,
            Comparator::Ge => observed >= bound,
            Comparator::Eq => (observed - bound).abs() < f64::EPSILON,
            Comparator::Ne => (observed - bound).abs() >= f64::EPSILON,
        }
    }
}

/// `aggregation comparator bound`, e.g. `p(95)<300`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Predicate {
    pub aggregation: Aggregation,
    pub comparator: Comparator,
    pub bound: f64,
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.aggregation, self.comparator.as_str(), self.bound)
    }
}

impl FromStr for Predicate {
    type Err = ThresholdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ThresholdParseError::InvalidPredicate(s.to_string());
        let caps = PREDICATE_PATTERN.captures(s).ok_or_else(invalid)?;
        let group = |name: &str| caps.name(name).map_or("", |m| m.as_str());

        let aggregation = if let Some(p) = caps.name("percentile") {
            let p: f64 = p.as_str().parse().map_err(|_| invalid())?;
            if !(0.0..=100.0).contains(&p) {
                return Err(invalid());
            }
            Aggregation::Percentile(p)
        } else {
            match group("aggregation") {
                "rate" => Aggregation::Rate,
                "count" => Aggregation::Count,
                "avg" => Aggregation::Avg,
                "min" => Aggregation::Min,
                "max" => Aggregation::Max,
                "med" => Aggregation::Med,
                _ => return Err(invalid()),
            }
        };
        let comparator = match group("comparator") {
            "<=" => Comparator::Le,
            ">=" => Comparator::Ge,
            "==" => Comparator::Eq,
            "!=" => Comparator::Ne,
            "<" => Comparator::Lt,
            ">" => Comparator::Gt,
            _ => return Err(invalid()),
        };
        let bound: f64 = group("bound").parse().map_err(|_| invalid())?;

        Ok(Predicate {
            aggregation,
            comparator,
            bound,
        })
    }
}

/// One declarative pass/fail gate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Threshold {
    pub selector: Selector,
    pub predicate: Predicate,
}

impl Threshold {
    /// `http_req_failed[{tag}]:rate < bound`.
    #[must_use]
    pub fn failure_rate_below(tag: Option<Tag>, bound: f64) -> Self {
        Self {
            selector: Selector {
                metric: MetricName::HttpReqFailed,
                tag,
            },
            predicate: Predicate {
                aggregation: Aggregation::Rate,
                comparator: Comparator::Lt,
                bound,
            },
        }
    }

    /// `http_req_duration[{tag}]:p(percentile) < bound_ms`.
    #[must_use]
    pub fn latency_percentile_below(tag: Option<Tag>, percentile: f64, bound_ms: f64) -> Self {
        Self {
            selector: Selector {
                metric: MetricName::HttpReqDuration,
                tag,
            },
            predicate: Predicate {
                aggregation: Aggregation::Percentile(percentile),
                comparator: Comparator::Lt,
                bound: bound_ms,
            },
        }
    }

    /// Reduce `metrics` to the value this threshold compares.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn observe(&self, metrics: &RunMetrics) -> f64 {
        let per_second = |count: u64| {
            if metrics.elapsed_secs > 0.0 {
                count as f64 / metrics.elapsed_secs
            } else {
                0.0
            }
        };

        match self.selector.metric {
            MetricName::HttpReqFailed => {
                let selected = metrics.select(self.selector.tag);
                match self.predicate.aggregation {
                    Aggregation::Count => selected.failed as f64,
                    _ => selected.failure_rate(),
                }
            }
            MetricName::HttpReqDuration => {
                let selected = metrics.select(self.selector.tag);
                match self.predicate.aggregation {
                    Aggregation::Avg => selected.latency.avg,
                    Aggregation::Min => selected.latency.min,
                    Aggregation::Max => selected.latency.max,
                    Aggregation::Med => selected.percentile_ms(50.0),
                    Aggregation::Percentile(p) => selected.percentile_ms(p),
                    Aggregation::Rate | Aggregation::Count => 0.0,
                }
            }
            MetricName::HttpReqs => {
                let selected = metrics.select(self.selector.tag);
                match self.predicate.aggregation {
                    Aggregation::Rate => per_second(selected.requests),
                    _ => selected.requests as f64,
                }
            }
            MetricName::Checks => metrics.check_pass_rate(),
            MetricName::Iterations => match self.predicate.aggregation {
                Aggregation::Rate => per_second(metrics.iterations),
                _ => metrics.iterations as f64,
            },
            MetricName::DroppedIterations => match self.predicate.aggregation {
                Aggregation::Rate => per_second(metrics.dropped_iterations),
                _ => metrics.dropped_iterations as f64,
            },
        }
    }

    #[must_use]
    pub fn evaluate(&self, metrics: &RunMetrics) -> ThresholdResult {
        let observed = self.observe(metrics);
        ThresholdResult {
            threshold: self.to_string(),
            observed,
            passed: self.predicate.comparator.holds(observed, self.predicate.bound),
        }
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.selector, self.predicate)
    }
}

impl FromStr for Threshold {
    type Err = ThresholdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = THRESHOLD_PATTERN
            .captures(s)
            .ok_or_else(|| ThresholdParseError::MissingSeparator(s.to_string()))?;
        let selector: Selector = caps.name("selector").map_or("", |m| m.as_str()).parse()?;
        let predicate: Predicate = caps.name("predicate").map_or("", |m| m.as_str()).parse()?;

        if !selector.metric.supports(predicate.aggregation) {
            return Err(ThresholdParseError::UnsupportedAggregation {
                metric: selector.metric.as_str().to_string(),
                aggregation: predicate.aggregation.to_string(),
            });
        }

        Ok(Threshold {
            selector,
            predicate,
        })
    }
}

/// Parse a `;`-separated threshold list. Blank entries are ignored.
///
/// # Errors
///
/// Returns the first entry that fails to parse.
pub fn parse_threshold_list(s: &str) -> Result<Vec<Threshold>, ThresholdParseError> {
    s.split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::parse)
        .collect()
}

/// Outcome of one threshold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdResult {
    pub threshold: String,
    pub observed: f64,
    pub passed: bool,
}

/// Outcome of every threshold of a run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ThresholdReport {
    pub results: Vec<ThresholdResult>,
}

impl ThresholdReport {
    /// A run passes when every threshold passes. No thresholds = pass.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.results.iter().all(|r| r.passed)
    }

    #[must_use]
    pub fn failures(&self) -> Vec<&ThresholdResult> {
        self.results.iter().filter(|r| !r.passed).collect()
    }
}

/// Evaluate every threshold against the run's metrics.
#[must_use]
pub fn evaluate(thresholds: &[Threshold], metrics: &RunMetrics) -> ThresholdReport {
    ThresholdReport {
        results: thresholds.iter().map(|t| t.evaluate(metrics)).collect(),
    }
}
