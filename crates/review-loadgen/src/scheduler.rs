//! Scenario scheduler.
//!
//! Drives a [`Workload`] under one of the executor models:
//!
//! - **Ramping VUs**: a controller task recomputes the target stream count
//!   every [`CONTROLLER_TICK`] by linear interpolation over the stage list.
//!   Streams are spawned lazily as the target rises; when it falls, surplus
//!   streams finish their current iteration and park until it rises again.
//! - **Constant VUs**: a flat ramp.
//! - **Constant arrival rate**: one start every `time_unit / rate`. An idle
//!   stream is reused first, a new one is allocated while under `max_vus`,
//!   otherwise the start is dropped and counted.
//!
//! When the profile ends (or the caller cancels) no new iteration starts.
//! In-flight iterations get `graceful_stop` to finish and are aborted after
//! that.

use crate::errors::LoadgenError;
use crate::observability::metrics as emit;
use crate::observability::MetricsCollector;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Ramping controller period.
pub const CONTROLLER_TICK: Duration = Duration::from_millis(100);

/// Default time in-flight iterations get after the profile ends.
pub const DEFAULT_GRACEFUL_STOP: Duration = Duration::from_secs(30);

/// Longest accepted profile window or time unit.
pub const MAX_PROFILE_WINDOW: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// One segment of a ramping profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage {
    pub duration: Duration,
    pub target: u64,
}

impl Stage {
    #[must_use]
    pub const fn new(duration: Duration, target: u64) -> Self {
        Self { duration, target }
    }
}

/// Concurrency profile of a scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutorConfig {
    RampingVus {
        start_vus: u64,
        stages: Vec<Stage>,
    },
    ConstantVus {
        vus: u64,
        duration: Duration,
    },
    ConstantArrivalRate {
        /// Starts per `time_unit`.
        rate: u64,
        time_unit: Duration,
        duration: Duration,
        pre_allocated_vus: u64,
        max_vus: u64,
    },
}

impl ExecutorConfig {
    /// Reject profiles that cannot be scheduled.
    ///
    /// # Errors
    ///
    /// Returns `LoadgenError::InvalidExecutor` describing the problem.
    pub fn validate(&self) -> Result<(), LoadgenError> {
        let invalid = |msg: &str| Err(LoadgenError::InvalidExecutor(msg.to_string()));
        match self {
            ExecutorConfig::RampingVus { stages, .. } => {
                if stages.is_empty() {
                    return invalid("ramping profile needs at least one stage");
                }
                match stage_total(stages) {
                    None => return invalid("ramping stage durations overflow"),
                    Some(total) if total.is_zero() => {
                        return invalid("ramping profile has zero total duration");
                    }
                    Some(total) if total > MAX_PROFILE_WINDOW => {
                        return invalid("ramping profile is longer than a week");
                    }
                    Some(_) => {}
                }
            }
            ExecutorConfig::ConstantVus { vus, duration } => {
                if *vus == 0 {
                    return invalid("constant-vus profile needs at least one VU");
                }
                if duration.is_zero() {
                    return invalid("constant-vus profile has zero duration");
                }
                if *duration > MAX_PROFILE_WINDOW {
                    return invalid("constant-vus profile is longer than a week");
                }
            }
            ExecutorConfig::ConstantArrivalRate {
                rate,
                time_unit,
                duration,
                pre_allocated_vus,
                max_vus,
            } => {
                if *rate == 0 {
                    return invalid("arrival rate must be greater than 0");
                }
                if time_unit.is_zero() || duration.is_zero() {
                    return invalid("arrival-rate time unit and duration must be non-zero");
                }
                if *time_unit > MAX_PROFILE_WINDOW || *duration > MAX_PROFILE_WINDOW {
                    return invalid("arrival-rate time unit or duration is longer than a week");
                }
                if arrival_period(*rate, *time_unit).is_none() {
                    return invalid("arrival rate is too high for its time unit");
                }
                if *max_vus == 0 {
                    return invalid("arrival-rate max VUs must be greater than 0");
                }
                if pre_allocated_vus > max_vus {
                    return invalid("pre-allocated VUs exceed max VUs");
                }
            }
        }
        Ok(())
    }

    /// Length of the scheduled window, excluding graceful stop.
    #[must_use]
    pub fn total_duration(&self) -> Duration {
        match self {
            ExecutorConfig::RampingVus { stages, .. } => {
                stage_total(stages).unwrap_or(MAX_PROFILE_WINDOW)
            }
            ExecutorConfig::ConstantVus { duration, .. }
            | ExecutorConfig::ConstantArrivalRate { duration, .. } => *duration,
        }
    }
}

/// Sum of stage durations; `None` on overflow.
fn stage_total(stages: &[Stage]) -> Option<Duration> {
    stages
        .iter()
        .try_fold(Duration::ZERO, |total, stage| total.checked_add(stage.duration))
}

/// Gap between arrival-rate starts; `None` when it rounds to zero.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn arrival_period(rate: u64, time_unit: Duration) -> Option<Duration> {
    if rate == 0 {
        return None;
    }
    Duration::try_from_secs_f64(time_unit.as_secs_f64() / rate as f64)
        .ok()
        .filter(|period| !period.is_zero())
}

/// Target stream count `elapsed` into a ramping profile.
///
/// Within a stage the target moves linearly from the previous stage's target
/// (or `start_vus`) to the stage's own. Past the last stage it holds the
/// final target.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn target_at(start_vus: u64, stages: &[Stage], elapsed: Duration) -> u64 {
    let mut from = start_vus;
    let mut stage_start = Duration::ZERO;
    for stage in stages {
        let stage_end = stage_start.saturating_add(stage.duration);
        if elapsed < stage_end {
            let progress =
                (elapsed - stage_start).as_secs_f64() / stage.duration.as_secs_f64();
            let value = from as f64 + (stage.target as f64 - from as f64) * progress;
            return value.round().max(0.0) as u64;
        }
        from = stage.target;
        stage_start = stage_end;
    }
    from
}

/// Identity of one iteration, handed to the workload.
#[derive(Debug, Clone)]
pub struct IterationContext {
    /// 1-based stream id.
    pub vu: u64,
    /// 0-based per-stream iteration counter.
    pub iteration: u64,
    stop: CancellationToken,
}

impl IterationContext {
    #[must_use]
    pub fn new(vu: u64, iteration: u64, stop: CancellationToken) -> Self {
        Self {
            vu,
            iteration,
            stop,
        }
    }

    /// First iteration of the first stream.
    #[must_use]
    pub fn is_first(&self) -> bool {
        self.vu == 1 && self.iteration == 0
    }

    /// True once the run has stopped scheduling.
    #[must_use]
    pub fn is_stopping(&self) -> bool {
        self.stop.is_cancelled()
    }

    /// Sleep that returns early when the run stops.
    pub async fn sleep(&self, duration: Duration) {
        tokio::select! {
            () = tokio::time::sleep(duration) => {}
            () = self.stop.cancelled() => {}
        }
    }

    /// Per-iteration RNG. Deterministic per `(seed, vu, iteration)` when a
    /// seed is configured.
    #[must_use]
    pub fn rng(&self, seed: Option<u64>) -> StdRng {
        match seed {
            Some(seed) => StdRng::seed_from_u64(
                seed ^ self.vu.rotate_left(32) ^ self.iteration.wrapping_mul(0x9E37_79B9_7F4A_7C15),
            ),
            None => StdRng::from_entropy(),
        }
    }
}

/// One scheduled unit of work.
///
/// Implementations never fail: every outcome is folded into metrics.
#[async_trait]
pub trait Workload: Send + Sync + 'static {
    async fn iteration(&self, ctx: &IterationContext);
}

/// What the scheduler did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SchedulerReport {
    pub iterations: u64,
    pub dropped_iterations: u64,
    /// Iterations aborted after graceful stop ran out.
    pub interrupted_iterations: u64,
    pub max_vus_used: u64,
    pub elapsed_secs: f64,
}

pub struct Scheduler {
    config: ExecutorConfig,
    graceful_stop: Duration,
    collector: MetricsCollector,
}

impl Scheduler {
    #[must_use]
    pub fn new(config: ExecutorConfig, collector: MetricsCollector) -> Self {
        Self {
            config,
            graceful_stop: DEFAULT_GRACEFUL_STOP,
            collector,
        }
    }

    #[must_use]
    pub fn with_graceful_stop(mut self, graceful_stop: Duration) -> Self {
        self.graceful_stop = graceful_stop;
        self
    }

    /// Run the profile to completion or until `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns `LoadgenError::InvalidExecutor` for an unschedulable profile.
    pub async fn run(
        &self,
        workload: Arc<dyn Workload>,
        cancel: &CancellationToken,
    ) -> Result<SchedulerReport, LoadgenError> {
        self.config.validate()?;

        let stop = cancel.child_token();
        let iterations_before = self.collector.iterations();
        let dropped_before = self.collector.dropped_iterations();
        let started = Instant::now();

        info!(
            target: "loadgen.scheduler",
            profile = ?self.config,
            "Starting scheduler"
        );

        let (max_vus_used, interrupted) = match &self.config {
            ExecutorConfig::RampingVus { start_vus, stages } => {
                self.run_ramping(*start_vus, stages, workload, &stop).await
            }
            ExecutorConfig::ConstantVus { vus, duration } => {
                let stages = [Stage::new(*duration, *vus)];
                self.run_ramping(*vus, &stages, workload, &stop).await
            }
            ExecutorConfig::ConstantArrivalRate {
                rate,
                time_unit,
                duration,
                pre_allocated_vus,
                max_vus,
            } => {
                let period = arrival_period(*rate, *time_unit).ok_or_else(|| {
                    LoadgenError::InvalidExecutor(
                        "arrival rate is too high for its time unit".to_string(),
                    )
                })?;
                self.run_arrival_rate(
                    period,
                    *duration,
                    *pre_allocated_vus,
                    *max_vus,
                    workload,
                    &stop,
                )
                .await
            }
        };

        emit::set_active_vus(0);

        let report = SchedulerReport {
            iterations: self.collector.iterations() - iterations_before,
            dropped_iterations: self.collector.dropped_iterations() - dropped_before,
            interrupted_iterations: interrupted,
            max_vus_used,
            elapsed_secs: started.elapsed().as_secs_f64(),
        };

        info!(
            target: "loadgen.scheduler",
            iterations = report.iterations,
            dropped = report.dropped_iterations,
            interrupted = report.interrupted_iterations,
            max_vus = report.max_vus_used,
            elapsed_secs = report.elapsed_secs,
            "Scheduler finished"
        );

        Ok(report)
    }

    async fn run_ramping(
        &self,
        start_vus: u64,
        stages: &[Stage],
        workload: Arc<dyn Workload>,
        stop: &CancellationToken,
    ) -> (u64, u64) {
        let total = stage_total(stages).unwrap_or(MAX_PROFILE_WINDOW);
        let (target_tx, target_rx) = watch::channel(start_vus);
        let mut streams = JoinSet::new();
        let mut spawned = 0u64;

        let started = Instant::now();
        let mut ticker = interval(CONTROLLER_TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                () = stop.cancelled() => break,
            }

            let elapsed = started.elapsed();
            if elapsed >= total {
                break;
            }

            let target = target_at(start_vus, stages, elapsed);
            target_tx.send_if_modified(|current| {
                let changed = *current != target;
                *current = target;
                changed
            });
            emit::set_active_vus(target);

            while spawned < target {
                spawned += 1;
                debug!(target: "loadgen.scheduler", vu = spawned, "Spawning stream");
                streams.spawn(ramping_stream(
                    spawned,
                    Arc::clone(&workload),
                    target_rx.clone(),
                    stop.clone(),
                    self.collector.clone(),
                ));
            }
        }

        stop.cancel();
        let interrupted = self.drain(&mut streams).await;
        (spawned, interrupted)
    }

    async fn run_arrival_rate(
        &self,
        period: Duration,
        duration: Duration,
        pre_allocated_vus: u64,
        max_vus: u64,
        workload: Arc<dyn Workload>,
        stop: &CancellationToken,
    ) -> (u64, u64) {
        let (idle_tx, mut idle_rx) = mpsc::unbounded_channel::<StreamSlot>();
        for vu in 1..=pre_allocated_vus {
            // The receiver is alive for the whole function.
            let _ = idle_tx.send(StreamSlot { vu, iteration: 0 });
        }
        let mut allocated = pre_allocated_vus;
        let mut in_flight = JoinSet::new();

        let started = Instant::now();
        let mut ticker = interval(period);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                () = stop.cancelled() => break,
            }
            if started.elapsed() >= duration {
                break;
            }

            while let Some(joined) = in_flight.try_join_next() {
                log_join_error(joined);
            }

            let slot = match idle_rx.try_recv() {
                Ok(slot) => slot,
                Err(_) if allocated < max_vus => {
                    allocated += 1;
                    debug!(target: "loadgen.scheduler", vu = allocated, "Allocating stream");
                    StreamSlot {
                        vu: allocated,
                        iteration: 0,
                    }
                }
                Err(_) => {
                    debug!(
                        target: "loadgen.scheduler",
                        max_vus,
                        "No free stream, dropping iteration"
                    );
                    self.collector.record_dropped_iteration();
                    continue;
                }
            };
            emit::set_active_vus(allocated);

            let workload = Arc::clone(&workload);
            let collector = self.collector.clone();
            let idle = idle_tx.clone();
            let stop = stop.clone();
            in_flight.spawn(async move {
                let ctx = IterationContext::new(slot.vu, slot.iteration, stop);
                workload.iteration(&ctx).await;
                collector.record_iteration();
                // Fails only once the scheduler has stopped handing out slots.
                let _ = idle.send(StreamSlot {
                    vu: slot.vu,
                    iteration: slot.iteration + 1,
                });
            });
        }

        stop.cancel();
        let interrupted = self.drain(&mut in_flight).await;
        (allocated, interrupted)
    }

    /// Wait for in-flight work up to `graceful_stop`, then abort the rest.
    /// Returns the number of aborted tasks.
    async fn drain(&self, tasks: &mut JoinSet<()>) -> u64 {
        let deadline = tokio::time::sleep(self.graceful_stop);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                joined = tasks.join_next() => match joined {
                    Some(joined) => log_join_error(joined),
                    None => return 0,
                },
                () = &mut deadline => {
                    let remaining = tasks.len() as u64;
                    warn!(
                        target: "loadgen.scheduler",
                        remaining,
                        graceful_stop_secs = self.graceful_stop.as_secs_f64(),
                        "Graceful stop expired, aborting in-flight iterations"
                    );
                    tasks.abort_all();
                    while tasks.join_next().await.is_some() {}
                    return remaining;
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct StreamSlot {
    vu: u64,
    iteration: u64,
}

async fn ramping_stream(
    vu: u64,
    workload: Arc<dyn Workload>,
    mut target: watch::Receiver<u64>,
    stop: CancellationToken,
    collector: MetricsCollector,
) {
    let mut iteration = 0u64;
    loop {
        if stop.is_cancelled() {
            break;
        }

        let current = *target.borrow_and_update();
        if vu > current {
            tokio::select! {
                changed = target.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                () = stop.cancelled() => break,
            }
        }

        let ctx = IterationContext::new(vu, iteration, stop.clone());
        workload.iteration(&ctx).await;
        collector.record_iteration();
        iteration += 1;

        tokio::task::yield_now().await;
    }
}

fn log_join_error(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        if e.is_panic() {
            warn!(target: "loadgen.scheduler", error = %e, "Iteration panicked");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    struct Sleeper {
        delay: Duration,
        running: AtomicU64,
        peak: AtomicU64,
        vus: Mutex<HashSet<u64>>,
    }

    impl Sleeper {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                delay,
                running: AtomicU64::new(0),
                peak: AtomicU64::new(0),
                vus: Mutex::new(HashSet::new()),
            })
        }
    }

    #[async_trait]
    impl Workload for Sleeper {
        async fn iteration(&self, ctx: &IterationContext) {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.vus.lock().unwrap().insert(ctx.vu);
            // Not ctx.sleep: in-flight work must run to completion.
            tokio::time::sleep(self.delay).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn test_target_interpolates_linearly() {
        let stages = [Stage::new(secs(10), 10), Stage::new(secs(10), 10), Stage::new(secs(10), 0)];
        assert_eq!(target_at(0, &stages, Duration::ZERO), 0);
        assert_eq!(target_at(0, &stages, secs(5)), 5);
        assert_eq!(target_at(0, &stages, secs(15)), 10);
        assert_eq!(target_at(0, &stages, secs(25)), 5);
        assert_eq!(target_at(0, &stages, secs(40)), 0);
        assert_eq!(target_at(4, &[Stage::new(secs(10), 4)], secs(3)), 4);
    }

    #[test]
    fn test_validate_rejects_bad_profiles() {
        assert!(ExecutorConfig::RampingVus {
            start_vus: 1,
            stages: vec![]
        }
        .validate()
        .is_err());
        assert!(ExecutorConfig::ConstantVus {
            vus: 0,
            duration: secs(1)
        }
        .validate()
        .is_err());
        assert!(ExecutorConfig::ConstantArrivalRate {
            rate: 5,
            time_unit: secs(1),
            duration: secs(60),
            pre_allocated_vus: 10,
            max_vus: 2,
        }
        .validate()
        .is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range_durations() {
        let overflowing = ExecutorConfig::RampingVus {
            start_vus: 1,
            stages: vec![Stage::new(Duration::MAX, 1), Stage::new(secs(1), 1)],
        };
        assert!(matches!(
            overflowing.validate(),
            Err(LoadgenError::InvalidExecutor(msg)) if msg.contains("overflow")
        ));
        assert_eq!(overflowing.total_duration(), MAX_PROFILE_WINDOW);

        assert!(ExecutorConfig::ConstantVus {
            vus: 1,
            duration: MAX_PROFILE_WINDOW + secs(1)
        }
        .validate()
        .is_err());

        let too_fast = ExecutorConfig::ConstantArrivalRate {
            rate: u64::MAX,
            time_unit: Duration::from_nanos(1),
            duration: secs(1),
            pre_allocated_vus: 1,
            max_vus: 1,
        };
        assert!(too_fast.validate().is_err());
    }

    #[test]
    fn test_arrival_period() {
        assert_eq!(arrival_period(5, secs(1)), Some(Duration::from_millis(200)));
        assert_eq!(arrival_period(0, secs(1)), None);
        assert_eq!(arrival_period(u64::MAX, Duration::from_nanos(1)), None);
    }

    #[tokio::test]
    async fn test_run_rejects_overflowing_profile() {
        let scheduler = Scheduler::new(
            ExecutorConfig::RampingVus {
                start_vus: 1,
                stages: vec![Stage::new(Duration::MAX, 1), Stage::new(secs(1), 1)],
            },
            MetricsCollector::new(),
        );
        let workload: Arc<dyn Workload> = Sleeper::new(secs(1));
        let result = scheduler.run(workload, &CancellationToken::new()).await;
        assert!(matches!(result, Err(LoadgenError::InvalidExecutor(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_arrival_rate_issues_rate_times_duration() {
        let collector = MetricsCollector::new();
        let workload = Sleeper::new(Duration::from_millis(50));
        let scheduler = Scheduler::new(
            ExecutorConfig::ConstantArrivalRate {
                rate: 5,
                time_unit: secs(1),
                duration: secs(60),
                pre_allocated_vus: 1,
                max_vus: 200,
            },
            collector.clone(),
        );

        let report = scheduler
            .run(workload.clone(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.iterations, 300);
        assert_eq!(report.dropped_iterations, 0);
        assert_eq!(report.interrupted_iterations, 0);
        // Iterations finish well inside the inter-arrival gap, so one stream suffices.
        assert_eq!(report.max_vus_used, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_arrival_rate_drops_beyond_max_vus() {
        let collector = MetricsCollector::new();
        // Each iteration outlives ten arrivals.
        let workload = Sleeper::new(secs(1));
        let scheduler = Scheduler::new(
            ExecutorConfig::ConstantArrivalRate {
                rate: 10,
                time_unit: secs(1),
                duration: secs(5),
                pre_allocated_vus: 1,
                max_vus: 3,
            },
            collector.clone(),
        );

        let report = scheduler
            .run(workload.clone(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.max_vus_used, 3);
        assert!(workload.peak.load(Ordering::SeqCst) <= 3);
        assert!(report.dropped_iterations > 0);
        assert_eq!(report.iterations + report.dropped_iterations, 50);
        assert_eq!(collector.dropped_iterations(), report.dropped_iterations);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ramping_follows_stages_and_drains() {
        let collector = MetricsCollector::new();
        let workload = Sleeper::new(Duration::from_millis(200));
        let scheduler = Scheduler::new(
            ExecutorConfig::RampingVus {
                start_vus: 0,
                stages: vec![
                    Stage::new(secs(2), 4),
                    Stage::new(secs(2), 4),
                    Stage::new(secs(2), 0),
                ],
            },
            collector.clone(),
        );

        let report = scheduler
            .run(workload.clone(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.max_vus_used, 4);
        assert!(workload.peak.load(Ordering::SeqCst) <= 4);
        assert_eq!(workload.running.load(Ordering::SeqCst), 0, "all streams drained");
        assert!(report.iterations > 0);
        let vus = workload.vus.lock().unwrap().clone();
        assert_eq!(vus, (1..=4).collect::<HashSet<_>>(), "ids are 1-based and dense");
    }

    #[tokio::test(start_paused = true)]
    async fn test_constant_vus_runs_fixed_streams() {
        let collector = MetricsCollector::new();
        let workload = Sleeper::new(secs(1));
        let scheduler = Scheduler::new(
            ExecutorConfig::ConstantVus {
                vus: 3,
                duration: secs(10),
            },
            collector,
        );

        let report = scheduler
            .run(workload.clone(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.max_vus_used, 3);
        // About ten one-second iterations per stream.
        assert!((27..=33).contains(&report.iterations), "{}", report.iterations);
    }

    #[tokio::test(start_paused = true)]
    async fn test_graceful_stop_aborts_long_iterations() {
        let collector = MetricsCollector::new();
        let workload = Sleeper::new(secs(600));
        let scheduler = Scheduler::new(
            ExecutorConfig::ConstantVus {
                vus: 2,
                duration: secs(1),
            },
            collector,
        )
        .with_graceful_stop(secs(5));

        let report = scheduler
            .run(workload.clone(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.iterations, 0);
        assert_eq!(report.interrupted_iterations, 2);
        assert!(report.elapsed_secs < 10.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_external_cancel_stops_early() {
        let collector = MetricsCollector::new();
        let workload = Sleeper::new(Duration::from_millis(100));
        let scheduler = Scheduler::new(
            ExecutorConfig::ConstantVus {
                vus: 2,
                duration: secs(3600),
            },
            collector,
        );
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(secs(2)).await;
            trigger.cancel();
        });

        let report = scheduler.run(workload, &cancel).await.unwrap();
        assert!(report.elapsed_secs < 5.0);
    }

    #[test]
    fn test_context_identity_and_seeded_rng() {
        use rand::Rng;
        let stop = CancellationToken::new();
        let first = IterationContext::new(1, 0, stop.clone());
        let later = IterationContext::new(1, 1, stop.clone());
        assert!(first.is_first());
        assert!(!later.is_first());

        let a: u64 = first.rng(Some(7)).gen();
        let b: u64 = IterationContext::new(1, 0, stop).rng(Some(7)).gen();
        let c: u64 = later.rng(Some(7)).gen();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
