//! Weighted action selection and think time.

use rand::Rng;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MixError {
    #[error("Mix has no actions")]
    Empty,

    #[error("Cumulative bounds must strictly increase within (0, 1]")]
    NotIncreasing,

    #[error("Final cumulative bound must be 1.0")]
    IncompleteCoverage,
}

/// Actions of the realistic traffic mix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MixAction {
    CreatePullRequest,
    MergePullRequest,
    ReassignReviewer,
    FetchUserReviews,
    SetUserActive,
}

/// Ordered `(action, cumulative upper bound)` table.
///
/// A draw `d` in `[0, 1)` selects the first action whose bound exceeds `d`.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedMix<A> {
    entries: Vec<(A, f64)>,
    /// Last action; absorbs draws that rounding pushes to 1.0.
    fallback: A,
}

impl<A: Copy> WeightedMix<A> {
    /// # Errors
    ///
    /// Returns `MixError` when the table is empty, its bounds do not strictly
    /// increase, or the final bound is not 1.0.
    pub fn new(entries: Vec<(A, f64)>) -> Result<Self, MixError> {
        let Some(&(fallback, last)) = entries.last() else {
            return Err(MixError::Empty);
        };
        let mut previous = 0.0;
        for (_, bound) in &entries {
            if *bound <= previous || *bound > 1.0 {
                return Err(MixError::NotIncreasing);
            }
            previous = *bound;
        }
        if (last - 1.0).abs() > f64::EPSILON {
            return Err(MixError::IncompleteCoverage);
        }
        Ok(Self { entries, fallback })
    }

    /// Action for a given draw in `[0, 1)`.
    #[must_use]
    pub fn select(&self, draw: f64) -> A {
        self.entries
            .iter()
            .find(|(_, bound)| draw < *bound)
            .map_or(self.fallback, |(action, _)| *action)
    }

    /// Draw and select.
    pub fn choose<R: Rng>(&self, rng: &mut R) -> A {
        self.select(rng.gen::<f64>())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The canonical five-way split: create 50%, merge 30%, reassign 15%,
/// fetch reviews 4%, set active 1%.
#[must_use]
pub fn realistic_mix() -> WeightedMix<MixAction> {
    WeightedMix {
        entries: vec![
            (MixAction::CreatePullRequest, 0.50),
            (MixAction::MergePullRequest, 0.80),
            (MixAction::ReassignReviewer, 0.95),
            (MixAction::FetchUserReviews, 0.99),
            (MixAction::SetUserActive, 1.0),
        ],
        fallback: MixAction::SetUserActive,
    }
}

/// Inclusive integer think-time range in a fixed unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThinkTime {
    min: u64,
    max: u64,
    unit: Duration,
}

impl ThinkTime {
    /// `min..=max` whole seconds.
    #[must_use]
    pub fn seconds(min: u64, max: u64) -> Self {
        Self::new(min, max, Duration::from_secs(1))
    }

    /// `min..=max` whole milliseconds.
    #[must_use]
    pub fn millis(min: u64, max: u64) -> Self {
        Self::new(min, max, Duration::from_millis(1))
    }

    fn new(min: u64, max: u64, unit: Duration) -> Self {
        Self {
            min: min.min(max),
            max: max.max(min),
            unit,
        }
    }

    /// A uniformly drawn delay within the range.
    pub fn draw<R: Rng>(&self, rng: &mut R) -> Duration {
        let n = rng.gen_range(self.min..=self.max);
        self.unit.saturating_mul(u32::try_from(n).unwrap_or(u32::MAX))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;

    #[test]
    fn test_select_boundaries() {
        let mix = realistic_mix();
        assert_eq!(mix.select(0.0), MixAction::CreatePullRequest);
        assert_eq!(mix.select(0.4999), MixAction::CreatePullRequest);
        assert_eq!(mix.select(0.50), MixAction::MergePullRequest);
        assert_eq!(mix.select(0.80), MixAction::ReassignReviewer);
        assert_eq!(mix.select(0.95), MixAction::FetchUserReviews);
        assert_eq!(mix.select(0.99), MixAction::SetUserActive);
        assert_eq!(mix.select(0.999_999), MixAction::SetUserActive);
        assert_eq!(mix.select(1.0), MixAction::SetUserActive);
    }

    #[test]
    fn test_empirical_split_within_two_points() {
        let mix = realistic_mix();
        let mut rng = StdRng::seed_from_u64(20_240_601);
        let draws = 10_000;
        let mut counts: HashMap<MixAction, u32> = HashMap::new();
        for _ in 0..draws {
            *counts.entry(mix.choose(&mut rng)).or_default() += 1;
        }

        let expected = [
            (MixAction::CreatePullRequest, 0.50),
            (MixAction::MergePullRequest, 0.30),
            (MixAction::ReassignReviewer, 0.15),
            (MixAction::FetchUserReviews, 0.04),
            (MixAction::SetUserActive, 0.01),
        ];
        for (action, share) in expected {
            let observed = f64::from(counts.get(&action).copied().unwrap_or(0)) / f64::from(draws);
            assert!(
                (observed - share).abs() < 0.02,
                "{action:?}: observed {observed}, expected {share}"
            );
        }
    }

    #[test]
    fn test_new_validates_bounds() {
        assert_eq!(WeightedMix::<u8>::new(vec![]).unwrap_err(), MixError::Empty);
        assert_eq!(
            WeightedMix::new(vec![(1u8, 0.5), (2, 0.9)]).unwrap_err(),
            MixError::IncompleteCoverage
        );
        assert_eq!(
            WeightedMix::new(vec![(1u8, 0.6), (2, 0.4), (3, 1.0)]).unwrap_err(),
            MixError::NotIncreasing
        );
        let mix = WeightedMix::new(vec![('a', 0.25), ('b', 1.0)]).unwrap();
        assert_eq!(mix.len(), 2);
        assert_eq!(mix.select(0.3), 'b');
    }

    #[test]
    fn test_think_time_stays_in_range() {
        let mut rng = StdRng::seed_from_u64(3);
        let think = ThinkTime::millis(200, 700);
        for _ in 0..1000 {
            let d = think.draw(&mut rng);
            assert!(d >= Duration::from_millis(200) && d <= Duration::from_millis(700));
        }
        let fixed = ThinkTime::seconds(1, 1);
        assert_eq!(fixed.draw(&mut rng), Duration::from_secs(1));
    }
}
