//! Real-time pacing.
//!
//! [`Synchronizer`] keeps playback paced at real time: given a unit's
//! presentation time, it sleeps until the unit is due, tolerates a small lag,
//! and asks the caller to drop the unit once the lag exceeds a budget.
//!
//! [`CalibratingThrottle`] is the live-pipeline variant of the same decision:
//! it first estimates the typical clock offset between the source's
//! timestamps and the local clock from a fixed number of samples (discarding
//! the minimum and maximum as outliers), then applies the identical keep/drop
//! contract against that offset. Both run through [`decide`] so the contract
//! cannot diverge.

use std::time::{Duration, Instant};

use media_core::{TimeBase, rescale_q};
use tracing::{debug, trace};

pub const DEFAULT_MAX_DELAY_MILLIS: u64 = 1000;

/// Number of calibration samples averaged, not counting the two discarded
/// outliers.
pub const DEFAULT_CALIBRATION_SAMPLES: u32 = 10;

/// Outcome of a pacing decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleDecision {
    /// Deliver the unit (a wait, if one was needed, already happened).
    Keep,
    /// The unit is too late; skip it to catch up.
    Drop,
}

/// The shared wait/pass/drop decision.
///
/// `now` and `target` are instants on the same clock, in milliseconds.
/// Early: wait for `target - now`. Later than `target` by more than
/// `max_delay`: drop. Otherwise pass; a lag of exactly `max_delay` is still
/// a pass.
pub(crate) fn decide(now: i64, target: i64, max_delay: u64) -> Step {
    if now < target {
        Step::Wait(Duration::from_millis((target - now) as u64))
    } else if (now - target) as u64 > max_delay {
        Step::Drop
    } else {
        Step::Pass
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    Wait(Duration),
    Pass,
    Drop,
}

/// Paces delivery against the wall clock by sleeping until each unit is due.
///
/// The constructor records a fallback playback origin in case `start` is
/// never called.
#[derive(Debug)]
pub struct Synchronizer {
    origin: Instant,
    max_delay_millis: u64,
}

impl Synchronizer {
    pub fn new(max_delay_millis: u64) -> Self {
        Self {
            origin: Instant::now(),
            max_delay_millis,
        }
    }

    /// Record the playback origin. Call on the first unit to begin timing.
    pub fn start(&mut self) {
        self.origin = Instant::now();
    }

    /// Sleep until `pts` is due, or decide to drop it.
    ///
    /// The caller must supply a valid pts; synthesis for sourceless
    /// timestamps is the caller's job.
    pub fn throttle(&mut self, pts: i64, time_base: TimeBase) -> ThrottleDecision {
        let target = rescale_q(pts, time_base, TimeBase::MILLIS);
        let now = self.origin.elapsed().as_millis() as i64;
        match decide(now, target, self.max_delay_millis) {
            Step::Wait(duration) => {
                trace!("sleeping {}ms to pace delivery", duration.as_millis());
                std::thread::sleep(duration);
                ThrottleDecision::Keep
            }
            Step::Pass => ThrottleDecision::Keep,
            Step::Drop => {
                debug!("dropping unit {}ms late", now - target);
                ThrottleDecision::Drop
            }
        }
    }
}

impl Default for Synchronizer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DELAY_MILLIS)
    }
}

enum CalibrationState {
    Measuring {
        samples: u32,
        cumulative: i64,
        min: i64,
        max: i64,
    },
    Calibrated {
        skew: i64,
    },
}

/// Keep/drop pacing with a calibration phase that first estimates the
/// typical clock offset between source timestamps and the local clock.
///
/// Unlike [`Synchronizer`] this never sleeps: a live pipeline delivers at the
/// source's pace, and the only remedy for sustained lag is dropping.
pub struct CalibratingThrottle {
    origin: Instant,
    max_delay_millis: u64,
    sample_target: u32,
    state: CalibrationState,
}

impl CalibratingThrottle {
    pub fn new(max_delay_millis: u64) -> Self {
        Self::with_samples(max_delay_millis, DEFAULT_CALIBRATION_SAMPLES)
    }

    pub fn with_samples(max_delay_millis: u64, samples: u32) -> Self {
        Self {
            origin: Instant::now(),
            max_delay_millis,
            // at least one sample must survive the outlier trim
            sample_target: samples.max(1),
            state: CalibrationState::Measuring {
                samples: 0,
                cumulative: 0,
                min: 0,
                max: 0,
            },
        }
    }

    pub fn is_calibrated(&self) -> bool {
        matches!(self.state, CalibrationState::Calibrated { .. })
    }

    pub fn throttle(&mut self, pts: i64, time_base: TimeBase) -> ThrottleDecision {
        let pts_millis = rescale_q(pts, time_base, TimeBase::MILLIS);
        let now = self.origin.elapsed().as_millis() as i64;
        self.observe(now - pts_millis)
    }

    /// Feed one clock-offset observation (local clock minus timestamp, in
    /// milliseconds) and decide whether the unit is on time.
    fn observe(&mut self, diff: i64) -> ThrottleDecision {
        match &mut self.state {
            CalibrationState::Measuring {
                samples,
                cumulative,
                min,
                max,
            } => {
                if *samples == 0 {
                    *min = diff;
                    *max = diff;
                } else {
                    *min = (*min).min(diff);
                    *max = (*max).max(diff);
                }
                *samples += 1;
                *cumulative += diff;

                // the +2 accounts for the two outliers discarded below
                if *samples >= self.sample_target + 2 {
                    let trimmed = *cumulative - *min - *max;
                    let skew = trimmed / self.sample_target as i64;
                    debug!(
                        skew_millis = skew,
                        "clock-offset calibration complete, watching for latency over {}ms",
                        self.max_delay_millis
                    );
                    self.state = CalibrationState::Calibrated { skew };
                }
                // never drop while measuring
                ThrottleDecision::Keep
            }
            CalibrationState::Calibrated { skew } => {
                match decide(diff, *skew, self.max_delay_millis) {
                    // a live source is never "early" enough to wait on
                    Step::Wait(_) | Step::Pass => ThrottleDecision::Keep,
                    Step::Drop => {
                        debug!("dropping unit {}ms behind calibrated clock", diff - *skew);
                        ThrottleDecision::Drop
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn early_units_wait_until_target() {
        assert_eq!(decide(100, 150, 1000), Step::Wait(Duration::from_millis(50)));
    }

    #[test]
    fn small_lag_passes_without_waiting() {
        assert_eq!(decide(150, 100, 1000), Step::Pass);
    }

    #[test]
    fn lag_over_budget_drops() {
        assert_eq!(decide(1151, 100, 1000), Step::Drop);
    }

    #[test]
    fn lag_exactly_at_budget_passes() {
        // boundary: now - target == max_delay must be a pass, not a drop
        assert_eq!(decide(1100, 100, 1000), Step::Pass);
        assert_eq!(decide(1101, 100, 1000), Step::Drop);
    }

    #[test]
    fn synchronizer_drops_late_units() {
        let mut sync = Synchronizer::new(10);
        sync.start();
        // A pts far in the past relative to the origin is beyond the budget.
        assert_eq!(sync.throttle(-100, TimeBase::MILLIS), ThrottleDecision::Drop);
    }

    #[test]
    fn synchronizer_sleeps_for_future_units() {
        let mut sync = Synchronizer::new(1000);
        sync.start();
        let begin = Instant::now();
        assert_eq!(sync.throttle(30, TimeBase::MILLIS), ThrottleDecision::Keep);
        assert!(begin.elapsed() >= Duration::from_millis(25));
    }

    #[test]
    fn calibration_discards_min_and_max_outliers() {
        let mut throttle = CalibratingThrottle::with_samples(100, 4);
        // 6 samples: outliers -500 and 900 must not skew the average of
        // [10, 10, 10, 10] = 10.
        for diff in [10, -500, 10, 900, 10, 10] {
            assert_eq!(throttle.observe(diff), ThrottleDecision::Keep);
        }
        assert!(throttle.is_calibrated());

        // within budget of the calibrated skew
        assert_eq!(throttle.observe(110), ThrottleDecision::Keep);
        // past the budget
        assert_eq!(throttle.observe(111), ThrottleDecision::Drop);
    }

    #[test]
    fn zero_sample_count_still_calibrates() {
        let mut throttle = CalibratingThrottle::with_samples(100, 0);
        // clamped to one kept sample plus the two discarded outliers
        assert_eq!(throttle.observe(10), ThrottleDecision::Keep);
        assert_eq!(throttle.observe(10), ThrottleDecision::Keep);
        assert!(!throttle.is_calibrated());
        assert_eq!(throttle.observe(10), ThrottleDecision::Keep);
        assert!(throttle.is_calibrated());
        assert_eq!(throttle.observe(111), ThrottleDecision::Drop);
    }

    #[test]
    fn never_drops_while_measuring() {
        let mut throttle = CalibratingThrottle::with_samples(1, 10);
        for _ in 0..11 {
            assert_eq!(throttle.observe(10_000), ThrottleDecision::Keep);
        }
        assert!(!throttle.is_calibrated());
    }
}
