//! Rational time bases and timestamp rescaling.
//!
//! A [`TimeBase`] is the number of seconds per timestamp tick, expressed as a
//! rational so that exact container/codec rates (1/90000, 1001/30000, ...)
//! survive arithmetic. Rescaling converts a tick count from one time base to
//! another, rounding to nearest with ties away from zero, and passes unknown
//! timestamps through untouched.

use std::fmt;

/// Seconds-per-tick rational defining the unit of a timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeBase {
    pub num: i32,
    pub den: i32,
}

impl TimeBase {
    /// The millisecond time base used for wall-clock arithmetic.
    pub const MILLIS: TimeBase = TimeBase { num: 1, den: 1000 };

    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /// A time base is usable when both terms are positive.
    pub fn is_valid(&self) -> bool {
        self.num > 0 && self.den > 0
    }

    /// The multiplicative inverse, e.g. a 30/1 frame rate becomes a 1/30
    /// time base.
    pub fn invert(&self) -> TimeBase {
        TimeBase::new(self.den, self.num)
    }
}

impl fmt::Display for TimeBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// Rescale `value` ticks from `from` to `to`, rounding to nearest with ties
/// away from zero.
pub fn rescale_q(value: i64, from: TimeBase, to: TimeBase) -> i64 {
    // value * (from.num * to.den) / (from.den * to.num), in wide arithmetic
    // so intermediate products cannot overflow for any i64 timestamp.
    let num = from.num as i128 * to.den as i128;
    let den = from.den as i128 * to.num as i128;
    if den == 0 {
        return value;
    }
    let product = value as i128 * num;
    let half = den.abs() / 2;
    let rounded = if product >= 0 {
        (product + half) / den
    } else {
        (product - half) / den
    };
    rounded.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}

/// Rescale an optional timestamp, passing an unknown timestamp through
/// unchanged (the pass-through-min/max rounding used for packet timing).
pub fn rescale_q_rnd(value: Option<i64>, from: TimeBase, to: TimeBase) -> Option<i64> {
    value.map(|v| rescale_q(v, from, to))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rescale_identity() {
        let tb = TimeBase::new(1, 90000);
        assert_eq!(rescale_q(12345, tb, tb), 12345);
    }

    #[test]
    fn rescale_to_millis() {
        // 90000 ticks of a 1/90000 base is exactly one second.
        assert_eq!(rescale_q(90000, TimeBase::new(1, 90000), TimeBase::MILLIS), 1000);
        // 1 tick of a 1/30 base is 33.3ms, rounded to nearest.
        assert_eq!(rescale_q(1, TimeBase::new(1, 30), TimeBase::MILLIS), 33);
        assert_eq!(rescale_q(2, TimeBase::new(1, 30), TimeBase::MILLIS), 67);
    }

    #[test]
    fn rescale_rounds_away_from_zero_on_ties() {
        // 1 tick of 1/2000 is 0.5ms.
        assert_eq!(rescale_q(1, TimeBase::new(1, 2000), TimeBase::MILLIS), 1);
        assert_eq!(rescale_q(-1, TimeBase::new(1, 2000), TimeBase::MILLIS), -1);
    }

    #[test]
    fn rescale_negative_timestamps() {
        assert_eq!(rescale_q(-90000, TimeBase::new(1, 90000), TimeBase::MILLIS), -1000);
    }

    #[test]
    fn unknown_timestamp_passes_through() {
        assert_eq!(rescale_q_rnd(None, TimeBase::new(1, 90000), TimeBase::MILLIS), None);
        assert_eq!(
            rescale_q_rnd(Some(90000), TimeBase::new(1, 90000), TimeBase::MILLIS),
            Some(1000)
        );
    }

    #[test]
    fn invert_swaps_terms() {
        assert_eq!(TimeBase::new(30, 1).invert(), TimeBase::new(1, 30));
    }

    #[test]
    fn large_values_do_not_overflow() {
        let v = i64::MAX / 4;
        let out = rescale_q(v, TimeBase::new(1, 1000), TimeBase::new(1, 1000));
        assert_eq!(out, v);
    }
}
