//! Per-phase rate ramp
//!
//! A [`Ramp`] converts elapsed whole seconds into the number of additional
//! flow starts that should have happened since the previous query. Results
//! are fractional; the phase loop truncates its running total, so
//! remainders carry forward instead of being rounded away.
//!
//! For ramping phases the per-second rate is interpolated between
//! `flow_rate` and `ramp_to` using the elapsed time at the moment of the
//! query, and that same rate is applied to every whole second being caught
//! up. This step accumulation is intentional: a catch-up over several
//! seconds is not the closed-form integral of the linear rate.

use std::time::{SystemTime, UNIX_EPOCH};

use tokio::time::Instant;

use crate::error::PhaseError;

/// Source of whole-second timestamps for ramps.
pub trait Clock: Send + Sync {
    /// Current time in whole seconds.
    fn now_second(&self) -> u64;
}

/// Wall-clock seconds since the Unix epoch.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_second(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs())
    }
}

/// Seconds elapsed on the tokio clock since construction.
///
/// Follows `tokio::time::pause` and `advance`, which makes phase timing
/// deterministic in tests.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    origin: Instant,
}

impl TokioClock {
    /// Creates a clock reading zero now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now_second(&self) -> u64 {
        self.origin.elapsed().as_secs()
    }
}

/// Stateful rate calculator for one phase.
#[derive(Debug, Clone)]
pub struct Ramp {
    duration: u64,
    flow_rate: f64,
    ramp_to: Option<f64>,
    start_second: u64,
    end_second: u64,
    /// Last whole second already accounted for
    cursor: u64,
    finished: bool,
}

impl Ramp {
    /// Creates a ramp starting at `start_second`.
    ///
    /// # Errors
    ///
    /// Returns `PhaseError::InvalidRamp` if `duration` is zero or either
    /// rate is negative or not finite.
    pub fn new(
        phase: &str,
        duration: u64,
        flow_rate: f64,
        ramp_to: Option<f64>,
        start_second: u64,
    ) -> Result<Self, PhaseError> {
        let invalid = |reason: String| PhaseError::InvalidRamp {
            phase: phase.to_string(),
            reason,
        };

        if duration == 0 {
            return Err(invalid("duration must be greater than zero".to_string()));
        }
        if !flow_rate.is_finite() || flow_rate < 0.0 {
            return Err(invalid(format!(
                "flow rate must be a non-negative number, got {flow_rate}"
            )));
        }
        if let Some(to) = ramp_to {
            if !to.is_finite() || to < 0.0 {
                return Err(invalid(format!(
                    "ramp target must be a non-negative number, got {to}"
                )));
            }
        }

        Ok(Self {
            duration,
            flow_rate,
            ramp_to,
            start_second,
            end_second: start_second.saturating_add(duration),
            cursor: start_second,
            finished: false,
        })
    }

    /// Moves an unused ramp so that it starts at `start_second`.
    #[must_use]
    pub const fn anchored_at(mut self, start_second: u64) -> Self {
        self.start_second = start_second;
        self.end_second = start_second.saturating_add(self.duration);
        self.cursor = start_second;
        self.finished = false;
        self
    }

    /// Whether the ramp has reached its end second.
    #[must_use]
    pub const fn finished(&self) -> bool {
        self.finished
    }

    /// Last whole second accounted for.
    #[must_use]
    pub const fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Second at which the ramp ends.
    #[must_use]
    pub const fn end_second(&self) -> u64 {
        self.end_second
    }

    /// Additional flow starts owed by the clock's current second.
    pub fn count_for_current_second(&mut self, clock: &dyn Clock) -> f64 {
        self.count_for_second(clock.now_second())
    }

    /// Additional flow starts owed at `now` since the previous query.
    ///
    /// Queries within the same second return zero, as does every query
    /// after the ramp has finished.
    #[allow(clippy::cast_precision_loss)]
    pub fn count_for_second(&mut self, now: u64) -> f64 {
        if self.finished {
            return 0.0;
        }

        let current = now.min(self.end_second);
        if current <= self.cursor {
            return 0.0;
        }

        let count = match self.ramp_to {
            None => (current - self.cursor) as f64 * self.flow_rate,
            Some(ramp_to) => {
                let percent = (current - self.start_second) as f64 / self.duration as f64;
                let rate = percent.mul_add(ramp_to - self.flow_rate, self.flow_rate);
                let mut count = 0.0;
                for _ in self.cursor..current {
                    count += rate;
                }
                count
            }
        };

        self.cursor = current;
        if current >= self.end_second {
            self.finished = true;
        }

        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ramp(duration: u64, flow_rate: f64, ramp_to: Option<f64>) -> Ramp {
        Ramp::new("test", duration, flow_rate, ramp_to, 1_000).unwrap()
    }

    #[test]
    fn test_rejects_zero_duration() {
        let err = Ramp::new("warmup", 0, 1.0, None, 0).unwrap_err();
        assert!(err.to_string().contains("warmup"));
        assert!(err.to_string().contains("duration"));
    }

    #[test]
    fn test_rejects_negative_rates() {
        assert!(Ramp::new("p", 5, -1.0, None, 0).is_err());
        assert!(Ramp::new("p", 5, 1.0, Some(-2.0), 0).is_err());
        assert!(Ramp::new("p", 5, f64::NAN, None, 0).is_err());
    }

    #[test]
    fn test_static_ramp_per_second() {
        let mut r = ramp(5, 3.0, None);
        assert!((r.count_for_second(1_001) - 3.0).abs() < f64::EPSILON);
        assert!((r.count_for_second(1_002) - 3.0).abs() < f64::EPSILON);
        assert!(!r.finished());
    }

    #[test]
    fn test_same_second_is_noop() {
        let mut r = ramp(5, 3.0, None);
        assert!(r.count_for_second(1_000).abs() < f64::EPSILON);
        assert!((r.count_for_second(1_002) - 6.0).abs() < f64::EPSILON);
        assert!(r.count_for_second(1_002).abs() < f64::EPSILON);
        assert_eq!(r.cursor(), 1_002);
    }

    #[test]
    fn test_static_ramp_clamps_at_end() {
        let mut r = ramp(3, 2.0, None);
        assert!((r.count_for_second(1_010) - 6.0).abs() < f64::EPSILON);
        assert!(r.finished());
        assert_eq!(r.cursor(), r.end_second());
        assert!(r.count_for_second(1_020).abs() < f64::EPSILON);
    }

    #[test]
    fn test_fractional_rate_is_not_rounded() {
        let mut r = ramp(10, 0.25, None);
        let total: f64 = (1_001..=1_010).map(|s| r.count_for_second(s)).sum();
        assert!((total - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_ramping_per_second_interpolation() {
        // 0 -> 10 over 10s, queried every second: 1 + 2 + ... + 10
        let mut r = ramp(10, 0.0, Some(10.0));
        let counts: Vec<f64> = (1_001..=1_010).map(|s| r.count_for_second(s)).collect();
        for (i, c) in counts.iter().enumerate() {
            #[allow(clippy::cast_precision_loss)]
            let expected = (i + 1) as f64;
            assert!((c - expected).abs() < 1e-9, "second {i}: {c}");
        }
        assert!(r.finished());
    }

    #[test]
    fn test_ramping_catch_up_uses_current_elapsed() {
        // A single query at the end applies the final rate to every second.
        let mut r = ramp(10, 0.0, Some(10.0));
        assert!((r.count_for_second(1_010) - 100.0).abs() < 1e-9);
        assert!(r.finished());
    }

    #[test]
    fn test_ramp_down() {
        let mut r = ramp(4, 8.0, Some(0.0));
        assert!((r.count_for_second(1_001) - 6.0).abs() < 1e-9);
        assert!((r.count_for_second(1_002) - 4.0).abs() < 1e-9);
        assert!((r.count_for_second(1_003) - 2.0).abs() < 1e-9);
        assert!(r.count_for_second(1_004).abs() < 1e-9);
        assert!(r.finished());
    }

    #[test]
    fn test_equal_endpoints_behave_like_static() {
        let mut ramping = ramp(6, 4.0, Some(4.0));
        let mut fixed = ramp(6, 4.0, None);
        for s in [1_001, 1_003, 1_006] {
            let a = ramping.count_for_second(s);
            let b = fixed.count_for_second(s);
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn test_anchored_at_moves_window() {
        let mut r = ramp(4, 1.0, None).anchored_at(50);
        assert_eq!(r.cursor(), 50);
        assert_eq!(r.end_second(), 54);
        assert!((r.count_for_second(52) - 2.0).abs() < f64::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_clock_follows_paused_time() {
        let clock = TokioClock::new();
        assert_eq!(clock.now_second(), 0);
        tokio::time::advance(std::time::Duration::from_millis(2_500)).await;
        assert_eq!(clock.now_second(), 2);
    }

    proptest! {
        #[test]
        fn prop_static_total_is_rate_times_elapsed(
            rate in 0.0f64..500.0,
            duration in 1u64..120,
            elapsed in 0u64..120,
        ) {
            let mut r = ramp(duration, rate, None);
            let mut total = 0.0;
            for s in 1..=elapsed {
                total += r.count_for_second(1_000 + s);
            }
            #[allow(clippy::cast_precision_loss)]
            let expected = elapsed.min(duration) as f64 * rate;
            prop_assert!((total - expected).abs() < 1e-6 * expected.max(1.0));
        }

        #[test]
        fn prop_finished_exactly_at_duration(
            from in 0.0f64..100.0,
            to in 0.0f64..100.0,
            duration in 1u64..60,
        ) {
            let mut r = ramp(duration, from, Some(to));
            for s in 1..duration {
                r.count_for_second(1_000 + s);
                prop_assert!(!r.finished());
            }
            r.count_for_second(1_000 + duration);
            prop_assert!(r.finished());
            prop_assert!(r.count_for_second(1_000 + duration + 5).abs() < f64::EPSILON);
        }

        #[test]
        fn prop_cursor_is_monotonic_and_bounded(
            queries in proptest::collection::vec(0u64..50, 1..40),
        ) {
            let mut r = ramp(20, 1.0, Some(3.0));
            let mut last = r.cursor();
            for q in queries {
                r.count_for_second(1_000 + q);
                prop_assert!(r.cursor() >= last);
                prop_assert!(r.cursor() <= r.end_second());
                last = r.cursor();
            }
        }
    }
}
