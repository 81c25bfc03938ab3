//! Precise cycle timer for fixed-rate loops.
//!
//! The timer targets successive multiples of the period measured from
//! construction on the monotonic clock, so late cycles do not shift the
//! cadence. The wait is a hybrid: a coarse `thread::sleep` covers most of
//! the interval, then a short spin phase closes in on the target without
//! burning a core for the full period.

use std::time::{Duration, Instant};

use crate::breaker::Breaker;
use crate::telem::Rate;

/// Margin before the target at which the coarse sleep hands over to the
/// spin phase. Large enough to absorb typical scheduler wake-up jitter.
const SPIN_MARGIN: Duration = Duration::from_micros(200);

/// Fixed-period timer with sleep-then-spin waits.
pub struct Timer {
    period: Duration,
    start: Instant,
    iteration: u64,
    last_wake: Instant,
}

impl Timer {
    /// Creates a timer targeting the given period, starting now.
    pub fn new(period: Duration) -> Self {
        let now = Instant::now();
        Self {
            period,
            start: now,
            iteration: 0,
            last_wake: now,
        }
    }

    /// Creates a timer from a rate.
    pub fn from_rate(rate: Rate) -> Self {
        Self::new(rate.period())
    }

    /// The configured period.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Waits until the next period boundary.
    ///
    /// Returns `(elapsed, on_time)`: `elapsed` is the time since the
    /// previous wake, `on_time` is false when the boundary had already
    /// passed on entry (an overrun).
    pub fn wait(&mut self) -> (Duration, bool) {
        self.wait_inner(None)
    }

    /// Like [`Timer::wait`], but returns early when the breaker stops.
    pub fn wait_with(&mut self, breaker: &Breaker) -> (Duration, bool) {
        self.wait_inner(Some(breaker))
    }

    fn wait_inner(&mut self, breaker: Option<&Breaker>) -> (Duration, bool) {
        self.iteration += 1;
        let target = self.start
            + Duration::from_nanos(
                (self.period.as_nanos() as u64).saturating_mul(self.iteration),
            );
        let entry = Instant::now();
        let on_time = entry <= target;
        if on_time {
            let remaining = target - entry;
            if remaining > SPIN_MARGIN {
                let coarse = remaining - SPIN_MARGIN;
                match breaker {
                    Some(brk) => {
                        if !brk.sleep(coarse) {
                            let now = Instant::now();
                            let elapsed = now - self.last_wake;
                            self.last_wake = now;
                            return (elapsed, true);
                        }
                    }
                    None => std::thread::sleep(coarse),
                }
            }
            while Instant::now() < target {
                if let Some(brk) = breaker
                    && !brk.running()
                {
                    break;
                }
                std::hint::spin_loop();
            }
        }
        let now = Instant::now();
        let elapsed = now - self.last_wake;
        self.last_wake = now;
        (elapsed, on_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker;

    #[test]
    fn wait_targets_period_multiples() {
        let period = Duration::from_millis(5);
        let mut timer = Timer::new(period);
        let start = Instant::now();
        let count = 10u32;
        for _ in 0..count {
            timer.wait();
        }
        let total = start.elapsed();
        let expected = period * count;
        // Cadence tracks multiples of the period, within scheduler noise.
        assert!(total >= expected - Duration::from_millis(1));
        assert!(total < expected + Duration::from_millis(50));
    }

    #[test]
    fn overrun_reports_not_on_time() {
        let mut timer = Timer::new(Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(5));
        let (elapsed, on_time) = timer.wait();
        assert!(!on_time);
        assert!(elapsed >= Duration::from_millis(5));
    }

    #[test]
    fn breaker_stop_interrupts_wait() {
        let brk = Breaker::new(breaker::Config::default());
        brk.start();
        let brk2 = brk.clone();
        let handle = std::thread::spawn(move || {
            let mut timer = Timer::new(Duration::from_secs(5));
            let start = Instant::now();
            timer.wait_with(&brk2);
            start.elapsed()
        });
        std::thread::sleep(Duration::from_millis(20));
        brk.stop();
        let elapsed = handle.join().unwrap();
        assert!(elapsed < Duration::from_secs(1));
    }
}
