//! Cooperative cancellation with exponential retry backoff.
//!
//! A [`Breaker`] is shared between a long-running loop and the code that
//! stops it. The loop polls [`Breaker::running`]; retry sites call
//! [`Breaker::wait`], which sleeps the current backoff interval and reports
//! whether the retry budget still has room. `stop()` interrupts any
//! in-progress backoff sleep so cancellation is observed promptly.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Error;

/// Retry/backoff parameters for a [`Breaker`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Name used in log messages.
    pub name: String,
    /// First backoff interval [ms].
    pub base_interval_ms: u64,
    /// Multiplier applied to the interval after each retry.
    pub scale: f64,
    /// Number of retries before `wait` reports exhaustion.
    pub max_retries: u32,
    /// Upper bound on the backoff interval [ms].
    pub max_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: "breaker".to_string(),
            base_interval_ms: 100,
            scale: 1.5,
            max_retries: 10,
            max_interval_ms: 5_000,
        }
    }
}

impl Config {
    /// The first backoff interval.
    pub fn base_interval(&self) -> Duration {
        Duration::from_millis(self.base_interval_ms)
    }

    /// The backoff interval cap.
    pub fn max_interval(&self) -> Duration {
        Duration::from_millis(self.max_interval_ms)
    }
}

struct Inner {
    config: Config,
    running: AtomicBool,
    retries: AtomicU32,
    mu: Mutex<()>,
    cv: Condvar,
}

/// Shared cancellation/backoff handle. Clones observe the same state.
#[derive(Clone)]
pub struct Breaker {
    inner: Arc<Inner>,
}

impl Breaker {
    /// Creates a stopped breaker with the given configuration.
    pub fn new(config: Config) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                running: AtomicBool::new(false),
                retries: AtomicU32::new(0),
                mu: Mutex::new(()),
                cv: Condvar::new(),
            }),
        }
    }

    /// Marks the breaker as running.
    pub fn start(&self) {
        self.inner.running.store(true, Ordering::Release);
    }

    /// Marks the breaker as stopped and wakes any backoff sleeper.
    pub fn stop(&self) {
        self.inner.running.store(false, Ordering::Release);
        let _guard = self.inner.mu.lock();
        self.inner.cv.notify_all();
    }

    /// Stops the breaker and clears the retry counter.
    pub fn reset(&self) {
        self.inner.retries.store(0, Ordering::Relaxed);
        self.stop();
    }

    /// True while the breaker has been started and not stopped.
    pub fn running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Number of retries consumed since the last reset.
    pub fn retries(&self) -> u32 {
        self.inner.retries.load(Ordering::Relaxed)
    }

    /// Consumes one retry and sleeps the backoff interval.
    ///
    /// Returns `false` when the retry budget is exhausted or the breaker was
    /// stopped during the sleep; `true` means the caller should retry.
    pub fn wait(&self, err: &Error) -> bool {
        let attempt = self.inner.retries.fetch_add(1, Ordering::Relaxed);
        if attempt >= self.inner.config.max_retries {
            warn!(
                name = %self.inner.config.name,
                retries = attempt,
                %err,
                "retry budget exhausted"
            );
            return false;
        }
        let interval = self.backoff(attempt);
        warn!(
            name = %self.inner.config.name,
            ?interval,
            attempt,
            %err,
            "operation failed, backing off"
        );
        self.sleep(interval)
    }

    /// Sleeps up to `duration`, returning early when the breaker stops.
    /// Returns `true` when the breaker is still running afterwards.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let mut guard = self.inner.mu.lock();
        while self.inner.running.load(Ordering::Acquire) {
            if self.inner.cv.wait_until(&mut guard, deadline).timed_out() {
                return self.running();
            }
        }
        false
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let base = self.inner.config.base_interval();
        let scaled = base.as_secs_f64() * self.inner.config.scale.powi(attempt as i32);
        Duration::from_secs_f64(scaled).min(self.inner.config.max_interval())
    }
}

impl std::fmt::Debug for Breaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Breaker")
            .field("name", &self.inner.config.name)
            .field("running", &self.running())
            .field("retries", &self.retries())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config(max_retries: u32) -> Config {
        Config {
            name: "test".to_string(),
            base_interval_ms: 1,
            scale: 2.0,
            max_retries,
            max_interval_ms: 4,
        }
    }

    #[test]
    fn start_stop_running() {
        let b = Breaker::new(fast_config(3));
        assert!(!b.running());
        b.start();
        assert!(b.running());
        b.stop();
        assert!(!b.running());
    }

    #[test]
    fn wait_exhausts_after_max_retries() {
        let b = Breaker::new(fast_config(2));
        b.start();
        let err = Error::Activation("boom".into());
        assert!(b.wait(&err));
        assert!(b.wait(&err));
        assert!(!b.wait(&err));
    }

    #[test]
    fn backoff_is_capped() {
        let b = Breaker::new(fast_config(10));
        assert_eq!(b.backoff(0), Duration::from_millis(1));
        assert_eq!(b.backoff(1), Duration::from_millis(2));
        assert_eq!(b.backoff(5), Duration::from_millis(4));
    }

    #[test]
    fn stop_interrupts_sleep() {
        let b = Breaker::new(Config {
            base_interval_ms: 10_000,
            ..fast_config(5)
        });
        b.start();
        let b2 = b.clone();
        let handle = std::thread::spawn(move || {
            let start = Instant::now();
            let kept_running = b2.sleep(Duration::from_secs(10));
            (kept_running, start.elapsed())
        });
        std::thread::sleep(Duration::from_millis(20));
        b.stop();
        let (kept_running, elapsed) = handle.join().unwrap();
        assert!(!kept_running);
        assert!(elapsed < Duration::from_secs(1));
    }

    #[test]
    fn reset_clears_retries() {
        let b = Breaker::new(fast_config(3));
        b.start();
        let err = Error::Cyclic("x".into());
        assert!(b.wait(&err));
        assert_eq!(b.retries(), 1);
        b.reset();
        assert_eq!(b.retries(), 0);
        assert!(!b.running());
    }
}
