//! Timing helpers: a monotonic stopwatch, a scope timer, and a precise sleep.

use std::fmt;
use std::thread;
use std::time::{Duration, Instant};

use crate::logging::targets;

/// Below this much remaining time [`hypersleep`] stops sleeping and yields.
const SLEEP_GUARD: Duration = Duration::from_micros(50);
const MIN_SLEEP: Duration = Duration::from_micros(5);

/// Monotonic elapsed-time measurement.
#[derive(Debug, Clone, Copy)]
pub struct Stopwatch {
    start: Instant,
}

impl Stopwatch {
    /// Start a new stopwatch.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Reset the start point to now, returning the time elapsed before the reset.
    pub fn restart(&mut self) -> Duration {
        let now = Instant::now();
        let elapsed = now.duration_since(self.start);
        self.start = now;
        elapsed
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn elapsed_ms(&self) -> u128 {
        self.elapsed().as_millis()
    }

    pub fn elapsed_us(&self) -> u128 {
        self.elapsed().as_micros()
    }
}

impl Default for Stopwatch {
    fn default() -> Self {
        Self::start()
    }
}

type TimerCallback = Box<dyn FnOnce(&str, Duration) + Send>;

/// Measures the lifetime of a scope.
///
/// On drop the callback receives the label and the elapsed time. Without a
/// callback the measurement is logged at `debug` level under the timer target.
///
/// ```
/// use tidewire_core::timer::ScopedTimer;
///
/// let _timer = ScopedTimer::with_callback("handshake", |label, elapsed| {
///     assert_eq!(label, "handshake");
///     assert!(elapsed.as_secs() < 60);
/// });
/// ```
pub struct ScopedTimer {
    label: String,
    watch: Stopwatch,
    callback: Option<TimerCallback>,
}

impl ScopedTimer {
    /// Log the elapsed time under `label` when dropped.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            watch: Stopwatch::start(),
            callback: None,
        }
    }

    /// Invoke `callback` with the label and elapsed time when dropped.
    pub fn with_callback<F>(label: impl Into<String>, callback: F) -> Self
    where
        F: FnOnce(&str, Duration) + Send + 'static,
    {
        Self {
            label: label.into(),
            watch: Stopwatch::start(),
            callback: Some(Box::new(callback)),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Time elapsed so far.
    pub fn elapsed(&self) -> Duration {
        self.watch.elapsed()
    }
}

impl Drop for ScopedTimer {
    fn drop(&mut self) {
        let elapsed = self.watch.elapsed();
        match self.callback.take() {
            Some(callback) => callback(&self.label, elapsed),
            None if !self.label.is_empty() => {
                tracing::debug!(
                    target: targets::TIMER,
                    label = %self.label,
                    elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                    "scope finished"
                );
            }
            None => {}
        }
    }
}

impl fmt::Debug for ScopedTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedTimer")
            .field("label", &self.label)
            .field("elapsed", &self.watch.elapsed())
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}

/// Sleep for `duration` with sub-scheduler-tick precision.
///
/// Sleeps until roughly 50µs before the deadline, then yields until it passes.
/// Never returns early.
pub fn hypersleep(duration: Duration) {
    let deadline = Instant::now() + duration;
    loop {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        let remaining = deadline - now;
        if remaining > SLEEP_GUARD {
            thread::sleep((remaining - SLEEP_GUARD).max(MIN_SLEEP));
        } else {
            thread::yield_now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_stopwatch_restart() {
        let mut watch = Stopwatch::start();
        thread::sleep(Duration::from_millis(5));
        let first = watch.restart();
        assert!(first >= Duration::from_millis(5));
        assert!(watch.elapsed() < first);
    }

    #[test]
    fn test_scoped_timer_invokes_callback() {
        let called = Arc::new(AtomicBool::new(false));
        {
            let called = called.clone();
            let _timer = ScopedTimer::with_callback("work", move |label, elapsed| {
                assert_eq!(label, "work");
                assert!(elapsed >= Duration::from_millis(2));
                called.store(true, Ordering::SeqCst);
            });
            thread::sleep(Duration::from_millis(2));
        }
        assert!(called.load(Ordering::SeqCst));
    }

    #[test]
    fn test_scoped_timer_without_callback() {
        let timer = ScopedTimer::new("quiet");
        assert_eq!(timer.label(), "quiet");
        drop(timer);
    }

    #[test]
    fn test_hypersleep_never_early() {
        for micros in [0u64, 30, 200, 2_000] {
            let duration = Duration::from_micros(micros);
            let start = Instant::now();
            hypersleep(duration);
            assert!(start.elapsed() >= duration);
        }
    }
}
