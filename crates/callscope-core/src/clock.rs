//! Elapsed-time sources for call timing.
//!
//! A [`Clock`] hands out one [`ElapsedReader`] per invocation. The reader
//! captures the elapsed time on its first read and returns that same value on
//! every later read, so a completion event can never report two different
//! durations for one call.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

/// Source of per-invocation elapsed-time readers.
pub trait Clock: Send + Sync + 'static {
    /// Starts timing and returns a reader for the elapsed milliseconds.
    fn start(&self) -> ElapsedReader;
}

/// Reads the milliseconds elapsed since [`Clock::start`].
///
/// The first call to [`read`](Self::read) fixes the value.
pub struct ElapsedReader {
    source: Box<dyn Fn() -> f64 + Send + Sync>,
    value: OnceLock<f64>,
}

impl ElapsedReader {
    /// Creates a reader from a function returning elapsed milliseconds.
    pub fn new(source: impl Fn() -> f64 + Send + Sync + 'static) -> Self {
        Self {
            source: Box::new(source),
            value: OnceLock::new(),
        }
    }

    /// Returns elapsed milliseconds, captured on first read.
    pub fn read(&self) -> f64 {
        *self.value.get_or_init(|| (self.source)())
    }

    /// Returns true once the elapsed time has been captured.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.value.get().is_some()
    }
}

impl fmt::Debug for ElapsedReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElapsedReader")
            .field("value", &self.value.get())
            .finish_non_exhaustive()
    }
}

/// Monotonic clock backed by [`Instant`].
#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn start(&self) -> ElapsedReader {
        let started = Instant::now();
        ElapsedReader::new(move || started.elapsed().as_secs_f64() * 1e3)
    }
}

/// Clock that only moves when told to.
///
/// Clones share the same time line.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now_ns: Arc<AtomicU64>,
}

impl ManualClock {
    /// Creates a manual clock at time zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        let ns = u64::try_from(by.as_nanos()).unwrap_or(u64::MAX);
        self.now_ns.fetch_add(ns, Ordering::SeqCst);
    }

    /// Returns the time elapsed since the clock was created.
    #[must_use]
    pub fn now(&self) -> Duration {
        Duration::from_nanos(self.now_ns.load(Ordering::SeqCst))
    }
}

impl Clock for ManualClock {
    fn start(&self) -> ElapsedReader {
        let now_ns = Arc::clone(&self.now_ns);
        let started = now_ns.load(Ordering::SeqCst);
        ElapsedReader::new(move || {
            let delta = now_ns.load(Ordering::SeqCst).saturating_sub(started);
            delta as f64 / 1e6
        })
    }
}
