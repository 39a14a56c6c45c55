use std::fmt;
use std::panic;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::runtime::{self, Handle, Runtime};
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use crate::error::{ConfigError, ConfigResult};
use crate::{Accumulator, Liveness};

/// Number of buckets a counter is created with.
pub const DEFAULT_RESOLUTION: usize = 20;

/// Shortest period the rotation task will tick at.
///
/// Intervals too short to give every bucket this much time (including a zero
/// interval) rotate at this period instead of spinning.
pub const MIN_TICK_PERIOD: Duration = Duration::from_millis(1);

/// Thread-safe counter of the events recorded during the trailing `interval`.
///
/// The window is split into `resolution` buckets arranged in a ring. Recording
/// adds to a running total and to the current bucket. A background rotation
/// task wakes every `interval / resolution`, subtracts the oldest bucket from
/// the total, clears it, and makes it current. Over one `interval` every bucket
/// is visited once, so the total tracks roughly the last `interval` of activity.
///
/// # Algorithm Behavior
///
/// - Recording and querying are wait-free: plain atomic adds and loads
/// - The rotation task is spawned by the first [`incr`](Self::incr), never earlier
/// - Exactly one rotation task runs per counter, guarded by a compare-and-swap
/// - The task stops for good once the liveness signal is cancelled, or at its
///   next tick after the counter is dropped
///
/// # Accuracy
///
/// An event stays visible for between `interval` and
/// `interval + interval / resolution`, depending on where in its bucket's
/// lifetime it was recorded. An increment racing a rotation tick may land in
/// the bucket being expired and disappear early. Raising the resolution narrows
/// both errors at the cost of one 64-bit slot per bucket.
///
/// # Runtime
///
/// When the first event is recorded from inside a tokio runtime with its time
/// driver enabled, the rotation task is spawned onto it. Otherwise it runs on a
/// single background runtime shared by every counter in the process. If the
/// task's runtime shuts down, the next [`incr`](Self::incr) starts a new one.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use rate_counter_core::{CancellationToken, RateCounter};
///
/// let shutdown = CancellationToken::new();
/// let counter = RateCounter::new(shutdown.clone(), Duration::from_secs(1)).with_resolution(10);
///
/// counter.incr(1);
/// counter.incr(2);
/// assert_eq!(counter.rate(), 3);
/// assert_eq!(counter.to_string(), "3");
///
/// shutdown.cancel();
/// ```
pub struct RateCounter<S = CancellationToken> {
    /// Length of the trailing window
    interval: Duration,
    /// Buckets and bookkeeping shared with the rotation task
    shared: Arc<Shared>,
    /// Whether a rotation task is alive; cleared when the task is dropped
    running: Arc<AtomicBool>,
    /// Stops the rotation task once triggered
    signal: S,
}

/// State shared between recorders and the rotation task.
struct Shared {
    /// Sum of every bucket, maintained alongside them
    total: Accumulator,
    /// Per-bucket partial sums (ring, fixed length)
    buckets: Box<[Accumulator]>,
    /// Index of the bucket receiving new events
    current: AtomicUsize,
}

impl Shared {
    fn new(resolution: usize) -> Self {
        Self {
            total: Accumulator::new(),
            buckets: (0..resolution).map(|_| Accumulator::new()).collect(),
            current: AtomicUsize::new(0),
        }
    }

    fn record(&self, delta: i64) {
        self.total.add(delta);
        // The index may move on concurrently; landing in the bucket about to
        // be expired is an accepted approximation.
        self.buckets[self.current.load(Ordering::Acquire)].add(delta);
    }

    /// Expires the bucket after the current one and makes it current.
    /// Returns the amount removed from the total.
    fn rotate(&self) -> i64 {
        let current = self.current.load(Ordering::Acquire);
        let next = (current + 1) % self.buckets.len();

        let expired = self.buckets[next].take();
        self.total.add(expired.wrapping_neg());

        // Only one rotation task exists per counter, so this exchange does not
        // fail in practice. If it ever does the advance is skipped this tick.
        let _ = self
            .current
            .compare_exchange(current, next, Ordering::AcqRel, Ordering::Acquire);

        expired
    }
}

impl<S> RateCounter<S>
where
    S: Liveness + Clone,
{
    /// Creates a counter over the trailing `interval`, with
    /// [`DEFAULT_RESOLUTION`] buckets.
    ///
    /// `interval` is not validated. A zero interval rotates every
    /// [`MIN_TICK_PERIOD`], which empties the counter almost immediately.
    ///
    /// # Parameters
    ///
    /// * `signal` - Liveness signal; cancelling it stops the rotation task for good
    /// * `interval` - Length of the trailing window
    pub fn new(signal: S, interval: Duration) -> Self {
        RateCounter {
            interval,
            shared: Arc::new(Shared::new(DEFAULT_RESOLUTION)),
            running: Arc::new(AtomicBool::new(false)),
            signal,
        }
    }

    /// Replaces the bucket ring with `resolution` fresh buckets.
    ///
    /// The current index, every partial sum and the total are reset.
    /// Intended for fluent configuration right after [`new`](Self::new).
    ///
    /// # Panics
    ///
    /// Panics if `resolution` is zero, or if a rotation task is still alive for
    /// this counter. Both are programmer errors; see
    /// [`try_with_resolution`](Self::try_with_resolution) for a fallible form.
    pub fn with_resolution(self, resolution: usize) -> Self {
        match self.try_with_resolution(resolution) {
            Ok(counter) => counter,
            Err(e) => panic!("{e}"),
        }
    }

    /// Fallible form of [`with_resolution`](Self::with_resolution).
    ///
    /// # Errors
    ///
    /// * [`ConfigError::InvalidResolution`] if `resolution` is zero
    /// * [`ConfigError::AlreadyRunning`] if a rotation task still holds the
    ///   counter's buckets
    ///
    /// The buckets are left untouched when an error is returned.
    pub fn try_with_resolution(mut self, resolution: usize) -> ConfigResult<Self> {
        if resolution < 1 {
            return Err(ConfigError::InvalidResolution { resolution });
        }

        let shared = Arc::get_mut(&mut self.shared).ok_or(ConfigError::AlreadyRunning)?;
        *shared = Shared::new(resolution);
        Ok(self)
    }

    /// Records `delta` events. Negative deltas decrement.
    ///
    /// Starts the rotation task if it is not running yet. Never blocks.
    #[inline]
    pub fn incr(&self, delta: i64) {
        self.shared.record(delta);
        self.ensure_running();
    }

    /// Returns the approximate number of events recorded in the last `interval`.
    #[inline]
    pub fn rate(&self) -> i64 {
        self.shared.total.value()
    }

    /// Length of the trailing window.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Number of buckets the window is split into.
    pub fn resolution(&self) -> usize {
        self.shared.buckets.len()
    }

    /// Period at which the rotation task expires a bucket.
    pub fn tick_period(&self) -> Duration {
        tick_period(self.interval, self.resolution())
    }

    /// Returns `true` while a rotation task is alive for this counter.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn ensure_running(&self) {
        if self.running.load(Ordering::Relaxed) {
            return;
        }
        // Rotation never restarts after cancellation.
        if self.signal.is_cancelled() {
            return;
        }
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        self.spawn_rotation();
    }

    fn spawn_rotation(&self) {
        let resolution = self.resolution();
        let period = self.tick_period();
        if period.as_nanos().saturating_mul(resolution as u128) > self.interval.as_nanos() {
            warn!(
                interval = ?self.interval,
                resolution,
                "rate counter interval too short for its resolution, rotating every {MIN_TICK_PERIOD:?}"
            );
        }

        let rotation = Rotation {
            shared: Arc::downgrade(&self.shared),
            running: Arc::clone(&self.running),
            period,
        };

        let handle = match Handle::try_current() {
            Ok(handle) if has_time_driver(&handle) => {
                debug!(interval = ?self.interval, resolution, tick_period = ?period, "starting rate counter rotation on ambient runtime");
                handle
            }
            _ => match background_runtime() {
                Some(rt) => {
                    debug!(interval = ?self.interval, resolution, tick_period = ?period, "starting rate counter rotation on background runtime");
                    rt.handle().clone()
                }
                // Dropping `rotation` releases the running flag; the next
                // `incr` tries again.
                None => return,
            },
        };

        handle.spawn(rotation.run(self.signal.clone()));
    }
}

/// The background task expiring one bucket per tick.
///
/// However the task ends (cancellation, counter dropped, runtime shut down,
/// panic) dropping this clears the counter's running flag.
struct Rotation {
    /// Weak so that dropping the counter ends the task
    shared: Weak<Shared>,
    running: Arc<AtomicBool>,
    period: Duration,
}

impl Rotation {
    async fn run<S: Liveness>(self, signal: S) {
        // The first expiry happens one full period after start.
        let mut ticker = time::interval_at(Instant::now() + self.period, self.period);
        let mut cancelled = signal.cancelled();

        loop {
            tokio::select! {
                biased;
                () = &mut cancelled => {
                    debug!("rate counter rotation cancelled");
                    return;
                }
                _ = ticker.tick() => {
                    let Some(shared) = self.shared.upgrade() else {
                        debug!("rate counter dropped, stopping rotation");
                        return;
                    };
                    let expired = shared.rotate();
                    trace!(expired, "rate counter bucket rotated");
                }
            }
        }
    }
}

impl Drop for Rotation {
    fn drop(&mut self) {
        // Release the buckets before publishing, so a caller observing a
        // stopped counter can reconfigure it.
        self.shared = Weak::new();
        self.running.store(false, Ordering::Release);
    }
}

/// Returns `true` if timers can be created on `handle`'s runtime.
///
/// tokio offers no query for this; creating a timer on a runtime built without
/// `enable_time` panics, so that panic is caught here.
fn has_time_driver(handle: &Handle) -> bool {
    let _enter = handle.enter();
    let enabled = panic::catch_unwind(|| drop(time::sleep(Duration::ZERO))).is_ok();
    if !enabled {
        debug!("ambient tokio runtime has timers disabled");
    }
    enabled
}

/// Runtime hosting the rotation of every counter started outside a usable
/// tokio runtime. Built on first use and never shut down.
fn background_runtime() -> Option<&'static Runtime> {
    static BACKGROUND: OnceLock<Option<Runtime>> = OnceLock::new();

    BACKGROUND
        .get_or_init(|| {
            match runtime::Builder::new_multi_thread()
                .worker_threads(1)
                .thread_name("rate-counter-rotation")
                .enable_time()
                .build()
            {
                Ok(rt) => Some(rt),
                Err(e) => {
                    error!("failed to build rate counter rotation runtime: {e}");
                    None
                }
            }
        })
        .as_ref()
}

/// `interval / resolution`, floored at [`MIN_TICK_PERIOD`].
fn tick_period(interval: Duration, resolution: usize) -> Duration {
    let nanos = interval.as_nanos() / resolution.max(1) as u128;
    let period = Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX));
    period.max(MIN_TICK_PERIOD)
}

impl<S> fmt::Display for RateCounter<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.shared.total)
    }
}

impl<S> fmt::Debug for RateCounter<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateCounter")
            .field("interval", &self.interval)
            .field("resolution", &self.shared.buckets.len())
            .field("rate", &self.shared.total.value())
            .field("running", &self.running.load(Ordering::Relaxed))
            .finish()
    }
}

/// Configuration structure for creating a [`RateCounter`].
///
/// Deserializes from e.g. `{"interval": {"secs": 60, "nanos": 0}}`;
/// `resolution` defaults to [`DEFAULT_RESOLUTION`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateCounterConfig {
    /// Length of the trailing window.
    pub interval: Duration,
    /// Number of buckets the window is split into.
    #[serde(default = "default_resolution")]
    pub resolution: usize,
}

fn default_resolution() -> usize {
    DEFAULT_RESOLUTION
}

impl RateCounterConfig {
    /// Creates a configuration with the default resolution.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            resolution: DEFAULT_RESOLUTION,
        }
    }

    /// Builds a counter governed by `signal`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidResolution`] if `resolution` is zero.
    ///
    /// # Example
    ///
    /// ```rust
    /// use std::time::Duration;
    /// use rate_counter_core::{CancellationToken, RateCounterConfig};
    ///
    /// let config = RateCounterConfig {
    ///     interval: Duration::from_secs(60),
    ///     resolution: 60,
    /// };
    /// let counter = config.build(CancellationToken::new()).unwrap();
    /// assert_eq!(counter.tick_period(), Duration::from_secs(1));
    /// ```
    pub fn build<S>(self, signal: S) -> ConfigResult<RateCounter<S>>
    where
        S: Liveness + Clone,
    {
        if self.resolution < 1 {
            return Err(ConfigError::InvalidResolution {
                resolution: self.resolution,
            });
        }

        Ok(RateCounter {
            interval: self.interval,
            shared: Arc::new(Shared::new(self.resolution)),
            running: Arc::new(AtomicBool::new(false)),
            signal,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_period_divides_interval() {
        assert_eq!(tick_period(Duration::from_millis(50), 20), Duration::from_micros(2500));
        assert_eq!(tick_period(Duration::from_secs(1), 1), Duration::from_secs(1));
    }

    #[test]
    fn tick_period_is_floored() {
        assert_eq!(tick_period(Duration::ZERO, 20), MIN_TICK_PERIOD);
        assert_eq!(tick_period(Duration::from_millis(10), 100), MIN_TICK_PERIOD);
    }

    #[test]
    fn rotate_expires_next_bucket() {
        let shared = Shared::new(3);
        shared.record(4);
        assert_eq!(shared.rotate(), 0);
        shared.record(1);
        assert_eq!(shared.total.value(), 5);

        // Index 2, then back round to 0 which holds the first record.
        assert_eq!(shared.rotate(), 0);
        assert_eq!(shared.rotate(), 4);
        assert_eq!(shared.total.value(), 1);
        assert_eq!(shared.current.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn rotate_with_single_bucket_clears_everything() {
        let shared = Shared::new(1);
        shared.record(3);
        shared.record(-1);
        assert_eq!(shared.rotate(), 2);
        assert_eq!(shared.total.value(), 0);
        assert_eq!(shared.current.load(Ordering::Relaxed), 0);
    }
}
