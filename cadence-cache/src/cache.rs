//! The windowed function cache: schedule, key, and store composed.

use std::convert::Infallible;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use cadence_core::{CacheConfig, CadenceError, Clock, Result, SystemClock};
use cadence_schedule::{Evaluator, Schedule, Window};

use crate::key::CallArgs;
use crate::store::{CacheStats, Slot, WindowStore};

/// Error returned by [`WindowedCache::try_call`].
#[derive(Debug, Error)]
pub enum CallError<E> {
    /// Key derivation failed under the fail-closed policy; the wrapped
    /// function was not invoked.
    #[error("key derivation failed: {0}")]
    Key(CadenceError),
    /// The wrapped function failed, either just now or replayed from the
    /// cache when error caching is enabled.
    #[error("wrapped call failed: {0}")]
    Upstream(E),
}

/// Builds a [`WindowedCache`] from a schedule and configuration.
///
/// Building compiles and validates the schedule, so a bad interval, unknown
/// timezone, or malformed cron expression is rejected here rather than on
/// some later call.
pub struct CacheBuilder {
    schedule: Schedule,
    config: CacheConfig,
    clock: Arc<dyn Clock>,
}

impl CacheBuilder {
    /// Starts a builder with default configuration and the system clock.
    pub fn new(schedule: Schedule) -> Self {
        Self {
            schedule,
            config: CacheConfig::from_env(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: CacheConfig) -> Self {
        self.config = config;
        self
    }

    /// Replay a wrapped function's error within the same window.
    pub fn cache_errors(mut self, yes: bool) -> Self {
        self.config.cache_errors = yes;
        self
    }

    /// On key derivation failure, run the function uncached instead of
    /// propagating the error.
    pub fn fail_open_on_unhashable(mut self, yes: bool) -> Self {
        self.config.fail_open_on_unhashable = yes;
        self
    }

    /// Bounds the number of distinct keys retained (0 = unbounded).
    pub fn max_entries(mut self, n: usize) -> Self {
        self.config.max_entries = n;
        self
    }

    /// Bypasses caching entirely.
    pub fn disabled(mut self, yes: bool) -> Self {
        self.config.disabled = yes;
        self
    }

    /// Evaluates schedules against the given clock instead of the system
    /// clock. Intended for tests.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Compiles the schedule and builds the cache.
    pub fn build<T, E>(self) -> Result<WindowedCache<T, E>> {
        let evaluator = Evaluator::compile(&self.schedule)?;
        Ok(WindowedCache {
            evaluator,
            store: WindowStore::new(self.config.max_entries),
            config: self.config,
            clock: self.clock,
        })
    }
}

/// A memoization cache that expires entries on wall-clock window rollover.
///
/// Wraps calls to one function: each call is keyed by its arguments and the
/// current [`Window`]; within a window the stored result is returned without
/// invoking the function again.
///
/// `T` is the cached value type. `E` is the wrapped function's error type
/// for [`try_call`](Self::try_call); infallible functions use
/// [`call`](Self::call) and can leave it defaulted.
///
/// ```
/// use std::time::Duration;
/// use cadence_cache::{CacheBuilder, CallArgs};
/// use cadence_schedule::Schedule;
///
/// let cache = CacheBuilder::new(Schedule::every(Duration::from_secs(60)))
///     .build::<u64, std::convert::Infallible>()
///     .unwrap();
///
/// let args = CallArgs::new().arg(2u64).named("verbose", false);
/// assert_eq!(cache.call(&args, || 40 + 2).unwrap(), 42);
/// // Within the same minute the closure is not invoked again.
/// assert_eq!(cache.call(&args, || unreachable!()).unwrap(), 42);
/// ```
pub struct WindowedCache<T, E = Infallible> {
    evaluator: Evaluator,
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    store: WindowStore<T, E>,
}

impl<T: Clone, E: Clone> WindowedCache<T, E> {
    /// Starts a [`CacheBuilder`] for the given schedule.
    pub fn builder(schedule: Schedule) -> CacheBuilder {
        CacheBuilder::new(schedule)
    }

    /// Calls through the cache.
    ///
    /// On a fresh entry the stored outcome is returned (errors only when
    /// error caching is enabled). Otherwise `f` runs with the slot lock
    /// held, so concurrent callers with the same key block and then observe
    /// the stored result: at most one execution per (key, window).
    pub fn try_call<F>(&self, args: &CallArgs, f: F) -> std::result::Result<T, CallError<E>>
    where
        F: FnOnce() -> std::result::Result<T, E>,
    {
        if self.config.disabled {
            return f().map_err(CallError::Upstream);
        }

        let key = match args.key() {
            Ok(key) => key,
            Err(err) if self.config.fail_open_on_unhashable => {
                warn!(error = %err, "key derivation failed, bypassing cache");
                return f().map_err(CallError::Upstream);
            }
            Err(err) => return Err(CallError::Key(err)),
        };

        let window = self.evaluator.window_at(self.clock.now_utc());
        let cell = self.store.cell(&key, window);
        let mut guard = cell.lock();

        match guard.as_ref() {
            Some(slot) if slot.is_fresh(window) => match &slot.outcome {
                Ok(value) => {
                    debug!(%window, "hit");
                    return Ok(value.clone());
                }
                Err(err) => {
                    debug!(%window, "hit, replaying cached error");
                    return Err(CallError::Upstream(err.clone()));
                }
            },
            Some(_) => debug!(%window, "stale, recomputing"),
            None => debug!(%window, "miss, computing"),
        }

        match f() {
            Ok(value) => {
                *guard = Some(Slot::new(window, Ok(value.clone())));
                Ok(value)
            }
            Err(err) => {
                if self.config.cache_errors {
                    *guard = Some(Slot::new(window, Err(err.clone())));
                }
                Err(CallError::Upstream(err))
            }
        }
    }

    /// Returns the cached value for the given arguments if a fresh one
    /// exists, without invoking anything. Stale entries and cached errors
    /// report as `None`.
    pub fn peek(&self, args: &CallArgs) -> Result<Option<T>> {
        let key = args.key()?;
        let window = self.current_window();
        Ok(self
            .store
            .get(&key)
            .and_then(|(w, outcome)| if w == window { outcome.ok() } else { None }))
    }

    /// Stores a value for the given arguments under the current window,
    /// overwriting any prior entry. Useful for priming a cache.
    pub fn insert(&self, args: &CallArgs, value: T) -> Result<()> {
        let key = args.key()?;
        self.store.put(&key, self.current_window(), Ok(value));
        Ok(())
    }

    /// The window the cache considers current.
    pub fn current_window(&self) -> Window {
        self.evaluator.window_at(self.clock.now_utc())
    }

    /// Statistics relative to the current window.
    pub fn stats(&self) -> CacheStats {
        self.store.stats(self.current_window())
    }

    /// Drops the entry for the given arguments. Returns true if one existed.
    pub fn remove(&self, args: &CallArgs) -> Result<bool> {
        Ok(self.store.remove(&args.key()?))
    }

    /// Drops every entry.
    pub fn clear(&self) {
        self.store.clear();
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Returns true if no keys are tracked.
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

impl<T: Clone> WindowedCache<T, Infallible> {
    /// Calls an infallible function through the cache.
    ///
    /// The only possible error is key derivation under the fail-closed
    /// policy.
    pub fn call<F>(&self, args: &CallArgs, f: F) -> Result<T>
    where
        F: FnOnce() -> T,
    {
        match self.try_call(args, || Ok(f())) {
            Ok(value) => Ok(value),
            Err(CallError::Key(err)) => Err(err),
            Err(CallError::Upstream(never)) => match never {},
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Barrier;

    use chrono::{Duration, TimeZone, Utc};

    use cadence_core::ManualClock;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).single().unwrap()
    }

    /// A 60-second cache on a manual clock, plus the clock handle.
    fn minute_cache() -> (WindowedCache<u32>, ManualClock) {
        let clock = ManualClock::at(utc(2024, 1, 1, 0, 0, 0));
        let cache = CacheBuilder::new(Schedule::every_seconds(60))
            .clock(Arc::new(clock.clone()))
            .build()
            .unwrap();
        (cache, clock)
    }

    #[test]
    fn test_hit_within_window() {
        let (cache, clock) = minute_cache();
        let calls = AtomicU32::new(0);
        let args = CallArgs::new().arg(7i64);
        let f = || calls.fetch_add(1, Ordering::SeqCst) + 1;

        let first = cache.call(&args, f).unwrap();
        clock.advance(Duration::seconds(1));
        let second = cache.call(&args, f).unwrap();

        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_rollover_recomputes() {
        let (cache, clock) = minute_cache();
        let calls = AtomicU32::new(0);
        let args = CallArgs::new().arg(7i64);
        let f = || calls.fetch_add(1, Ordering::SeqCst) + 1;

        let first = cache.call(&args, f).unwrap();
        clock.advance(Duration::seconds(61));
        let second = cache.call(&args, f).unwrap();

        assert_ne!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_daily_utc_rollover() {
        let clock = ManualClock::at(utc(2024, 1, 1, 23, 59, 59));
        let cache: WindowedCache<u32> = CacheBuilder::new(Schedule::daily())
            .clock(Arc::new(clock.clone()))
            .build()
            .unwrap();
        let calls = AtomicU32::new(0);
        let args = CallArgs::new();
        let f = || calls.fetch_add(1, Ordering::SeqCst) + 1;

        cache.call(&args, f).unwrap();
        clock.set(utc(2024, 1, 2, 0, 0, 1));
        cache.call(&args, f).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_keyword_order_hits_same_entry() {
        let (cache, _clock) = minute_cache();
        let calls = AtomicU32::new(0);
        let f = || calls.fetch_add(1, Ordering::SeqCst) + 1;

        let a = CallArgs::new().named("a", 1i64).named("b", 2i64);
        let b = CallArgs::new().named("b", 2i64).named("a", 1i64);

        assert_eq!(cache.call(&a, f).unwrap(), cache.call(&b, f).unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_distinct_args_distinct_entries() {
        let (cache, _clock) = minute_cache();
        let args_a = CallArgs::new().arg(1i64);
        let args_b = CallArgs::new().arg(2i64);

        assert_eq!(cache.call(&args_a, || 10).unwrap(), 10);
        assert_eq!(cache.call(&args_b, || 20).unwrap(), 20);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_unhashable_fail_closed_by_default() {
        let (cache, _clock) = minute_cache();
        let calls = AtomicU32::new(0);
        let args = CallArgs::new().arg(f64::NAN);

        let err = cache
            .call(&args, || calls.fetch_add(1, Ordering::SeqCst))
            .unwrap_err();
        assert!(matches!(err, CadenceError::UnhashableArgument { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_unhashable_fail_open_runs_uncached() {
        let clock = ManualClock::at(utc(2024, 1, 1, 0, 0, 0));
        let cache: WindowedCache<u32> = CacheBuilder::new(Schedule::every_seconds(60))
            .clock(Arc::new(clock))
            .fail_open_on_unhashable(true)
            .build()
            .unwrap();
        let calls = AtomicU32::new(0);
        let args = CallArgs::new().arg(f64::NAN);
        let f = || calls.fetch_add(1, Ordering::SeqCst) + 1;

        assert_eq!(cache.call(&args, f).unwrap(), 1);
        assert_eq!(cache.call(&args, f).unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_errors_not_cached_by_default() {
        let clock = ManualClock::at(utc(2024, 1, 1, 0, 0, 0));
        let cache: WindowedCache<u32, String> = CacheBuilder::new(Schedule::every_seconds(60))
            .clock(Arc::new(clock))
            .build()
            .unwrap();
        let calls = AtomicU32::new(0);
        let args = CallArgs::new();
        let f = || {
            calls.fetch_add(1, Ordering::SeqCst);
            Err("boom".to_string())
        };

        assert!(matches!(
            cache.try_call(&args, f),
            Err(CallError::Upstream(_))
        ));
        assert!(matches!(
            cache.try_call(&args, f),
            Err(CallError::Upstream(_))
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_error_replay_when_enabled() {
        let clock = ManualClock::at(utc(2024, 1, 1, 0, 0, 0));
        let cache: WindowedCache<u32, String> = CacheBuilder::new(Schedule::every_seconds(60))
            .clock(Arc::new(clock.clone()))
            .cache_errors(true)
            .build()
            .unwrap();
        let calls = AtomicU32::new(0);
        let args = CallArgs::new();
        let f = || {
            calls.fetch_add(1, Ordering::SeqCst);
            Err("boom".to_string())
        };

        assert!(cache.try_call(&args, f).is_err());
        let replayed = cache.try_call(&args, f).unwrap_err();
        assert!(matches!(replayed, CallError::Upstream(ref e) if e == "boom"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // The stored error expires with its window like any entry.
        clock.advance(Duration::seconds(61));
        assert!(cache.try_call(&args, f).is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_success_after_error_overwrites() {
        let clock = ManualClock::at(utc(2024, 1, 1, 0, 0, 0));
        let cache: WindowedCache<u32, String> = CacheBuilder::new(Schedule::every_seconds(60))
            .clock(Arc::new(clock.clone()))
            .cache_errors(true)
            .build()
            .unwrap();
        let args = CallArgs::new();

        assert!(cache.try_call(&args, || Err("boom".into())).is_err());
        clock.advance(Duration::seconds(61));
        assert_eq!(cache.try_call(&args, || Ok(5)).unwrap(), 5);
        assert_eq!(cache.try_call(&args, || Ok(99)).unwrap(), 5);
    }

    #[test]
    fn test_disabled_bypasses_cache() {
        let clock = ManualClock::at(utc(2024, 1, 1, 0, 0, 0));
        let cache: WindowedCache<u32> = CacheBuilder::new(Schedule::every_seconds(60))
            .clock(Arc::new(clock))
            .disabled(true)
            .build()
            .unwrap();
        let calls = AtomicU32::new(0);
        let args = CallArgs::new();
        let f = || calls.fetch_add(1, Ordering::SeqCst) + 1;

        assert_eq!(cache.call(&args, f).unwrap(), 1);
        assert_eq!(cache.call(&args, f).unwrap(), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_remove_and_clear() {
        let (cache, _clock) = minute_cache();
        let args = CallArgs::new().arg(1i64);

        cache.call(&args, || 1).unwrap();
        assert!(cache.remove(&args).unwrap());
        assert!(!cache.remove(&args).unwrap());

        cache.call(&args, || 2).unwrap();
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_stats_track_freshness() {
        let (cache, clock) = minute_cache();
        cache.call(&CallArgs::new().arg(1i64), || 1).unwrap();
        clock.advance(Duration::seconds(61));
        cache.call(&CallArgs::new().arg(2i64), || 2).unwrap();

        let stats = cache.stats();
        assert_eq!(stats.total_entries, 2);
        assert_eq!(stats.fresh_entries, 1);
        assert_eq!(stats.stale_entries, 1);
    }

    #[test]
    fn test_at_most_one_execution_per_window_under_contention() {
        let clock = ManualClock::at(utc(2024, 1, 1, 0, 0, 0));
        let cache: Arc<WindowedCache<u32>> = Arc::new(
            CacheBuilder::new(Schedule::every_hours(1))
                .clock(Arc::new(clock))
                .build()
                .unwrap(),
        );
        let calls = Arc::new(AtomicU32::new(0));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                let calls = calls.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    let args = CallArgs::new().arg("shared");
                    cache
                        .call(&args, || {
                            calls.fetch_add(1, Ordering::SeqCst);
                            std::thread::sleep(std::time::Duration::from_millis(10));
                            7
                        })
                        .unwrap()
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), 7);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_peek_sees_fresh_entries_only() {
        let (cache, clock) = minute_cache();
        let args = CallArgs::new().arg(1i64);

        assert_eq!(cache.peek(&args).unwrap(), None);
        cache.call(&args, || 5).unwrap();
        assert_eq!(cache.peek(&args).unwrap(), Some(5));

        clock.advance(Duration::seconds(61));
        assert_eq!(cache.peek(&args).unwrap(), None);
    }

    #[test]
    fn test_insert_primes_the_window() {
        let (cache, _clock) = minute_cache();
        let args = CallArgs::new().arg(1i64);

        cache.insert(&args, 9).unwrap();
        assert_eq!(cache.call(&args, || unreachable!()).unwrap(), 9);
    }

    #[test]
    fn test_current_window_advances_with_clock() {
        let (cache, clock) = minute_cache();
        let w0 = cache.current_window();
        clock.advance(Duration::seconds(59));
        assert_eq!(cache.current_window(), w0);
        clock.advance(Duration::seconds(2));
        assert_ne!(cache.current_window(), w0);
    }
}
