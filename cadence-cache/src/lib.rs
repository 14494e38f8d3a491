//! Windowed memoization for expensive functions.
//!
//! Wrap a function with a [`WindowedCache`] and a
//! [`Schedule`](cadence_schedule::Schedule): results are reused until the
//! wall-clock window rolls over ("recompute once per minute", "once per
//! calendar day in New York") rather than for a TTL counted from the call.
//! Keys are derived from the call's arguments; named arguments compare
//! independent of supply order. In-process only.

mod cache;
mod key;
mod store;

pub use cache::{CacheBuilder, CallError, WindowedCache};
pub use key::{ArgValue, CallArgs, CallKey};
pub use store::CacheStats;
