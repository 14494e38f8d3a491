//! Schedule model and window evaluation for the cadence windowed cache.
//!
//! A [`Schedule`] describes how wall-clock time is partitioned: fixed
//! intervals, calendar periods in a timezone, or cron expressions. Compiling
//! a schedule yields an [`Evaluator`] that maps any instant to the current
//! [`Window`], the opaque identifier two calls must share to be
//! cache-equivalent in time.

mod eval;
mod schedule;
mod window;

pub use eval::Evaluator;
pub use schedule::{CalendarPeriod, IntervalAlignment, Schedule};
pub use window::Window;
