//! Window identifiers.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifies one validity window under a schedule.
///
/// Every instant maps to exactly one window; windows for a given schedule
/// are totally ordered and non-decreasing as time advances. Two calls in the
/// same window are cache-equivalent with respect to time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Window {
    /// Interval schedules: index of the window counted from the origin.
    /// Negative for instants before the origin.
    Index(i64),
    /// Calendar and cron schedules: UTC instant the current period began.
    StartingAt(DateTime<Utc>),
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Window::Index(n) => write!(f, "window[{}]", n),
            Window::StartingAt(t) => write!(f, "window[{}]", t.to_rfc3339()),
        }
    }
}
