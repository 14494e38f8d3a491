//! Schedule configuration: how wall-clock time is partitioned into windows.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use cadence_core::{ZoneSpec, SECS_PER_HOUR, SECS_PER_MINUTE};

/// Alignment for interval schedules.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntervalAlignment {
    /// Windows counted from the Unix epoch, so boundaries land on
    /// top-of-unit instants ("every minute" rolls over at :00).
    #[default]
    Aligned,
    /// Windows counted from the first evaluation of the owning cache.
    FirstUse,
}

/// Calendar period for boundary-aligned schedules.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalendarPeriod {
    /// Top of the minute.
    Minute,
    /// Top of the hour.
    Hour,
    /// Midnight.
    Day,
    /// Midnight on Monday (ISO week).
    Week,
    /// Midnight on the first of the month.
    Month,
    /// Midnight on January 1st.
    Year,
}

/// A recomputation schedule.
///
/// Construct one with [`Schedule::every`] for fixed intervals,
/// [`Schedule::calendar`] (or the `minutely()`..`yearly()` shorthands) for
/// calendar alignment, or [`Schedule::cron`] for cron expressions. Calendar
/// and cron schedules default to UTC; use [`Schedule::in_zone`] to align
/// boundaries elsewhere.
///
/// Validation (positive interval, known timezone, parseable cron expression)
/// happens when the schedule is compiled into an
/// [`Evaluator`](crate::Evaluator), i.e. when a cache is built.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub(crate) kind: ScheduleKind,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum ScheduleKind {
    Every {
        interval: Duration,
        alignment: IntervalAlignment,
    },
    Calendar {
        period: CalendarPeriod,
        zone: ZoneSpec,
    },
    Cron {
        expr: String,
        zone: ZoneSpec,
    },
}

impl Schedule {
    /// Recompute every `interval`, epoch-aligned.
    pub fn every(interval: Duration) -> Self {
        Self::every_with(interval, IntervalAlignment::default())
    }

    /// Recompute every `interval` with an explicit alignment.
    pub fn every_with(interval: Duration, alignment: IntervalAlignment) -> Self {
        Self {
            kind: ScheduleKind::Every {
                interval,
                alignment,
            },
        }
    }

    /// Recompute every `n` seconds.
    pub fn every_seconds(n: u64) -> Self {
        Self::every(Duration::from_secs(n))
    }

    /// Recompute every `n` minutes.
    pub fn every_minutes(n: u64) -> Self {
        Self::every(Duration::from_secs(n * SECS_PER_MINUTE))
    }

    /// Recompute every `n` hours.
    pub fn every_hours(n: u64) -> Self {
        Self::every(Duration::from_secs(n * SECS_PER_HOUR))
    }

    /// Recompute when a calendar period rolls over, in UTC by default.
    pub fn calendar(period: CalendarPeriod) -> Self {
        Self {
            kind: ScheduleKind::Calendar {
                period,
                zone: ZoneSpec::default(),
            },
        }
    }

    /// Recompute at the top of every minute.
    pub fn minutely() -> Self {
        Self::calendar(CalendarPeriod::Minute)
    }

    /// Recompute at the top of every hour.
    pub fn hourly() -> Self {
        Self::calendar(CalendarPeriod::Hour)
    }

    /// Recompute at midnight.
    pub fn daily() -> Self {
        Self::calendar(CalendarPeriod::Day)
    }

    /// Recompute at midnight on Monday.
    pub fn weekly() -> Self {
        Self::calendar(CalendarPeriod::Week)
    }

    /// Recompute at midnight on the first of the month.
    pub fn monthly() -> Self {
        Self::calendar(CalendarPeriod::Month)
    }

    /// Recompute at midnight on January 1st.
    pub fn yearly() -> Self {
        Self::calendar(CalendarPeriod::Year)
    }

    /// Recompute on the ticks of a cron expression, in UTC by default.
    ///
    /// Standard 5-field expressions are accepted alongside the 6-field
    /// (with seconds) form.
    pub fn cron(expr: impl Into<String>) -> Self {
        Self {
            kind: ScheduleKind::Cron {
                expr: expr.into(),
                zone: ZoneSpec::default(),
            },
        }
    }

    /// Draws calendar or cron boundaries in the given zone.
    ///
    /// Interval schedules have no calendar boundaries; on those this is a
    /// no-op.
    pub fn in_zone(mut self, zone: ZoneSpec) -> Self {
        match &mut self.kind {
            ScheduleKind::Calendar { zone: z, .. } | ScheduleKind::Cron { zone: z, .. } => {
                *z = zone;
            }
            ScheduleKind::Every { .. } => {}
        }
        self
    }
}
