//! Compiled schedule evaluation: instant to current window.

use chrono::{DateTime, Datelike, Duration, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike, Utc};
use cron::Schedule as CronSchedule;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use cadence_core::{CadenceError, Result, Zone};

use crate::schedule::{CalendarPeriod, IntervalAlignment, Schedule, ScheduleKind};
use crate::window::Window;

/// Lookback horizons for finding the most recent cron tick, in days.
/// Widened until a tick is found; a frequent cron resolves in the first scan.
const CRON_LOOKBACK_DAYS: [i64; 5] = [1, 35, 366, 1462, 14610];

/// A schedule compiled for evaluation.
///
/// Compiling validates the schedule (positive interval, known timezone,
/// parseable cron expression), so configuration errors surface when a cache
/// is built. After that, [`Evaluator::window_at`] is infallible: every
/// instant maps to exactly one [`Window`], deterministically.
#[derive(Debug)]
pub struct Evaluator {
    kind: EvalKind,
}

#[derive(Debug)]
enum EvalKind {
    Every {
        interval_ns: i64,
        origin: Origin,
    },
    Calendar {
        period: CalendarPeriod,
        zone: Zone,
    },
    Cron {
        schedule: CronSchedule,
        zone: Zone,
        state: Mutex<Option<CronState>>,
    },
}

#[derive(Debug)]
enum Origin {
    Epoch,
    FirstUse(OnceCell<DateTime<Utc>>),
}

/// Cached bounds of the current cron window, so steady-state evaluation is a
/// single comparison instead of a tick scan.
#[derive(Debug)]
struct CronState {
    start: DateTime<Utc>,
    next: DateTime<Utc>,
}

impl Evaluator {
    /// Compiles a schedule, validating its configuration.
    pub fn compile(schedule: &Schedule) -> Result<Self> {
        let kind = match &schedule.kind {
            ScheduleKind::Every {
                interval,
                alignment,
            } => {
                if interval.is_zero() {
                    return Err(CadenceError::InvalidInterval(
                        "interval must be positive".into(),
                    ));
                }
                let interval_ns = i64::try_from(interval.as_nanos()).map_err(|_| {
                    CadenceError::InvalidInterval(format!("interval {:?} is too large", interval))
                })?;
                let origin = match alignment {
                    IntervalAlignment::Aligned => Origin::Epoch,
                    IntervalAlignment::FirstUse => Origin::FirstUse(OnceCell::new()),
                };
                EvalKind::Every {
                    interval_ns,
                    origin,
                }
            }
            ScheduleKind::Calendar { period, zone } => EvalKind::Calendar {
                period: *period,
                zone: zone.resolve()?,
            },
            ScheduleKind::Cron { expr, zone } => {
                let zone = zone.resolve()?;
                let schedule = normalize_cron(expr).parse::<CronSchedule>().map_err(|e| {
                    CadenceError::InvalidCron {
                        expr: expr.clone(),
                        reason: e.to_string(),
                    }
                })?;
                EvalKind::Cron {
                    schedule,
                    zone,
                    state: Mutex::new(None),
                }
            }
        };
        Ok(Self { kind })
    }

    /// Returns the window containing `now`.
    pub fn window_at(&self, now: DateTime<Utc>) -> Window {
        match &self.kind {
            EvalKind::Every {
                interval_ns,
                origin,
            } => {
                let origin = match origin {
                    Origin::Epoch => DateTime::UNIX_EPOCH,
                    Origin::FirstUse(cell) => *cell.get_or_init(|| now),
                };
                let elapsed = (now - origin).num_nanoseconds().unwrap_or(i64::MAX);
                Window::Index(elapsed.div_euclid(*interval_ns))
            }
            EvalKind::Calendar { period, zone } => {
                let start = period_start(*period, zone.local_time(now));
                Window::StartingAt(zone.from_local(start))
            }
            EvalKind::Cron {
                schedule,
                zone,
                state,
            } => cron_window(schedule, *zone, state, now),
        }
    }
}

/// Normalize a 5-field cron expression to 6-field by prepending seconds.
///
/// The `cron` crate requires `sec min hour day-of-month month day-of-week`;
/// standard cron omits the seconds field.
fn normalize_cron(expr: &str) -> String {
    let trimmed = expr.trim();
    if trimmed.split_whitespace().count() == 5 {
        format!("0 {}", trimmed)
    } else {
        trimmed.to_string()
    }
}

/// Truncates zone-local wall time to the start of the enclosing period.
fn period_start(period: CalendarPeriod, local: NaiveDateTime) -> NaiveDateTime {
    let time = local.time();
    let date = local.date();
    match period {
        CalendarPeriod::Minute => {
            local
                - Duration::nanoseconds(i64::from(time.nanosecond()))
                - Duration::seconds(i64::from(time.second()))
        }
        CalendarPeriod::Hour => {
            local
                - Duration::nanoseconds(i64::from(time.nanosecond()))
                - Duration::seconds(i64::from(time.second()))
                - Duration::minutes(i64::from(time.minute()))
        }
        CalendarPeriod::Day => date.and_time(NaiveTime::MIN),
        CalendarPeriod::Week => {
            let monday = date - Duration::days(i64::from(date.weekday().num_days_from_monday()));
            monday.and_time(NaiveTime::MIN)
        }
        CalendarPeriod::Month => date.with_day(1).unwrap_or(date).and_time(NaiveTime::MIN),
        CalendarPeriod::Year => NaiveDate::from_ymd_opt(date.year(), 1, 1)
            .unwrap_or(date)
            .and_time(NaiveTime::MIN),
    }
}

fn cron_window(
    schedule: &CronSchedule,
    zone: Zone,
    state: &Mutex<Option<CronState>>,
    now: DateTime<Utc>,
) -> Window {
    let mut guard = state.lock();
    if let Some(s) = guard.as_ref() {
        if now >= s.start && now < s.next {
            return Window::StartingAt(s.start);
        }
    }

    let (last, next) = match zone {
        Zone::Utc => cron_bounds(schedule, Utc, now),
        Zone::Local => cron_bounds(schedule, Local, now),
        Zone::Named(tz) => cron_bounds(schedule, tz, now),
    };
    // No tick on record before `now` means the schedule has never fired;
    // everything before the first tick shares one pre-schedule window.
    let start = last.unwrap_or(DateTime::<Utc>::MIN_UTC);
    let next = next.unwrap_or(DateTime::<Utc>::MAX_UTC);
    *guard = Some(CronState { start, next });
    Window::StartingAt(start)
}

/// The most recent tick at or before `now` and the first tick after it,
/// both evaluated in `zone` and reported as UTC instants.
fn cron_bounds<Z: TimeZone>(
    schedule: &CronSchedule,
    zone: Z,
    now: DateTime<Utc>,
) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
    let now_z = now.with_timezone(&zone);
    let next = schedule
        .after(&now_z)
        .next()
        .map(|t| t.with_timezone(&Utc));

    let mut last = None;
    for days in CRON_LOOKBACK_DAYS {
        let from = now_z.clone() - Duration::days(days);
        for tick in schedule.after(&from) {
            if tick > now_z {
                break;
            }
            last = Some(tick.with_timezone(&Utc));
        }
        if last.is_some() {
            break;
        }
    }
    (last, next)
}
