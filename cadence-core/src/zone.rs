//! Timezone specification and resolution.
//!
//! Calendar-aligned schedules draw their boundaries in a timezone. A
//! [`ZoneSpec`] is the serializable configuration (`utc`, `local`, or an IANA
//! name); resolving it yields a [`Zone`] that can convert between UTC instants
//! and zone-local wall time. Unknown names fail at resolution, which happens
//! while a cache is built, never per call.

use std::fmt;

use chrono::{DateTime, Duration, Local, LocalResult, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{CadenceError, Result};

/// Where calendar boundaries are drawn.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneSpec {
    /// Coordinated Universal Time.
    #[default]
    Utc,
    /// The host system's timezone.
    Local,
    /// An IANA timezone name, e.g. `America/New_York`.
    Named(String),
}

impl ZoneSpec {
    /// Creates a spec for a named IANA timezone.
    ///
    /// The name is validated by [`ZoneSpec::resolve`], not here.
    pub fn named(name: impl Into<String>) -> Self {
        ZoneSpec::Named(name.into())
    }

    /// Parses a spec from user input.
    ///
    /// `"utc"` and `"local"` (case-insensitive) map to the corresponding
    /// variants; anything else is treated as an IANA name.
    pub fn parse(s: &str) -> Self {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("utc") {
            ZoneSpec::Utc
        } else if trimmed.eq_ignore_ascii_case("local") {
            ZoneSpec::Local
        } else {
            ZoneSpec::Named(trimmed.to_string())
        }
    }

    /// Resolves this zone specification against the IANA database.
    ///
    /// Fails with [`CadenceError::UnknownTimezone`] for names the database
    /// does not contain.
    pub fn resolve(&self) -> Result<Zone> {
        match self {
            ZoneSpec::Utc => Ok(Zone::Utc),
            ZoneSpec::Local => Ok(Zone::Local),
            ZoneSpec::Named(name) => name
                .parse::<Tz>()
                .map(Zone::Named)
                .map_err(|_| CadenceError::UnknownTimezone(name.clone())),
        }
    }
}

impl fmt::Display for ZoneSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ZoneSpec::Utc => write!(f, "UTC"),
            ZoneSpec::Local => write!(f, "local"),
            ZoneSpec::Named(name) => write!(f, "{}", name),
        }
    }
}

/// A resolved timezone, ready for instant/wall-time conversion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Zone {
    /// Coordinated Universal Time.
    Utc,
    /// The host system's timezone.
    Local,
    /// A resolved IANA timezone.
    Named(Tz),
}

impl Zone {
    /// Converts a UTC instant to this zone's wall time.
    pub fn local_time(&self, instant: DateTime<Utc>) -> NaiveDateTime {
        match self {
            Zone::Utc => instant.naive_utc(),
            Zone::Local => instant.with_timezone(&Local).naive_local(),
            Zone::Named(tz) => instant.with_timezone(tz).naive_local(),
        }
    }

    /// Converts zone-local wall time back to a UTC instant.
    ///
    /// An ambiguous wall time (fall-back overlap) resolves to the earliest
    /// instant; a nonexistent wall time (spring-forward gap) resolves to the
    /// first valid instant after the gap.
    pub fn from_local(&self, local: NaiveDateTime) -> DateTime<Utc> {
        match self {
            Zone::Utc => Utc.from_utc_datetime(&local),
            Zone::Local => resolve_local(&Local, local),
            Zone::Named(tz) => resolve_local(tz, local),
        }
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Zone::Utc => write!(f, "UTC"),
            Zone::Local => write!(f, "local"),
            Zone::Named(tz) => write!(f, "{}", tz.name()),
        }
    }
}

fn resolve_local<Z: TimeZone>(zone: &Z, local: NaiveDateTime) -> DateTime<Utc> {
    match zone.from_local_datetime(&local) {
        LocalResult::Single(t) => t.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        LocalResult::None => {
            // Spring-forward gap. Gaps are offset jumps of at most a few
            // hours, always whole multiples of 15 minutes.
            let mut probe = local;
            for _ in 0..12 {
                probe += Duration::minutes(15);
                match zone.from_local_datetime(&probe) {
                    LocalResult::Single(t) | LocalResult::Ambiguous(t, _) => {
                        return t.with_timezone(&Utc);
                    }
                    LocalResult::None => continue,
                }
            }
            Utc.from_utc_datetime(&local)
        }
    }
}
