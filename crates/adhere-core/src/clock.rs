//! Wall-clock time handling: 12/24-hour input normalisation and
//! DST-correct local/UTC conversion through the IANA zone database.
//!
//! Everything else in this crate goes through these functions; no other
//! module touches offsets directly.

use std::{fmt, str::FromStr};

use chrono::{
  DateTime, Duration, LocalResult, NaiveDate, NaiveTime, TimeZone, Timelike,
  Utc,
};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{Error, Result};

// ─── TimeOfDay ───────────────────────────────────────────────────────────────

/// A minute-granular local wall-clock time.
///
/// Parses 24-hour input (`"08:00"`, `"8:00"`) as well as 12-hour input
/// (`"8:00 AM"`, `"12:15 pm"`, case-insensitive; 12 AM is midnight, 12 PM
/// is noon). Always displays zero-padded 24-hour `"HH:MM"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeOfDay(NaiveTime);

impl TimeOfDay {
  pub fn new(hour: u32, minute: u32) -> Option<Self> {
    NaiveTime::from_hms_opt(hour, minute, 0).map(Self)
  }

  pub fn hour(&self) -> u32 { self.0.hour() }

  pub fn minute(&self) -> u32 { self.0.minute() }

  fn as_naive(&self) -> NaiveTime { self.0 }
}

impl FromStr for TimeOfDay {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    let trimmed = s.trim();
    if let Ok(t) = NaiveTime::parse_from_str(trimmed, "%H:%M") {
      return Ok(Self(t));
    }
    // 12-hour clock. Uppercase the meridiem so "am"/"pm" match too.
    let upper = trimmed.to_uppercase();
    if let Ok(t) = NaiveTime::parse_from_str(&upper, "%I:%M %p") {
      return Ok(Self(t));
    }
    Err(Error::InvalidTimeFormat(s.to_string()))
  }
}

impl fmt::Display for TimeOfDay {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{:02}:{:02}", self.hour(), self.minute())
  }
}

impl Serialize for TimeOfDay {
  fn serialize<S: Serializer>(
    &self,
    serializer: S,
  ) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(self)
  }
}

impl<'de> Deserialize<'de> for TimeOfDay {
  fn deserialize<D: Deserializer<'de>>(
    deserializer: D,
  ) -> std::result::Result<Self, D::Error> {
    let s = String::deserialize(deserializer)?;
    s.parse().map_err(serde::de::Error::custom)
  }
}

// ─── Zone resolution ─────────────────────────────────────────────────────────

/// Look up an IANA zone name (e.g. `"America/New_York"`).
pub fn parse_timezone(name: &str) -> Result<Tz> {
  name
    .parse::<Tz>()
    .map_err(|_| Error::UnknownTimezone(name.to_string()))
}

/// Compose a zoned local date-time and convert it to UTC.
///
/// A fall-back ambiguity resolves to the earlier offset. A spring-forward
/// gap slides forward minute by minute to the first representable instant,
/// so the conversion is total.
pub fn local_to_utc(date: NaiveDate, time: TimeOfDay, tz: Tz) -> DateTime<Utc> {
  let mut local = date.and_time(time.as_naive());
  loop {
    match tz.from_local_datetime(&local) {
      LocalResult::Single(dt) => return dt.with_timezone(&Utc),
      LocalResult::Ambiguous(earliest, _) => {
        return earliest.with_timezone(&Utc);
      }
      LocalResult::None => local += Duration::minutes(1),
    }
  }
}

/// Break a UTC instant into the local calendar day and wall-clock time.
pub fn utc_to_local(instant: DateTime<Utc>, tz: Tz) -> (NaiveDate, TimeOfDay) {
  let local = instant.with_timezone(&tz);
  let time = TimeOfDay::new(local.hour(), local.minute())
    .unwrap_or(TimeOfDay(NaiveTime::MIN));
  (local.date_naive(), time)
}

/// The current calendar day in `tz`.
pub fn local_today(now: DateTime<Utc>, tz: Tz) -> NaiveDate {
  now.with_timezone(&tz).date_naive()
}

// ─── Tests ───────────────────────────────────────────────────────────────────
