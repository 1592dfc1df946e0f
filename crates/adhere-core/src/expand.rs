//! Recurrence expansion: from an abstract schedule to the concrete dose
//! occurrences the user is expected to act on.
//!
//! Expansion is a pure function of the schedule and "now". Persisting the
//! result — and deduplicating against occurrences that already exist — is
//! the store's job.

use chrono::{DateTime, Datelike, Utc};
use chrono_tz::Tz;
use uuid::Uuid;

use crate::{
  clock::{local_to_utc, local_today},
  dose::{AdherenceRecord, DoseStatus},
  schedule::MedicationSchedule,
};

// ─── Occurrence ──────────────────────────────────────────────────────────────

/// One concrete (day × time) instance implied by a schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occurrence {
  pub user_id:       Uuid,
  pub medication_id: Uuid,
  pub scheduled_at:  DateTime<Utc>,
  /// The schedule's zone, captured so the record keeps it even if the
  /// user later moves.
  pub timezone:      Tz,
}

impl Occurrence {
  /// Materialise the pending adherence record for this occurrence.
  pub fn into_record(self, now: DateTime<Utc>) -> AdherenceRecord {
    AdherenceRecord {
      record_id:     Uuid::new_v4(),
      user_id:       self.user_id,
      medication_id: self.medication_id,
      scheduled_at:  self.scheduled_at,
      timezone:      self.timezone,
      status:        DoseStatus::Pending,
      taken_at:      None,
      notes:         None,
      created_at:    now,
      updated_at:    now,
    }
  }
}

// ─── Expansion ───────────────────────────────────────────────────────────────

/// Expand `schedule` into every future occurrence between its start and
/// end dates, evaluated against `now`.
///
/// Days strictly before today in the schedule's zone are never generated;
/// on the current day, slots whose instant has already passed are
/// dropped. The result is sorted by instant and free of duplicates. An
/// empty time list yields an empty expansion, not an error.
pub fn expand(
  schedule: &MedicationSchedule,
  now: DateTime<Utc>,
) -> Vec<Occurrence> {
  let tz = schedule.timezone;
  let today = local_today(now, tz);
  let end = schedule.end_date.unwrap_or(schedule.start_date);

  let mut out = Vec::new();
  for day in schedule.start_date.iter_days().take_while(|d| *d <= end) {
    if day < today {
      continue;
    }
    if !schedule.days_of_week.is_empty()
      && !schedule.days_of_week.contains(&day.weekday())
    {
      continue;
    }
    for &time in &schedule.times {
      let instant = local_to_utc(day, time, tz);
      if day == today && instant < now {
        continue;
      }
      out.push(Occurrence {
        user_id:       schedule.user_id,
        medication_id: schedule.medication_id,
        scheduled_at:  instant,
        timezone:      tz,
      });
    }
  }

  // Times are unique and sorted per day already; the final sort keeps the
  // ordering guarantee across DST transitions as well.
  out.sort_by_key(|o| o.scheduled_at);
  out
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use chrono::{NaiveDate, Weekday};

  use super::*;
  use crate::schedule::ScheduleDraft;

  fn utc(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
  }

  fn schedule(
    start: &str,
    end: Option<&str>,
    times: &[&str],
    days: Vec<Weekday>,
  ) -> MedicationSchedule {
    let parse = |s: &str| NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap();
    MedicationSchedule::from_draft(
      ScheduleDraft {
        user_id:       Uuid::new_v4(),
        medication_id: Uuid::new_v4(),
        timezone:      "America/New_York".into(),
        start_date:    Some(parse(start)),
        end_date:      end.map(parse),
        times:         times.iter().map(|t| t.to_string()).collect(),
        days_of_week:  days,
      },
      utc("2024-06-01T00:00:00Z"),
    )
    .unwrap()
  }

  #[test]
  fn future_range_yields_n_times_d_occurrences() {
    // 3 times × 4 days, all in the future relative to "now".
    let s = schedule(
      "2024-06-10",
      Some("2024-06-13"),
      &["08:00", "14:00", "20:00"],
      vec![],
    );
    let out = expand(&s, utc("2024-06-01T12:00:00Z"));
    assert_eq!(out.len(), 12);
    assert!(out.windows(2).all(|w| w[0].scheduled_at < w[1].scheduled_at));
  }

  #[test]
  fn example_morning_run_yields_four_evening_run_yields_three() {
    // start=today, end=tomorrow, 08:00 and 20:00 New York time.
    let s =
      schedule("2024-06-10", Some("2024-06-11"), &["08:00", "20:00"], vec![]);

    // 07:00 local (11:00 UTC, EDT): today's 08:00 is still ahead.
    let morning = expand(&s, utc("2024-06-10T11:00:00Z"));
    assert_eq!(morning.len(), 4);

    // 09:00 local: today's 08:00 slot has passed.
    let later = expand(&s, utc("2024-06-10T13:00:00Z"));
    assert_eq!(later.len(), 3);
    assert_eq!(
      later[0].scheduled_at,
      // 20:00 EDT on the 10th.
      utc("2024-06-11T00:00:00Z")
    );
  }

  #[test]
  fn days_before_today_are_never_generated() {
    let s =
      schedule("2024-06-01", Some("2024-06-12"), &["12:00"], vec![]);
    let out = expand(&s, utc("2024-06-10T00:00:00Z"));
    // 2024-06-10 00:00 UTC is 20:00 June 9 in New York: the 1st through
    // 8th are history, and the 9th's noon slot has already passed. Only
    // the 10th through 12th remain.
    assert_eq!(out.len(), 3);
  }

  #[test]
  fn weekday_filter_restricts_days() {
    // 2024-06-10 is a Monday.
    let s = schedule(
      "2024-06-10",
      Some("2024-06-16"),
      &["09:00"],
      vec![Weekday::Mon, Weekday::Thu],
    );
    let out = expand(&s, utc("2024-06-01T00:00:00Z"));
    assert_eq!(out.len(), 2);
    let days: Vec<u32> = out
      .iter()
      .map(|o| {
        crate::clock::utc_to_local(o.scheduled_at, s.timezone).0.day()
      })
      .collect();
    assert_eq!(days, [10, 13]);
  }

  #[test]
  fn empty_time_list_yields_nothing() {
    let s = schedule("2024-06-10", Some("2024-06-20"), &[], vec![]);
    assert!(expand(&s, utc("2024-06-01T00:00:00Z")).is_empty());
  }

  #[test]
  fn omitted_end_date_means_single_day() {
    let s = schedule("2024-06-10", None, &["08:00", "20:00"], vec![]);
    let out = expand(&s, utc("2024-06-01T00:00:00Z"));
    assert_eq!(out.len(), 2);
  }

  #[test]
  fn single_past_occurrence_today_yields_nothing() {
    let s = schedule("2024-06-10", None, &["08:00"], vec![]);
    // 09:00 local on the 10th.
    assert!(expand(&s, utc("2024-06-10T13:00:00Z")).is_empty());
  }

  #[test]
  fn expansion_spanning_spring_forward_stays_sorted() {
    // US DST begins 2024-03-10; the 02:30 slot slides to 03:00 that day.
    let s = schedule(
      "2024-03-09",
      Some("2024-03-11"),
      &["02:30", "22:00"],
      vec![],
    );
    let out = expand(&s, utc("2024-03-01T00:00:00Z"));
    assert_eq!(out.len(), 6);
    assert!(out.windows(2).all(|w| w[0].scheduled_at < w[1].scheduled_at));
  }
}
