//! Medication schedules — the immutable recurrence definition a
//! medication is registered with.

use chrono::{DateTime, NaiveDate, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  clock::{TimeOfDay, parse_timezone},
};

// ─── MedicationSchedule ──────────────────────────────────────────────────────

/// The recurrence definition attached to one medication.
///
/// Read-only to this engine once created: the owning application registers
/// it alongside the medication and deletes it when the medication goes
/// away. Deletion stops future generation; already-generated records are
/// untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedicationSchedule {
  pub schedule_id:   Uuid,
  pub user_id:       Uuid,
  pub medication_id: Uuid,
  /// Resolved upstream of this engine (explicit > user settings > UTC);
  /// no fallback chain survives into expansion.
  pub timezone:      Tz,
  /// Local calendar date in `timezone`.
  pub start_date:    NaiveDate,
  /// `None` means a single-day schedule.
  pub end_date:      Option<NaiveDate>,
  /// Chronologically ordered, deduplicated local times.
  pub times:         Vec<TimeOfDay>,
  /// Empty means every day.
  pub days_of_week:  Vec<Weekday>,
  pub created_at:    DateTime<Utc>,
}

// ─── ScheduleDraft ───────────────────────────────────────────────────────────

/// Raw, not-yet-validated schedule input as the owning application hands
/// it over. Times may be 12- or 24-hour strings.
#[derive(Debug, Clone, Default)]
pub struct ScheduleDraft {
  pub user_id:       Uuid,
  pub medication_id: Uuid,
  pub timezone:      String,
  pub start_date:    Option<NaiveDate>,
  pub end_date:      Option<NaiveDate>,
  pub times:         Vec<String>,
  pub days_of_week:  Vec<Weekday>,
}

impl MedicationSchedule {
  /// Validate and normalise a draft.
  ///
  /// Times are parsed (12- or 24-hour), sorted and deduplicated; the zone
  /// name is resolved against the IANA database. Fails before anything
  /// touches a store.
  pub fn from_draft(draft: ScheduleDraft, now: DateTime<Utc>) -> Result<Self> {
    let timezone = parse_timezone(&draft.timezone)?;
    let start_date = draft.start_date.ok_or(Error::MissingStartDate)?;

    let mut times = draft
      .times
      .iter()
      .map(|raw| raw.parse::<TimeOfDay>())
      .collect::<Result<Vec<_>>>()?;
    times.sort();
    times.dedup();

    Ok(Self {
      schedule_id: Uuid::new_v4(),
      user_id: draft.user_id,
      medication_id: draft.medication_id,
      timezone,
      start_date,
      end_date: draft.end_date,
      times,
      days_of_week: draft.days_of_week,
      created_at: now,
    })
  }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
