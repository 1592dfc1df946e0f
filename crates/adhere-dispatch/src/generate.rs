//! Dose generation: recurrence expansion persisted through the
//! adherence store.
//!
//! Runs synchronously at medication registration (and optionally as a
//! periodic top-up); it suspends on store I/O but never talks to a
//! notifier.

use chrono::{DateTime, Utc};

use adhere_core::{
  dose::AdherenceRecord,
  expand::expand,
  schedule::MedicationSchedule,
  store::{AdherenceStore, ScheduleSource},
};

use crate::error::{EngineError, Result};

/// Expand `schedule` and persist the resulting pending records.
///
/// Returns the number of records actually created. Occurrences that
/// already exist are ignored by the store, so re-running after a partial
/// failure — or on every tick — is safe.
pub async fn generate_for<S>(
  store: &S,
  schedule: &MedicationSchedule,
  now: DateTime<Utc>,
) -> Result<usize>
where
  S: AdherenceStore,
{
  let records: Vec<AdherenceRecord> = expand(schedule, now)
    .into_iter()
    .map(|occurrence| occurrence.into_record(now))
    .collect();

  if records.is_empty() {
    return Ok(0);
  }

  let inserted = store
    .insert_records(records)
    .await
    .map_err(EngineError::store)?;
  if inserted > 0 {
    tracing::info!(
      medication = %schedule.medication_id,
      inserted,
      "generated dose records"
    );
  }
  Ok(inserted)
}

/// Re-expand every schedule the source currently knows about.
///
/// A deleted schedule no longer appears in the source, so its generation
/// simply stops; records it already produced are untouched.
pub async fn top_up<Src, S>(
  source: &Src,
  store: &S,
  now: DateTime<Utc>,
) -> Result<usize>
where
  Src: ScheduleSource,
  S: AdherenceStore,
{
  let schedules = source.all_schedules().await.map_err(EngineError::store)?;

  let mut created = 0;
  for schedule in &schedules {
    created += generate_for(store, schedule, now).await?;
  }
  Ok(created)
}

// ─── Tests ───────────────────────────────────────────────────────────────────
