//! Dose state-machine operations over an abstract store.
//!
//! Each operation loads the record, applies the in-memory transition, and
//! writes it back with an optimistic status check, so concurrent callers
//! cannot double-apply a transition.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use adhere_core::{
  dose::AdherenceRecord,
  stats::{AdherenceSummary, DoseSample, summarize},
  store::AdherenceStore,
};

use crate::error::{EngineError, Result};

/// Confirm a dose as taken. Allowed from `Pending` or `Missed` (late
/// confirmation); anything else is an [`adhere_core::Error`] surfaced to
/// the caller.
pub async fn confirm_dose<S>(
  store: &S,
  record_id: Uuid,
  user_id: Uuid,
  now: DateTime<Utc>,
) -> Result<AdherenceRecord>
where
  S: AdherenceStore,
{
  let mut record = store
    .record(record_id)
    .await
    .map_err(EngineError::store)?
    .ok_or(EngineError::NotFound(record_id))?;

  let expected = record.status;
  record.confirm(user_id, now)?;
  store
    .update_record(&record, expected)
    .await
    .map_err(EngineError::store)?;
  Ok(record)
}

/// Skip a dose. Same guards as [`confirm_dose`].
pub async fn skip_dose<S>(
  store: &S,
  record_id: Uuid,
  user_id: Uuid,
  now: DateTime<Utc>,
) -> Result<AdherenceRecord>
where
  S: AdherenceStore,
{
  let mut record = store
    .record(record_id)
    .await
    .map_err(EngineError::store)?
    .ok_or(EngineError::NotFound(record_id))?;

  let expected = record.status;
  record.skip(user_id, now)?;
  store
    .update_record(&record, expected)
    .await
    .map_err(EngineError::store)?;
  Ok(record)
}

/// Move pending doses scheduled more than `grace` ago to `Missed`, so
/// late confirmation has a defined source state.
///
/// Losing a race against a concurrent confirm/skip is fine — the user's
/// transition wins and the sweep moves on.
pub async fn sweep_missed<S>(
  store: &S,
  user_id: Option<Uuid>,
  grace: Duration,
  now: DateTime<Utc>,
) -> Result<usize>
where
  S: AdherenceStore,
{
  let cutoff = now - grace;
  let overdue = store
    .overdue(user_id, cutoff)
    .await
    .map_err(EngineError::store)?;

  let mut swept = 0;
  for mut record in overdue {
    let expected = record.status;
    record.mark_missed(now)?;
    match store.update_record(&record, expected).await {
      Ok(()) => swept += 1,
      Err(e) => {
        tracing::debug!(
          record = %record.record_id,
          error = %e,
          "missed sweep lost a race"
        );
      }
    }
  }

  if swept > 0 {
    tracing::info!(swept, "marked overdue doses as missed");
  }
  Ok(swept)
}

/// Fold a user's records into the adherence report.
///
/// Medication display names live in the external catalog; callers pass
/// the resolved names and unknown ids fall back to their UUID form.
pub async fn summary_for_user<S>(
  store: &S,
  user_id: Uuid,
  names: &BTreeMap<Uuid, String>,
) -> Result<AdherenceSummary>
where
  S: AdherenceStore,
{
  let records = store
    .records_for_user(user_id)
    .await
    .map_err(EngineError::store)?;

  let rows = records.into_iter().map(|r| DoseSample {
    status:          r.status,
    medication_id:   r.medication_id,
    medication_name: names
      .get(&r.medication_id)
      .cloned()
      .unwrap_or_else(|| r.medication_id.to_string()),
  });

  Ok(summarize(rows))
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use adhere_core::dose::DoseStatus;
  use adhere_core::stats::Ranking;
  use adhere_store_sqlite::SqliteStore;

  use super::*;

  fn record(user: Uuid, at: DateTime<Utc>) -> AdherenceRecord {
    let now = Utc::now();
    AdherenceRecord {
      record_id:     Uuid::new_v4(),
      user_id:       user,
      medication_id: Uuid::new_v4(),
      scheduled_at:  at,
      timezone:      adhere_core::clock::parse_timezone("UTC").unwrap(),
      status:        DoseStatus::Pending,
      taken_at:      None,
      notes:         None,
      created_at:    now,
      updated_at:    now,
    }
  }

  #[tokio::test]
  async fn confirm_persists_the_transition() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let user = Uuid::new_v4();
    let r = record(user, Utc::now());
    store.insert_records(vec![r.clone()]).await.unwrap();

    let confirmed =
      confirm_dose(&store, r.record_id, user, Utc::now()).await.unwrap();
    assert_eq!(confirmed.status, DoseStatus::Taken);

    let stored = store.record(r.record_id).await.unwrap().unwrap();
    assert_eq!(stored.status, DoseStatus::Taken);
  }

  #[tokio::test]
  async fn confirm_unknown_record_is_not_found() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let err = confirm_dose(&store, Uuid::new_v4(), Uuid::new_v4(), Utc::now())
      .await
      .unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
  }

  #[tokio::test]
  async fn confirm_by_stranger_is_unauthorized() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let owner = Uuid::new_v4();
    let r = record(owner, Utc::now());
    store.insert_records(vec![r.clone()]).await.unwrap();

    let err = confirm_dose(&store, r.record_id, Uuid::new_v4(), Utc::now())
      .await
      .unwrap_err();
    assert!(matches!(
      err,
      EngineError::Domain(adhere_core::Error::Unauthorized { .. })
    ));

    let stored = store.record(r.record_id).await.unwrap().unwrap();
    assert_eq!(stored.status, DoseStatus::Pending);
  }

  #[tokio::test]
  async fn skip_then_confirm_is_an_invalid_transition() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let user = Uuid::new_v4();
    let r = record(user, Utc::now());
    store.insert_records(vec![r.clone()]).await.unwrap();

    skip_dose(&store, r.record_id, user, Utc::now()).await.unwrap();
    let err = confirm_dose(&store, r.record_id, user, Utc::now())
      .await
      .unwrap_err();
    assert!(matches!(
      err,
      EngineError::Domain(adhere_core::Error::InvalidStateTransition { .. })
    ));
  }

  #[tokio::test]
  async fn sweep_marks_overdue_doses_and_allows_late_confirmation() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let user = Uuid::new_v4();
    let now = Utc::now();

    let stale = record(user, now - Duration::hours(2));
    let fresh = record(user, now - Duration::minutes(5));
    let future = record(user, now + Duration::hours(1));
    store
      .insert_records(vec![stale.clone(), fresh, future])
      .await
      .unwrap();

    let swept = sweep_missed(&store, Some(user), Duration::hours(1), now)
      .await
      .unwrap();
    assert_eq!(swept, 1);

    let missed = store.record(stale.record_id).await.unwrap().unwrap();
    assert_eq!(missed.status, DoseStatus::Missed);

    // Late confirmation of the missed dose still works.
    let confirmed =
      confirm_dose(&store, stale.record_id, user, now).await.unwrap();
    assert_eq!(confirmed.status, DoseStatus::Taken);
  }

  #[tokio::test]
  async fn summary_reports_rate_and_ranking() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let user = Uuid::new_v4();
    let now = Utc::now();

    let mut records = Vec::new();
    for i in 0..4 {
      records.push(record(user, now - Duration::hours(i)));
    }
    store.insert_records(records.clone()).await.unwrap();

    for r in records.iter().take(3) {
      confirm_dose(&store, r.record_id, user, now).await.unwrap();
    }
    skip_dose(&store, records[3].record_id, user, now).await.unwrap();

    let names = BTreeMap::new();
    let summary = summary_for_user(&store, user, &names).await.unwrap();
    assert_eq!(summary.counts.total, 4);
    assert_eq!(summary.counts.taken, 3);
    assert_eq!(summary.counts.skipped, 1);
    assert_eq!(summary.adherence_rate, 75.0);
    assert_eq!(summary.ranking, Ranking::B);
    assert_eq!(summary.by_medication.len(), 4);
  }
}
