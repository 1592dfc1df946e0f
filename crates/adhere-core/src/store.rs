//! Store and source traits implemented by persistence backends.
//!
//! The engine depends on these abstractions, never on a concrete backend.
//! All methods return `Send` futures so implementations can be driven from
//! multi-threaded async runtimes.

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  dose::{AdherenceRecord, DoseStatus},
  reminder::{Channel, Reminder},
  schedule::MedicationSchedule,
};

// ─── Schedules ───────────────────────────────────────────────────────────────

/// Read access to medication schedules.
///
/// The engine never writes through this trait; registration and deletion
/// belong to the owning application. A deleted schedule simply stops
/// appearing here, which ends its generation.
pub trait ScheduleSource: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn schedule_for_medication(
    &self,
    medication_id: Uuid,
  ) -> impl Future<Output = Result<Option<MedicationSchedule>, Self::Error>>
  + Send
  + '_;

  fn all_schedules(
    &self,
  ) -> impl Future<Output = Result<Vec<MedicationSchedule>, Self::Error>> + Send + '_;
}

// ─── Adherence records ───────────────────────────────────────────────────────

/// Persistence for generated dose records.
pub trait AdherenceStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Bulk insert, silently ignoring rows whose
  /// `(medication_id, scheduled_at)` pair already exists. Returns the
  /// number actually inserted, which makes re-expansion an observable
  /// no-op.
  fn insert_records(
    &self,
    records: Vec<AdherenceRecord>,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  fn record(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<AdherenceRecord>, Self::Error>> + Send + '_;

  /// Persist a mutated record, but only while the stored row still has
  /// `expected` status. Matching zero rows is a conflict surfaced as a
  /// backend error, so concurrent writers cannot double-apply a
  /// transition.
  fn update_record<'a>(
    &'a self,
    record: &'a AdherenceRecord,
    expected: DoseStatus,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  fn records_for_user(
    &self,
    user_id: Uuid,
  ) -> impl Future<Output = Result<Vec<AdherenceRecord>, Self::Error>> + Send + '_;

  /// Pending records with `from <= scheduled_at < to`, ordered by
  /// instant, optionally restricted to one user.
  fn pending_in_window(
    &self,
    user_id: Option<Uuid>,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
  ) -> impl Future<Output = Result<Vec<AdherenceRecord>, Self::Error>> + Send + '_;

  /// Pending records whose scheduled instant lies behind `now`.
  fn overdue(
    &self,
    user_id: Option<Uuid>,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<Vec<AdherenceRecord>, Self::Error>> + Send + '_;

  /// Medication-deletion cascade. Returns the number of rows removed.
  fn delete_records_for_medication(
    &self,
    medication_id: Uuid,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;
}

// ─── Reminders ───────────────────────────────────────────────────────────────

/// Persistence for reminders and their delivery state.
pub trait ReminderStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn insert_reminder(
    &self,
    reminder: Reminder,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn reminder(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Reminder>, Self::Error>> + Send + '_;

  fn reminders_for_user(
    &self,
    user_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Reminder>, Self::Error>> + Send + '_;

  /// Dispatch candidates: `scheduled_at` in `[from, to)`, still pending
  /// or failed with retries left, and at least one enabled channel
  /// unsent. This predicate is the dispatcher's sole idempotency
  /// mechanism — a fully-sent reminder must never reappear.
  fn due_in_window(
    &self,
    user_id: Option<Uuid>,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
  ) -> impl Future<Output = Result<Vec<Reminder>, Self::Error>> + Send + '_;

  /// Apply [`Reminder::mark_sent`] and persist it, guarded so a channel
  /// can only move from unsent to sent once even under concurrent runs.
  /// Returns the updated reminder.
  fn mark_sent(
    &self,
    id: Uuid,
    channel: Channel,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<Reminder, Self::Error>> + Send + '_;

  /// Apply [`Reminder::mark_failed`] and persist it. Returns the updated
  /// reminder.
  fn mark_failed(
    &self,
    id: Uuid,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<Reminder, Self::Error>> + Send + '_;

  /// Medication-deletion cascade. Returns the number of rows removed.
  fn delete_reminders_for_medication(
    &self,
    medication_id: Uuid,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;
}
