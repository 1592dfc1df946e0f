//! [`SqliteStore`] — the SQLite implementation of the Adhere store traits.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use adhere_core::{
  dose::{AdherenceRecord, DoseStatus},
  notify::{Entitlement, EntitlementProvider},
  reminder::{Channel, MAX_DELIVERY_RETRIES, Reminder},
  schedule::MedicationSchedule,
  store::{AdherenceStore, ReminderStore, ScheduleSource},
};

use crate::{
  Error, Result,
  encode::{
    RawEntitlement, RawRecord, RawReminder, RawSchedule, encode_dose_status,
    encode_dt, encode_uuid,
  },
  schema::SCHEMA,
};

// ─── Row mappers ─────────────────────────────────────────────────────────────

const SCHEDULE_COLS: &str = "schedule_id, user_id, medication_id, timezone, \
  start_date, end_date, times, days_of_week, created_at";

fn schedule_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawSchedule> {
  Ok(RawSchedule {
    schedule_id:   row.get(0)?,
    user_id:       row.get(1)?,
    medication_id: row.get(2)?,
    timezone:      row.get(3)?,
    start_date:    row.get(4)?,
    end_date:      row.get(5)?,
    times:         row.get(6)?,
    days_of_week:  row.get(7)?,
    created_at:    row.get(8)?,
  })
}

const RECORD_COLS: &str = "record_id, user_id, medication_id, scheduled_at, \
  timezone, status, taken_at, notes, created_at, updated_at";

fn record_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRecord> {
  Ok(RawRecord {
    record_id:     row.get(0)?,
    user_id:       row.get(1)?,
    medication_id: row.get(2)?,
    scheduled_at:  row.get(3)?,
    timezone:      row.get(4)?,
    status:        row.get(5)?,
    taken_at:      row.get(6)?,
    notes:         row.get(7)?,
    created_at:    row.get(8)?,
    updated_at:    row.get(9)?,
  })
}

const REMINDER_COLS: &str = "reminder_id, user_id, medication_id, \
  scheduled_at, message, email_enabled, email_sent, email_sent_at, \
  sms_enabled, sms_sent, sms_sent_at, status, retry_count, last_retry_at, \
  created_at, updated_at";

fn reminder_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawReminder> {
  Ok(RawReminder {
    reminder_id:   row.get(0)?,
    user_id:       row.get(1)?,
    medication_id: row.get(2)?,
    scheduled_at:  row.get(3)?,
    message:       row.get(4)?,
    email_enabled: row.get(5)?,
    email_sent:    row.get(6)?,
    email_sent_at: row.get(7)?,
    sms_enabled:   row.get(8)?,
    sms_sent:      row.get(9)?,
    sms_sent_at:   row.get(10)?,
    status:        row.get(11)?,
    retry_count:   row.get(12)?,
    last_retry_at: row.get(13)?,
    created_at:    row.get(14)?,
    updated_at:    row.get(15)?,
  })
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// An Adhere store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Schedules — registration surface for the owning application ──────────

  /// Persist a schedule at medication registration time. The engine only
  /// ever reads it back through [`ScheduleSource`].
  pub async fn insert_schedule(
    &self,
    schedule: &MedicationSchedule,
  ) -> Result<()> {
    let raw = RawSchedule::from_schedule(schedule)?;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO schedules (
             schedule_id, user_id, medication_id, timezone, start_date,
             end_date, times, days_of_week, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
          rusqlite::params![
            raw.schedule_id,
            raw.user_id,
            raw.medication_id,
            raw.timezone,
            raw.start_date,
            raw.end_date,
            raw.times,
            raw.days_of_week,
            raw.created_at,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Drop the schedule for a medication, ending future generation.
  /// Existing records and reminders are untouched.
  pub async fn delete_schedule(&self, medication_id: Uuid) -> Result<bool> {
    let med_str = encode_uuid(medication_id);

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM schedules WHERE medication_id = ?1",
          rusqlite::params![med_str],
        )?)
      })
      .await?;
    Ok(changed > 0)
  }

  // ── Entitlements — written by the billing system, read-only here ─────────

  pub async fn upsert_entitlement(
    &self,
    entitlement: Entitlement,
  ) -> Result<()> {
    let user_str = encode_uuid(entitlement.user_id);
    let active = entitlement.active;
    let expires_str = encode_dt(entitlement.expires_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO entitlements (user_id, active, expires_at)
           VALUES (?1, ?2, ?3)
           ON CONFLICT(user_id) DO UPDATE
             SET active = excluded.active, expires_at = excluded.expires_at",
          rusqlite::params![user_str, active, expires_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  pub async fn entitlement(
    &self,
    user_id: Uuid,
  ) -> Result<Option<Entitlement>> {
    let user_str = encode_uuid(user_id);

    let raw: Option<RawEntitlement> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT user_id, active, expires_at FROM entitlements
               WHERE user_id = ?1",
              rusqlite::params![user_str],
              |row| {
                Ok(RawEntitlement {
                  user_id:    row.get(0)?,
                  active:     row.get(1)?,
                  expires_at: row.get(2)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawEntitlement::into_entitlement).transpose()
  }
}

// ─── ScheduleSource impl ─────────────────────────────────────────────────────

impl ScheduleSource for SqliteStore {
  type Error = Error;

  async fn schedule_for_medication(
    &self,
    medication_id: Uuid,
  ) -> Result<Option<MedicationSchedule>> {
    let med_str = encode_uuid(medication_id);

    let raw: Option<RawSchedule> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {SCHEDULE_COLS} FROM schedules
                 WHERE medication_id = ?1"
              ),
              rusqlite::params![med_str],
              schedule_from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawSchedule::into_schedule).transpose()
  }

  async fn all_schedules(&self) -> Result<Vec<MedicationSchedule>> {
    let raws: Vec<RawSchedule> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {SCHEDULE_COLS} FROM schedules ORDER BY created_at"
        ))?;
        let rows = stmt
          .query_map([], schedule_from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawSchedule::into_schedule).collect()
  }
}

// ─── AdherenceStore impl ─────────────────────────────────────────────────────

impl AdherenceStore for SqliteStore {
  type Error = Error;

  async fn insert_records(
    &self,
    records: Vec<AdherenceRecord>,
  ) -> Result<usize> {
    let rows: Vec<RawRecord> =
      records.iter().map(RawRecord::from_record).collect();

    let inserted = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut inserted = 0usize;
        {
          let mut stmt = tx.prepare(
            "INSERT OR IGNORE INTO adherence_records (
               record_id, user_id, medication_id, scheduled_at, timezone,
               status, taken_at, notes, created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
          )?;
          for row in &rows {
            inserted += stmt.execute(rusqlite::params![
              row.record_id,
              row.user_id,
              row.medication_id,
              row.scheduled_at,
              row.timezone,
              row.status,
              row.taken_at,
              row.notes,
              row.created_at,
              row.updated_at,
            ])?;
          }
        }
        tx.commit()?;
        Ok(inserted)
      })
      .await?;

    Ok(inserted)
  }

  async fn record(&self, id: Uuid) -> Result<Option<AdherenceRecord>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawRecord> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {RECORD_COLS} FROM adherence_records
                 WHERE record_id = ?1"
              ),
              rusqlite::params![id_str],
              record_from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawRecord::into_record).transpose()
  }

  async fn update_record(
    &self,
    record: &AdherenceRecord,
    expected: DoseStatus,
  ) -> Result<()> {
    let raw = RawRecord::from_record(record);
    let expected_str = encode_dose_status(expected).to_owned();
    let id = record.record_id;

    let (changed, exists) = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          "UPDATE adherence_records
           SET status = ?1, taken_at = ?2, notes = ?3, updated_at = ?4
           WHERE record_id = ?5 AND status = ?6",
          rusqlite::params![
            raw.status,
            raw.taken_at,
            raw.notes,
            raw.updated_at,
            raw.record_id,
            expected_str,
          ],
        )?;
        if changed > 0 {
          return Ok((changed, true));
        }

        let exists: bool = conn
          .query_row(
            "SELECT 1 FROM adherence_records WHERE record_id = ?1",
            rusqlite::params![raw.record_id],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);
        Ok((0, exists))
      })
      .await?;

    if changed > 0 {
      Ok(())
    } else if exists {
      Err(Error::StaleWrite(id))
    } else {
      Err(Error::RecordNotFound(id))
    }
  }

  async fn records_for_user(
    &self,
    user_id: Uuid,
  ) -> Result<Vec<AdherenceRecord>> {
    let user_str = encode_uuid(user_id);

    let raws: Vec<RawRecord> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {RECORD_COLS} FROM adherence_records
           WHERE user_id = ?1 ORDER BY scheduled_at"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![user_str], record_from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawRecord::into_record).collect()
  }

  async fn pending_in_window(
    &self,
    user_id: Option<Uuid>,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
  ) -> Result<Vec<AdherenceRecord>> {
    let from_str = encode_dt(from);
    let to_str = encode_dt(to);
    let user_str = user_id.map(encode_uuid);

    let raws: Vec<RawRecord> = self
      .conn
      .call(move |conn| {
        let base = format!(
          "SELECT {RECORD_COLS} FROM adherence_records
           WHERE status = 'pending'
             AND scheduled_at >= ?1 AND scheduled_at < ?2"
        );
        let rows = if let Some(user) = user_str {
          let mut stmt = conn
            .prepare(&format!("{base} AND user_id = ?3 ORDER BY scheduled_at"))?;
          stmt
            .query_map(rusqlite::params![from_str, to_str, user], record_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?
        } else {
          let mut stmt = conn.prepare(&format!("{base} ORDER BY scheduled_at"))?;
          stmt
            .query_map(rusqlite::params![from_str, to_str], record_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawRecord::into_record).collect()
  }

  async fn overdue(
    &self,
    user_id: Option<Uuid>,
    now: DateTime<Utc>,
  ) -> Result<Vec<AdherenceRecord>> {
    let now_str = encode_dt(now);
    let user_str = user_id.map(encode_uuid);

    let raws: Vec<RawRecord> = self
      .conn
      .call(move |conn| {
        let base = format!(
          "SELECT {RECORD_COLS} FROM adherence_records
           WHERE status = 'pending' AND scheduled_at < ?1"
        );
        let rows = if let Some(user) = user_str {
          let mut stmt = conn
            .prepare(&format!("{base} AND user_id = ?2 ORDER BY scheduled_at"))?;
          stmt
            .query_map(rusqlite::params![now_str, user], record_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?
        } else {
          let mut stmt = conn.prepare(&format!("{base} ORDER BY scheduled_at"))?;
          stmt
            .query_map(rusqlite::params![now_str], record_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawRecord::into_record).collect()
  }

  async fn delete_records_for_medication(
    &self,
    medication_id: Uuid,
  ) -> Result<usize> {
    let med_str = encode_uuid(medication_id);

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM adherence_records WHERE medication_id = ?1",
          rusqlite::params![med_str],
        )?)
      })
      .await?;
    Ok(changed)
  }
}

// ─── ReminderStore impl ──────────────────────────────────────────────────────

impl ReminderStore for SqliteStore {
  type Error = Error;

  async fn insert_reminder(&self, reminder: Reminder) -> Result<()> {
    let raw = RawReminder::from_reminder(&reminder);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO reminders (
             reminder_id, user_id, medication_id, scheduled_at, message,
             email_enabled, email_sent, email_sent_at,
             sms_enabled, sms_sent, sms_sent_at,
             status, retry_count, last_retry_at, created_at, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
                     ?13, ?14, ?15, ?16)",
          rusqlite::params![
            raw.reminder_id,
            raw.user_id,
            raw.medication_id,
            raw.scheduled_at,
            raw.message,
            raw.email_enabled,
            raw.email_sent,
            raw.email_sent_at,
            raw.sms_enabled,
            raw.sms_sent,
            raw.sms_sent_at,
            raw.status,
            raw.retry_count,
            raw.last_retry_at,
            raw.created_at,
            raw.updated_at,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn reminder(&self, id: Uuid) -> Result<Option<Reminder>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawReminder> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {REMINDER_COLS} FROM reminders WHERE reminder_id = ?1"
              ),
              rusqlite::params![id_str],
              reminder_from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawReminder::into_reminder).transpose()
  }

  async fn reminders_for_user(&self, user_id: Uuid) -> Result<Vec<Reminder>> {
    let user_str = encode_uuid(user_id);

    let raws: Vec<RawReminder> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {REMINDER_COLS} FROM reminders
           WHERE user_id = ?1 ORDER BY scheduled_at"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![user_str], reminder_from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawReminder::into_reminder).collect()
  }

  async fn due_in_window(
    &self,
    user_id: Option<Uuid>,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
  ) -> Result<Vec<Reminder>> {
    let from_str = encode_dt(from);
    let to_str = encode_dt(to);
    let user_str = user_id.map(encode_uuid);
    let max_retries = i64::from(MAX_DELIVERY_RETRIES);

    let raws: Vec<RawReminder> = self
      .conn
      .call(move |conn| {
        // The select predicate is the dispatcher's idempotency mechanism:
        // fully-sent reminders and exhausted failures never match.
        let base = format!(
          "SELECT {REMINDER_COLS} FROM reminders
           WHERE scheduled_at >= ?1 AND scheduled_at < ?2
             AND (status = 'pending'
                  OR (status = 'failed' AND retry_count < ?3))
             AND ((email_enabled = 1 AND email_sent = 0)
                  OR (sms_enabled = 1 AND sms_sent = 0))"
        );
        let rows = if let Some(user) = user_str {
          let mut stmt = conn
            .prepare(&format!("{base} AND user_id = ?4 ORDER BY scheduled_at"))?;
          stmt
            .query_map(
              rusqlite::params![from_str, to_str, max_retries, user],
              reminder_from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?
        } else {
          let mut stmt = conn.prepare(&format!("{base} ORDER BY scheduled_at"))?;
          stmt
            .query_map(
              rusqlite::params![from_str, to_str, max_retries],
              reminder_from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawReminder::into_reminder).collect()
  }

  async fn mark_sent(
    &self,
    id: Uuid,
    channel: Channel,
    now: DateTime<Utc>,
  ) -> Result<Reminder> {
    let mut updated =
      self.reminder(id).await?.ok_or(Error::ReminderNotFound(id))?;
    updated.mark_sent(channel, now)?;

    let raw = RawReminder::from_reminder(&updated);
    let guard_col = match channel {
      Channel::Email => "email_sent",
      Channel::Sms => "sms_sent",
    };
    let sql = format!(
      "UPDATE reminders
       SET status = ?1, email_sent = ?2, email_sent_at = ?3,
           sms_sent = ?4, sms_sent_at = ?5, updated_at = ?6
       WHERE reminder_id = ?7 AND {guard_col} = 0"
    );

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          &sql,
          rusqlite::params![
            raw.status,
            raw.email_sent,
            raw.email_sent_at,
            raw.sms_sent,
            raw.sms_sent_at,
            raw.updated_at,
            raw.reminder_id,
          ],
        )?)
      })
      .await?;

    if changed == 0 {
      return Err(Error::StaleWrite(id));
    }
    Ok(updated)
  }

  async fn mark_failed(&self, id: Uuid, now: DateTime<Utc>) -> Result<Reminder> {
    let mut updated =
      self.reminder(id).await?.ok_or(Error::ReminderNotFound(id))?;
    let previous_retries = i64::from(updated.retry_count);
    updated.mark_failed(now);

    let raw = RawReminder::from_reminder(&updated);

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE reminders
           SET status = ?1, retry_count = ?2, last_retry_at = ?3,
               updated_at = ?4
           WHERE reminder_id = ?5 AND retry_count = ?6",
          rusqlite::params![
            raw.status,
            raw.retry_count,
            raw.last_retry_at,
            raw.updated_at,
            raw.reminder_id,
            previous_retries,
          ],
        )?)
      })
      .await?;

    if changed == 0 {
      return Err(Error::StaleWrite(id));
    }
    Ok(updated)
  }

  async fn delete_reminders_for_medication(
    &self,
    medication_id: Uuid,
  ) -> Result<usize> {
    let med_str = encode_uuid(medication_id);

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM reminders WHERE medication_id = ?1",
          rusqlite::params![med_str],
        )?)
      })
      .await?;
    Ok(changed)
  }
}

// ─── EntitlementProvider impl ────────────────────────────────────────────────

impl EntitlementProvider for SqliteStore {
  type Error = Error;

  async fn is_active_premium(&self, user_id: Uuid) -> Result<bool> {
    let now = Utc::now();
    Ok(
      self
        .entitlement(user_id)
        .await?
        .is_some_and(|e| e.grants_delivery(now)),
    )
  }
}
