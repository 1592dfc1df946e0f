//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings at fixed microsecond
//! precision so lexicographic comparison in SQL matches instant order.
//! Calendar dates are `YYYY-MM-DD`, list-valued fields are compact JSON,
//! UUIDs are hyphenated lowercase strings, zone names are stored verbatim.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc, Weekday};
use chrono_tz::Tz;
use uuid::Uuid;

use adhere_core::{
  clock::{TimeOfDay, parse_timezone},
  dose::{AdherenceRecord, DoseStatus},
  notify::Entitlement,
  reminder::{ChannelState, Reminder, ReminderStatus},
  schedule::MedicationSchedule,
};

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── Timestamps and dates ────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_date(d: NaiveDate) -> String {
  d.format("%Y-%m-%d").to_string()
}

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d")
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Zones ───────────────────────────────────────────────────────────────────

pub fn encode_timezone(tz: Tz) -> String { tz.name().to_owned() }

pub fn decode_timezone(s: &str) -> Result<Tz> { Ok(parse_timezone(s)?) }

// ─── Status enums ────────────────────────────────────────────────────────────

pub fn encode_dose_status(s: DoseStatus) -> &'static str {
  match s {
    DoseStatus::Pending => "pending",
    DoseStatus::Taken => "taken",
    DoseStatus::Missed => "missed",
    DoseStatus::Skipped => "skipped",
  }
}

pub fn decode_dose_status(s: &str) -> Result<DoseStatus> {
  match s {
    "pending" => Ok(DoseStatus::Pending),
    "taken" => Ok(DoseStatus::Taken),
    "missed" => Ok(DoseStatus::Missed),
    "skipped" => Ok(DoseStatus::Skipped),
    other => Err(Error::Decode(format!("unknown dose status: {other:?}"))),
  }
}

pub fn encode_reminder_status(s: ReminderStatus) -> &'static str {
  match s {
    ReminderStatus::Pending => "pending",
    ReminderStatus::Sent => "sent",
    ReminderStatus::Failed => "failed",
  }
}

pub fn decode_reminder_status(s: &str) -> Result<ReminderStatus> {
  match s {
    "pending" => Ok(ReminderStatus::Pending),
    "sent" => Ok(ReminderStatus::Sent),
    "failed" => Ok(ReminderStatus::Failed),
    other => {
      Err(Error::Decode(format!("unknown reminder status: {other:?}")))
    }
  }
}

// ─── List columns ────────────────────────────────────────────────────────────

pub fn encode_times(times: &[TimeOfDay]) -> Result<String> {
  Ok(serde_json::to_string(times)?)
}

pub fn decode_times(s: &str) -> Result<Vec<TimeOfDay>> {
  Ok(serde_json::from_str(s)?)
}

pub fn encode_days(days: &[Weekday]) -> Result<String> {
  Ok(serde_json::to_string(days)?)
}

pub fn decode_days(s: &str) -> Result<Vec<Weekday>> {
  Ok(serde_json::from_str(s)?)
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read from (or bound into) a `schedules` row.
pub struct RawSchedule {
  pub schedule_id:   String,
  pub user_id:       String,
  pub medication_id: String,
  pub timezone:      String,
  pub start_date:    String,
  pub end_date:      Option<String>,
  pub times:         String,
  pub days_of_week:  String,
  pub created_at:    String,
}

impl RawSchedule {
  pub fn from_schedule(s: &MedicationSchedule) -> Result<Self> {
    Ok(Self {
      schedule_id:   encode_uuid(s.schedule_id),
      user_id:       encode_uuid(s.user_id),
      medication_id: encode_uuid(s.medication_id),
      timezone:      encode_timezone(s.timezone),
      start_date:    encode_date(s.start_date),
      end_date:      s.end_date.map(encode_date),
      times:         encode_times(&s.times)?,
      days_of_week:  encode_days(&s.days_of_week)?,
      created_at:    encode_dt(s.created_at),
    })
  }

  pub fn into_schedule(self) -> Result<MedicationSchedule> {
    Ok(MedicationSchedule {
      schedule_id:   decode_uuid(&self.schedule_id)?,
      user_id:       decode_uuid(&self.user_id)?,
      medication_id: decode_uuid(&self.medication_id)?,
      timezone:      decode_timezone(&self.timezone)?,
      start_date:    decode_date(&self.start_date)?,
      end_date:      self.end_date.as_deref().map(decode_date).transpose()?,
      times:         decode_times(&self.times)?,
      days_of_week:  decode_days(&self.days_of_week)?,
      created_at:    decode_dt(&self.created_at)?,
    })
  }
}

/// Raw strings read from (or bound into) an `adherence_records` row.
pub struct RawRecord {
  pub record_id:     String,
  pub user_id:       String,
  pub medication_id: String,
  pub scheduled_at:  String,
  pub timezone:      String,
  pub status:        String,
  pub taken_at:      Option<String>,
  pub notes:         Option<String>,
  pub created_at:    String,
  pub updated_at:    String,
}

impl RawRecord {
  pub fn from_record(r: &AdherenceRecord) -> Self {
    Self {
      record_id:     encode_uuid(r.record_id),
      user_id:       encode_uuid(r.user_id),
      medication_id: encode_uuid(r.medication_id),
      scheduled_at:  encode_dt(r.scheduled_at),
      timezone:      encode_timezone(r.timezone),
      status:        encode_dose_status(r.status).to_owned(),
      taken_at:      r.taken_at.map(encode_dt),
      notes:         r.notes.clone(),
      created_at:    encode_dt(r.created_at),
      updated_at:    encode_dt(r.updated_at),
    }
  }

  pub fn into_record(self) -> Result<AdherenceRecord> {
    Ok(AdherenceRecord {
      record_id:     decode_uuid(&self.record_id)?,
      user_id:       decode_uuid(&self.user_id)?,
      medication_id: decode_uuid(&self.medication_id)?,
      scheduled_at:  decode_dt(&self.scheduled_at)?,
      timezone:      decode_timezone(&self.timezone)?,
      status:        decode_dose_status(&self.status)?,
      taken_at:      self.taken_at.as_deref().map(decode_dt).transpose()?,
      notes:         self.notes,
      created_at:    decode_dt(&self.created_at)?,
      updated_at:    decode_dt(&self.updated_at)?,
    })
  }
}

/// Raw values read from (or bound into) a `reminders` row.
pub struct RawReminder {
  pub reminder_id:   String,
  pub user_id:       String,
  pub medication_id: String,
  pub scheduled_at:  String,
  pub message:       String,
  pub email_enabled: bool,
  pub email_sent:    bool,
  pub email_sent_at: Option<String>,
  pub sms_enabled:   bool,
  pub sms_sent:      bool,
  pub sms_sent_at:   Option<String>,
  pub status:        String,
  pub retry_count:   i64,
  pub last_retry_at: Option<String>,
  pub created_at:    String,
  pub updated_at:    String,
}

impl RawReminder {
  pub fn from_reminder(r: &Reminder) -> Self {
    Self {
      reminder_id:   encode_uuid(r.reminder_id),
      user_id:       encode_uuid(r.user_id),
      medication_id: encode_uuid(r.medication_id),
      scheduled_at:  encode_dt(r.scheduled_at),
      message:       r.message.clone(),
      email_enabled: r.email.enabled,
      email_sent:    r.email.sent,
      email_sent_at: r.email.sent_at.map(encode_dt),
      sms_enabled:   r.sms.enabled,
      sms_sent:      r.sms.sent,
      sms_sent_at:   r.sms.sent_at.map(encode_dt),
      status:        encode_reminder_status(r.status).to_owned(),
      retry_count:   i64::from(r.retry_count),
      last_retry_at: r.last_retry_at.map(encode_dt),
      created_at:    encode_dt(r.created_at),
      updated_at:    encode_dt(r.updated_at),
    }
  }

  pub fn into_reminder(self) -> Result<Reminder> {
    let retry_count = u8::try_from(self.retry_count)
      .map_err(|_| Error::Decode(format!("retry_count out of range: {}", self.retry_count)))?;

    Ok(Reminder {
      reminder_id:   decode_uuid(&self.reminder_id)?,
      user_id:       decode_uuid(&self.user_id)?,
      medication_id: decode_uuid(&self.medication_id)?,
      scheduled_at:  decode_dt(&self.scheduled_at)?,
      message:       self.message,
      email:         ChannelState {
        enabled: self.email_enabled,
        sent:    self.email_sent,
        sent_at: self.email_sent_at.as_deref().map(decode_dt).transpose()?,
      },
      sms:           ChannelState {
        enabled: self.sms_enabled,
        sent:    self.sms_sent,
        sent_at: self.sms_sent_at.as_deref().map(decode_dt).transpose()?,
      },
      status:        decode_reminder_status(&self.status)?,
      retry_count,
      last_retry_at: self.last_retry_at.as_deref().map(decode_dt).transpose()?,
      created_at:    decode_dt(&self.created_at)?,
      updated_at:    decode_dt(&self.updated_at)?,
    })
  }
}

/// Raw values read from an `entitlements` row.
pub struct RawEntitlement {
  pub user_id:    String,
  pub active:     bool,
  pub expires_at: String,
}

impl RawEntitlement {
  pub fn into_entitlement(self) -> Result<Entitlement> {
    Ok(Entitlement {
      user_id:    decode_uuid(&self.user_id)?,
      active:     self.active,
      expires_at: decode_dt(&self.expires_at)?,
    })
  }
}
