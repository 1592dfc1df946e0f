//! Adherence records — the persisted ground truth for one expected dose
//! and its outcome.
//!
//! Records are mutated only through the transition methods here; callers
//! that bypass them lose the state-machine guarantees.

use std::fmt;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Status ──────────────────────────────────────────────────────────────────

/// Dose lifecycle. `Pending` is the only fully open state; a `Missed`
/// dose may still be confirmed or skipped late, `Taken` and `Skipped`
/// are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DoseStatus {
  Pending,
  Taken,
  Missed,
  Skipped,
}

impl fmt::Display for DoseStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      Self::Pending => "pending",
      Self::Taken => "taken",
      Self::Missed => "missed",
      Self::Skipped => "skipped",
    };
    f.write_str(s)
  }
}

// ─── AdherenceRecord ─────────────────────────────────────────────────────────

/// One expected dose. Exactly one record exists per
/// `(medication_id, scheduled_at)` pair; backends enforce the uniqueness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdherenceRecord {
  pub record_id:     Uuid,
  pub user_id:       Uuid,
  pub medication_id: Uuid,
  /// UTC instant the dose is due.
  pub scheduled_at:  DateTime<Utc>,
  /// Zone captured at generation time; a later zone change never
  /// reinterprets history.
  pub timezone:      Tz,
  pub status:        DoseStatus,
  pub taken_at:      Option<DateTime<Utc>>,
  pub notes:         Option<String>,
  pub created_at:    DateTime<Utc>,
  pub updated_at:    DateTime<Utc>,
}

impl AdherenceRecord {
  /// Derived, never stored: a pending dose whose instant has passed.
  pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
    self.status == DoseStatus::Pending && now > self.scheduled_at
  }

  fn guard(&self, user: Uuid, to: DoseStatus) -> Result<()> {
    if user != self.user_id {
      return Err(Error::Unauthorized { record: self.record_id, user });
    }
    match self.status {
      DoseStatus::Pending | DoseStatus::Missed => Ok(()),
      from => Err(Error::InvalidStateTransition { from, to }),
    }
  }

  /// `Pending`/`Missed` → `Taken`. Confirming a missed dose late is
  /// allowed; re-confirming a taken or skipped dose is not.
  pub fn confirm(&mut self, user: Uuid, now: DateTime<Utc>) -> Result<()> {
    self.guard(user, DoseStatus::Taken)?;
    self.status = DoseStatus::Taken;
    self.taken_at = Some(now);
    self.updated_at = now;
    Ok(())
  }

  /// `Pending`/`Missed` → `Skipped`.
  pub fn skip(&mut self, user: Uuid, now: DateTime<Utc>) -> Result<()> {
    self.guard(user, DoseStatus::Skipped)?;
    self.status = DoseStatus::Skipped;
    self.updated_at = now;
    Ok(())
  }

  /// `Pending` → `Missed`; driven by the overdue sweep, not by users.
  pub fn mark_missed(&mut self, now: DateTime<Utc>) -> Result<()> {
    if self.status != DoseStatus::Pending {
      return Err(Error::InvalidStateTransition {
        from: self.status,
        to:   DoseStatus::Missed,
      });
    }
    self.status = DoseStatus::Missed;
    self.updated_at = now;
    Ok(())
  }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use super::*;
  use crate::clock::parse_timezone;

  fn record(user: Uuid) -> AdherenceRecord {
    let now = Utc::now();
    AdherenceRecord {
      record_id:     Uuid::new_v4(),
      user_id:       user,
      medication_id: Uuid::new_v4(),
      scheduled_at:  now,
      timezone:      parse_timezone("America/New_York").unwrap(),
      status:        DoseStatus::Pending,
      taken_at:      None,
      notes:         None,
      created_at:    now,
      updated_at:    now,
    }
  }

  #[test]
  fn confirm_from_pending_sets_taken_at() {
    let user = Uuid::new_v4();
    let mut r = record(user);
    let now = Utc::now();
    r.confirm(user, now).unwrap();
    assert_eq!(r.status, DoseStatus::Taken);
    assert_eq!(r.taken_at, Some(now));
  }

  #[test]
  fn confirm_after_missed_is_allowed() {
    let user = Uuid::new_v4();
    let mut r = record(user);
    r.mark_missed(Utc::now()).unwrap();
    r.confirm(user, Utc::now()).unwrap();
    assert_eq!(r.status, DoseStatus::Taken);
  }

  #[test]
  fn confirm_after_skipped_fails() {
    let user = Uuid::new_v4();
    let mut r = record(user);
    r.skip(user, Utc::now()).unwrap();
    let err = r.confirm(user, Utc::now()).unwrap_err();
    assert!(matches!(
      err,
      Error::InvalidStateTransition { from: DoseStatus::Skipped, .. }
    ));
  }

  #[test]
  fn double_confirm_fails() {
    let user = Uuid::new_v4();
    let mut r = record(user);
    r.confirm(user, Utc::now()).unwrap();
    assert!(r.confirm(user, Utc::now()).is_err());
  }

  #[test]
  fn wrong_user_is_unauthorized() {
    let mut r = record(Uuid::new_v4());
    let stranger = Uuid::new_v4();
    assert!(matches!(
      r.confirm(stranger, Utc::now()),
      Err(Error::Unauthorized { .. })
    ));
    assert_eq!(r.status, DoseStatus::Pending);
  }

  #[test]
  fn mark_missed_only_from_pending() {
    let user = Uuid::new_v4();
    let mut r = record(user);
    r.confirm(user, Utc::now()).unwrap();
    assert!(r.mark_missed(Utc::now()).is_err());
  }

  #[test]
  fn overdue_is_derived_from_pending_and_time() {
    let user = Uuid::new_v4();
    let mut r = record(user);
    let later = r.scheduled_at + chrono::Duration::minutes(1);
    assert!(r.is_overdue(later));
    r.confirm(user, later).unwrap();
    assert!(!r.is_overdue(later));
  }
}
