//! Outbound delivery and entitlement abstractions.
//!
//! Transport internals (SMTP, SMS gateways, push) live outside this
//! engine; the dispatcher only ever sees per-attempt success or failure.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::reminder::Reminder;

// ─── Entitlement ─────────────────────────────────────────────────────────────

/// A subscription fact consumed, never owned, by this engine. Written by
/// the external billing system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entitlement {
  pub user_id:    Uuid,
  pub active:     bool,
  pub expires_at: DateTime<Utc>,
}

impl Entitlement {
  /// Reminder delivery is gated on this.
  pub fn grants_delivery(&self, now: DateTime<Utc>) -> bool {
    self.active && now < self.expires_at
  }
}

// ─── Traits ──────────────────────────────────────────────────────────────────

/// Delivery transport. A disabled channel is never offered to the
/// notifier.
pub trait Notifier: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn send_email<'a>(
    &'a self,
    reminder: &'a Reminder,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  fn send_sms<'a>(
    &'a self,
    reminder: &'a Reminder,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;
}

/// Subscription gate for reminder delivery.
pub trait EntitlementProvider: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn is_active_premium(
    &self,
    user_id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use chrono::Duration;

  use super::*;

  #[test]
  fn entitlement_requires_active_and_unexpired() {
    let now = Utc::now();
    let mut e = Entitlement {
      user_id:    Uuid::new_v4(),
      active:     true,
      expires_at: now + Duration::days(30),
    };
    assert!(e.grants_delivery(now));

    e.active = false;
    assert!(!e.grants_delivery(now));

    e.active = true;
    e.expires_at = now - Duration::seconds(1);
    assert!(!e.grants_delivery(now));
  }

  #[test]
  fn expiry_boundary_is_exclusive() {
    let now = Utc::now();
    let e = Entitlement {
      user_id:    Uuid::new_v4(),
      active:     true,
      expires_at: now,
    };
    assert!(!e.grants_delivery(now));
  }
}
