//! Reminders — notification intents, correlated with adherence records
//! by `(medication_id, scheduled_at)` but never foreign-keyed to them.
//!
//! Delivery state lives per channel; the aggregate status is promoted to
//! `Sent` only once no enabled channel remains unsent.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// Delivery attempts stop once this many failures have accumulated.
pub const MAX_DELIVERY_RETRIES: u8 = 3;

// ─── Channels ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
  Email,
  Sms,
}

impl Channel {
  /// Fixed evaluation order for dispatch.
  pub const ALL: [Channel; 2] = [Channel::Email, Channel::Sms];
}

impl fmt::Display for Channel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Self::Email => "email",
      Self::Sms => "sms",
    })
  }
}

/// Delivery bookkeeping for a single channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelState {
  pub enabled: bool,
  pub sent:    bool,
  pub sent_at: Option<DateTime<Utc>>,
}

impl ChannelState {
  pub fn enabled() -> Self {
    Self { enabled: true, sent: false, sent_at: None }
  }

  pub fn disabled() -> Self {
    Self { enabled: false, sent: false, sent_at: None }
  }

  /// A disabled channel never blocks the aggregate status.
  pub fn satisfied(&self) -> bool { !self.enabled || self.sent }
}

// ─── Status ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReminderStatus {
  Pending,
  Sent,
  Failed,
}

impl fmt::Display for ReminderStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Self::Pending => "pending",
      Self::Sent => "sent",
      Self::Failed => "failed",
    })
  }
}

// ─── Reminder ────────────────────────────────────────────────────────────────

/// A notification intent for one scheduled dose.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reminder {
  pub reminder_id:   Uuid,
  pub user_id:       Uuid,
  pub medication_id: Uuid,
  /// UTC instant the reminder is due.
  pub scheduled_at:  DateTime<Utc>,
  pub message:       String,
  pub email:         ChannelState,
  pub sms:           ChannelState,
  pub status:        ReminderStatus,
  /// Cumulative delivery failures, 0 to [`MAX_DELIVERY_RETRIES`].
  pub retry_count:   u8,
  pub last_retry_at: Option<DateTime<Utc>>,
  pub created_at:    DateTime<Utc>,
  pub updated_at:    DateTime<Utc>,
}

impl Reminder {
  pub fn new(
    user_id: Uuid,
    medication_id: Uuid,
    scheduled_at: DateTime<Utc>,
    message: impl Into<String>,
    email_enabled: bool,
    sms_enabled: bool,
    now: DateTime<Utc>,
  ) -> Self {
    let channel = |on| {
      if on { ChannelState::enabled() } else { ChannelState::disabled() }
    };
    Self {
      reminder_id: Uuid::new_v4(),
      user_id,
      medication_id,
      scheduled_at,
      message: message.into(),
      email: channel(email_enabled),
      sms: channel(sms_enabled),
      status: ReminderStatus::Pending,
      retry_count: 0,
      last_retry_at: None,
      created_at: now,
      updated_at: now,
    }
  }

  pub fn channel(&self, channel: Channel) -> &ChannelState {
    match channel {
      Channel::Email => &self.email,
      Channel::Sms => &self.sms,
    }
  }

  fn channel_mut(&mut self, channel: Channel) -> &mut ChannelState {
    match channel {
      Channel::Email => &mut self.email,
      Channel::Sms => &mut self.sms,
    }
  }

  /// Enabled channels that have not been delivered yet, in [`Channel::ALL`]
  /// order.
  pub fn unsent_channels(&self) -> Vec<Channel> {
    Channel::ALL
      .into_iter()
      .filter(|c| {
        let state = self.channel(*c);
        state.enabled && !state.sent
      })
      .collect()
  }

  /// Every enabled channel has been delivered.
  pub fn fully_sent(&self) -> bool {
    self.email.satisfied() && self.sms.satisfied()
  }

  /// Record a successful delivery on `channel`.
  ///
  /// The aggregate status flips to `Sent` only when no enabled channel
  /// remains unsent; until then the partial-send state is visible through
  /// the channel flags alone.
  pub fn mark_sent(&mut self, channel: Channel, now: DateTime<Utc>) -> Result<()> {
    let state = self.channel_mut(channel);
    if state.sent {
      return Err(Error::AlreadySent(channel));
    }
    state.sent = true;
    state.sent_at = Some(now);
    if self.fully_sent() {
      self.status = ReminderStatus::Sent;
    }
    self.updated_at = now;
    Ok(())
  }

  /// Record a delivery failure. Retry accounting is cumulative across
  /// channels; after [`MAX_DELIVERY_RETRIES`] failures the reminder stays
  /// `Failed` for manual intervention.
  pub fn mark_failed(&mut self, now: DateTime<Utc>) {
    self.status = ReminderStatus::Failed;
    self.retry_count = self.retry_count.saturating_add(1).min(MAX_DELIVERY_RETRIES);
    self.last_retry_at = Some(now);
    self.updated_at = now;
  }

  pub fn can_retry(&self) -> bool {
    self.status == ReminderStatus::Failed
      && self.retry_count < MAX_DELIVERY_RETRIES
  }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
