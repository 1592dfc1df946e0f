//! The periodic reminder dispatcher.
//!
//! Invoked on an external cadence (the daemon's interval, a cron job, a
//! test). Each run scans a bounded future window, gates candidates on
//! subscription entitlement, pushes due channels through the notifier,
//! and records every outcome per item — so a crash mid-batch never
//! re-sends an already-delivered channel.

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use adhere_core::{
  notify::{EntitlementProvider, Notifier},
  reminder::{Channel, Reminder},
  store::ReminderStore,
};

use crate::error::{EngineError, Result};

// ─── Configuration ───────────────────────────────────────────────────────────

/// Dispatch tuning, passed in at construction.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
  /// Length of the future window scanned per run.
  pub window:      Duration,
  /// Restrict dispatch to a single user (`None` = everyone).
  pub user_filter: Option<Uuid>,
}

impl Default for DispatchConfig {
  fn default() -> Self {
    Self { window: Duration::minutes(5), user_filter: None }
  }
}

/// What one run did. Entitlement skips count toward `processed` only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
  pub processed: u32,
  pub sent:      u32,
  pub failed:    u32,
}

enum Outcome {
  Sent,
  Failed,
  Skipped,
}

// ─── Dispatcher ──────────────────────────────────────────────────────────────

/// A single dispatcher instance over a reminder store, a notifier, and an
/// entitlement provider.
pub struct Dispatcher<R, N, E> {
  reminders:    R,
  notifier:     N,
  entitlements: E,
  config:       DispatchConfig,
  /// Serialises overlapping external triggers. The window query stays
  /// the sole idempotency mechanism; the lock only prevents two runs
  /// from racing the same rows.
  run_lock:     Mutex<()>,
}

impl<R, N, E> Dispatcher<R, N, E>
where
  R: ReminderStore,
  N: Notifier,
  E: EntitlementProvider,
{
  pub fn new(
    reminders: R,
    notifier: N,
    entitlements: E,
    config: DispatchConfig,
  ) -> Self {
    Self {
      reminders,
      notifier,
      entitlements,
      config,
      run_lock: Mutex::new(()),
    }
  }

  /// One dispatch run over `[now, now + window)`.
  ///
  /// Errs only if the window query itself fails — nothing was processed
  /// and the caller just waits for the next tick. Every per-item error is
  /// contained, recorded, and counted, so one bad reminder never breaks
  /// the cadence.
  pub async fn run_once(&self, now: DateTime<Utc>) -> Result<DispatchSummary> {
    let _guard = self.run_lock.lock().await;

    let due = self
      .reminders
      .due_in_window(self.config.user_filter, now, now + self.config.window)
      .await
      .map_err(EngineError::store)?;

    let mut summary = DispatchSummary::default();
    for reminder in due {
      summary.processed += 1;
      match self.dispatch_one(&reminder, now).await {
        Outcome::Sent => summary.sent += 1,
        Outcome::Failed => summary.failed += 1,
        Outcome::Skipped => {}
      }
    }

    tracing::info!(
      processed = summary.processed,
      sent = summary.sent,
      failed = summary.failed,
      "dispatch run complete"
    );
    Ok(summary)
  }

  async fn dispatch_one(&self, reminder: &Reminder, now: DateTime<Utc>) -> Outcome {
    // Policy gate first: a lapsed subscription is a skip, not a failure,
    // and never touches retry bookkeeping.
    match self.entitlements.is_active_premium(reminder.user_id).await {
      Ok(true) => {}
      Ok(false) => {
        tracing::info!(
          reminder = %reminder.reminder_id,
          user = %reminder.user_id,
          "skipping reminder for non-entitled user"
        );
        return Outcome::Skipped;
      }
      Err(e) => {
        tracing::warn!(
          reminder = %reminder.reminder_id,
          error = %e,
          "entitlement lookup failed"
        );
        return Outcome::Failed;
      }
    }

    let channels = reminder.unsent_channels();
    if channels.is_empty() {
      // The window query should never hand us one of these.
      return Outcome::Skipped;
    }

    for channel in channels {
      let attempt = match channel {
        Channel::Email => self.notifier.send_email(reminder).await,
        Channel::Sms => self.notifier.send_sms(reminder).await,
      };

      match attempt {
        Ok(()) => {
          match self.reminders.mark_sent(reminder.reminder_id, channel, now).await {
            Ok(_) => {
              tracing::debug!(
                reminder = %reminder.reminder_id,
                %channel,
                "channel delivered"
              );
            }
            Err(e) => {
              // Lost a race with a concurrent run; the channel is already
              // recorded as sent and there is nothing to repair.
              tracing::warn!(
                reminder = %reminder.reminder_id,
                %channel,
                error = %e,
                "mark_sent conflict"
              );
            }
          }
        }
        Err(e) => {
          tracing::warn!(
            reminder = %reminder.reminder_id,
            %channel,
            error = %e,
            "delivery failed"
          );
          if let Err(e) =
            self.reminders.mark_failed(reminder.reminder_id, now).await
          {
            tracing::error!(
              reminder = %reminder.reminder_id,
              error = %e,
              "could not record delivery failure"
            );
          }
          // Remaining channels wait for the retry; move on to the next
          // reminder.
          return Outcome::Failed;
        }
      }
    }

    Outcome::Sent
  }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use std::{
    convert::Infallible,
    future::Future,
    sync::{
      Mutex as StdMutex,
      atomic::{AtomicBool, Ordering},
    },
  };

  use adhere_core::notify::Entitlement;
  use adhere_store_sqlite::SqliteStore;
  use thiserror::Error;

  use super::*;

  #[derive(Debug, Error)]
  #[error("stub delivery failure")]
  struct StubFailure;

  /// Records every delivery; individual channels can be told to fail.
  #[derive(Default)]
  struct StubNotifier {
    fail_email: AtomicBool,
    fail_sms:   AtomicBool,
    delivered:  StdMutex<Vec<(Uuid, Channel)>>,
  }

  impl StubNotifier {
    fn deliveries(&self) -> Vec<(Uuid, Channel)> {
      self.delivered.lock().unwrap().clone()
    }

    fn attempt(
      &self,
      reminder: &Reminder,
      channel: Channel,
      fail: bool,
    ) -> std::result::Result<(), StubFailure> {
      if fail {
        return Err(StubFailure);
      }
      self
        .delivered
        .lock()
        .unwrap()
        .push((reminder.reminder_id, channel));
      Ok(())
    }
  }

  impl Notifier for &StubNotifier {
    type Error = StubFailure;

    fn send_email<'a>(
      &'a self,
      reminder: &'a Reminder,
    ) -> impl Future<Output = std::result::Result<(), StubFailure>> + Send + 'a
    {
      async move {
        self.attempt(reminder, Channel::Email, self.fail_email.load(Ordering::SeqCst))
      }
    }

    fn send_sms<'a>(
      &'a self,
      reminder: &'a Reminder,
    ) -> impl Future<Output = std::result::Result<(), StubFailure>> + Send + 'a
    {
      async move {
        self.attempt(reminder, Channel::Sms, self.fail_sms.load(Ordering::SeqCst))
      }
    }
  }

  /// Entitles everyone.
  struct AllPremium;

  impl EntitlementProvider for AllPremium {
    type Error = Infallible;

    fn is_active_premium(
      &self,
      _user_id: Uuid,
    ) -> impl Future<Output = std::result::Result<bool, Infallible>> + Send + '_
    {
      async { Ok(true) }
    }
  }

  async fn store() -> SqliteStore {
    SqliteStore::open_in_memory().await.unwrap()
  }

  fn due_reminder(
    user: Uuid,
    now: DateTime<Utc>,
    email: bool,
    sms: bool,
  ) -> Reminder {
    Reminder::new(
      user,
      Uuid::new_v4(),
      now + Duration::minutes(3),
      "time for your dose",
      email,
      sms,
      now,
    )
  }

  #[tokio::test]
  async fn window_includes_three_minutes_excludes_ten() {
    let s = store().await;
    let now = Utc::now();
    let user = Uuid::new_v4();

    let near = due_reminder(user, now, true, false);
    let mut far = due_reminder(user, now, true, false);
    far.scheduled_at = now + Duration::minutes(10);
    s.insert_reminder(near.clone()).await.unwrap();
    s.insert_reminder(far).await.unwrap();

    let notifier = StubNotifier::default();
    let d = Dispatcher::new(
      s.clone(),
      &notifier,
      AllPremium,
      DispatchConfig::default(),
    );
    let summary = d.run_once(now).await.unwrap();

    assert_eq!(summary, DispatchSummary { processed: 1, sent: 1, failed: 0 });
    assert_eq!(notifier.deliveries(), vec![(near.reminder_id, Channel::Email)]);
  }

  #[tokio::test]
  async fn second_tick_does_not_resend() {
    let s = store().await;
    let now = Utc::now();
    let r = due_reminder(Uuid::new_v4(), now, true, true);
    s.insert_reminder(r).await.unwrap();

    let notifier = StubNotifier::default();
    let d = Dispatcher::new(
      s.clone(),
      &notifier,
      AllPremium,
      DispatchConfig::default(),
    );

    let first = d.run_once(now).await.unwrap();
    assert_eq!(first, DispatchSummary { processed: 1, sent: 1, failed: 0 });
    assert_eq!(notifier.deliveries().len(), 2);

    let second = d.run_once(now).await.unwrap();
    assert_eq!(second, DispatchSummary::default());
    assert_eq!(notifier.deliveries().len(), 2);
  }

  #[tokio::test]
  async fn non_entitled_user_is_skipped_without_failure() {
    let s = store().await;
    let now = Utc::now();
    let r = due_reminder(Uuid::new_v4(), now, true, false);
    s.insert_reminder(r).await.unwrap();

    // The sqlite store doubles as the entitlement provider; this user has
    // no entitlement row.
    let notifier = StubNotifier::default();
    let d = Dispatcher::new(
      s.clone(),
      &notifier,
      s.clone(),
      DispatchConfig::default(),
    );
    let summary = d.run_once(now).await.unwrap();

    assert_eq!(summary, DispatchSummary { processed: 1, sent: 0, failed: 0 });
    assert!(notifier.deliveries().is_empty());
  }

  #[tokio::test]
  async fn entitled_user_via_store_provider_is_dispatched() {
    let s = store().await;
    let now = Utc::now();
    let user = Uuid::new_v4();
    s.upsert_entitlement(Entitlement {
      user_id:    user,
      active:     true,
      expires_at: now + Duration::days(30),
    })
    .await
    .unwrap();
    s.insert_reminder(due_reminder(user, now, true, false)).await.unwrap();

    let notifier = StubNotifier::default();
    let d = Dispatcher::new(
      s.clone(),
      &notifier,
      s.clone(),
      DispatchConfig::default(),
    );
    let summary = d.run_once(now).await.unwrap();
    assert_eq!(summary, DispatchSummary { processed: 1, sent: 1, failed: 0 });
  }

  #[tokio::test]
  async fn one_failure_does_not_abort_the_batch() {
    let s = store().await;
    let now = Utc::now();

    // Email fails for everyone; the sms-only reminder still goes out.
    let email_only = due_reminder(Uuid::new_v4(), now, true, false);
    let sms_only = due_reminder(Uuid::new_v4(), now, false, true);
    s.insert_reminder(email_only.clone()).await.unwrap();
    s.insert_reminder(sms_only.clone()).await.unwrap();

    let notifier = StubNotifier::default();
    notifier.fail_email.store(true, Ordering::SeqCst);

    let d = Dispatcher::new(
      s.clone(),
      &notifier,
      AllPremium,
      DispatchConfig::default(),
    );
    let summary = d.run_once(now).await.unwrap();

    assert_eq!(summary, DispatchSummary { processed: 2, sent: 1, failed: 1 });
    assert_eq!(
      notifier.deliveries(),
      vec![(sms_only.reminder_id, Channel::Sms)]
    );

    let failed = s.reminder(email_only.reminder_id).await.unwrap().unwrap();
    assert_eq!(failed.retry_count, 1);
    assert!(failed.can_retry());
  }

  #[tokio::test]
  async fn partial_send_retries_only_the_unsent_channel() {
    let s = store().await;
    let now = Utc::now();
    let r = due_reminder(Uuid::new_v4(), now, true, true);
    s.insert_reminder(r.clone()).await.unwrap();

    let notifier = StubNotifier::default();
    notifier.fail_sms.store(true, Ordering::SeqCst);

    let d = Dispatcher::new(
      s.clone(),
      &notifier,
      AllPremium,
      DispatchConfig::default(),
    );

    // Email lands, sms fails, the reminder is failed-with-retries-left.
    let first = d.run_once(now).await.unwrap();
    assert_eq!(first, DispatchSummary { processed: 1, sent: 0, failed: 1 });

    // Transport recovers; only the sms channel is attempted again.
    notifier.fail_sms.store(false, Ordering::SeqCst);
    let second = d.run_once(now).await.unwrap();
    assert_eq!(second, DispatchSummary { processed: 1, sent: 1, failed: 0 });

    let deliveries = notifier.deliveries();
    assert_eq!(
      deliveries,
      vec![(r.reminder_id, Channel::Email), (r.reminder_id, Channel::Sms)]
    );

    let done = s.reminder(r.reminder_id).await.unwrap().unwrap();
    assert_eq!(done.status, adhere_core::reminder::ReminderStatus::Sent);
  }

  #[tokio::test]
  async fn retries_stop_after_three_failures() {
    let s = store().await;
    let now = Utc::now();
    let r = due_reminder(Uuid::new_v4(), now, true, false);
    s.insert_reminder(r.clone()).await.unwrap();

    let notifier = StubNotifier::default();
    notifier.fail_email.store(true, Ordering::SeqCst);

    let d = Dispatcher::new(
      s.clone(),
      &notifier,
      AllPremium,
      DispatchConfig::default(),
    );

    for _ in 0..3 {
      let summary = d.run_once(now).await.unwrap();
      assert_eq!(summary.failed, 1);
    }

    // Retry budget exhausted: the reminder is no longer selected.
    let summary = d.run_once(now).await.unwrap();
    assert_eq!(summary, DispatchSummary::default());

    let exhausted = s.reminder(r.reminder_id).await.unwrap().unwrap();
    assert_eq!(exhausted.retry_count, 3);
    assert!(!exhausted.can_retry());
  }

  #[tokio::test]
  async fn user_filter_restricts_the_batch() {
    let s = store().await;
    let now = Utc::now();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    s.insert_reminder(due_reminder(alice, now, true, false)).await.unwrap();
    s.insert_reminder(due_reminder(bob, now, true, false)).await.unwrap();

    let notifier = StubNotifier::default();
    let d = Dispatcher::new(
      s.clone(),
      &notifier,
      AllPremium,
      DispatchConfig { user_filter: Some(alice), ..Default::default() },
    );
    let summary = d.run_once(now).await.unwrap();
    assert_eq!(summary, DispatchSummary { processed: 1, sent: 1, failed: 0 });
  }
}
