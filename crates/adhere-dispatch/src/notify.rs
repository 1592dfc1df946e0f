//! Notifier implementations shipped with the daemon.

use std::{convert::Infallible, future::Future};

use adhere_core::{notify::Notifier, reminder::Reminder};

/// Logs deliveries instead of sending them.
///
/// Transport integrations (SMTP, SMS gateways) live outside this engine;
/// the daemon runs on this stub until one is wired in, which keeps the
/// dispatch path — including per-channel state and retry bookkeeping —
/// fully exercisable.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
  type Error = Infallible;

  fn send_email<'a>(
    &'a self,
    reminder: &'a Reminder,
  ) -> impl Future<Output = Result<(), Infallible>> + Send + 'a {
    async move {
      tracing::info!(
        reminder = %reminder.reminder_id,
        user = %reminder.user_id,
        message = %reminder.message,
        "email reminder"
      );
      Ok(())
    }
  }

  fn send_sms<'a>(
    &'a self,
    reminder: &'a Reminder,
  ) -> impl Future<Output = Result<(), Infallible>> + Send + 'a {
    async move {
      tracing::info!(
        reminder = %reminder.reminder_id,
        user = %reminder.user_id,
        message = %reminder.message,
        "sms reminder"
      );
      Ok(())
    }
  }
}
