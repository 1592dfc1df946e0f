//! Error type for `adhere-store-sqlite`.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] adhere_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("column decode error: {0}")]
  Decode(String),

  #[error("adherence record not found: {0}")]
  RecordNotFound(Uuid),

  #[error("reminder not found: {0}")]
  ReminderNotFound(Uuid),

  /// An optimistic update matched zero rows — a concurrent writer got
  /// there first.
  #[error("stale write for {0}: row is no longer in the expected state")]
  StaleWrite(Uuid),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
