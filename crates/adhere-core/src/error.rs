//! Error types for `adhere-core`.

use thiserror::Error;
use uuid::Uuid;

use crate::{dose::DoseStatus, reminder::Channel};

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid time format: {0:?}")]
  InvalidTimeFormat(String),

  #[error("unknown IANA timezone: {0:?}")]
  UnknownTimezone(String),

  #[error("schedule is missing a start date")]
  MissingStartDate,

  #[error("invalid dose transition: {from} -> {to}")]
  InvalidStateTransition { from: DoseStatus, to: DoseStatus },

  #[error("record {record} does not belong to user {user}")]
  Unauthorized { record: Uuid, user: Uuid },

  #[error("{0} channel is already marked sent")]
  AlreadySent(Channel),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
