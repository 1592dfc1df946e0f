//! Service-layer error type.

use thiserror::Error;
use uuid::Uuid;

/// An error returned by a service operation.
#[derive(Debug, Error)]
pub enum EngineError {
  #[error("adherence record not found: {0}")]
  NotFound(Uuid),

  #[error(transparent)]
  Domain(#[from] adhere_core::Error),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl EngineError {
  pub(crate) fn store<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    EngineError::Store(Box::new(e))
  }
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
