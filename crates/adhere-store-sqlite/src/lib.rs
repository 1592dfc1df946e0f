//! SQLite backend for the Adhere stores.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated
//! thread without blocking the async runtime. Implements every trait the
//! engine consumes: [`adhere_core::store::AdherenceStore`],
//! [`adhere_core::store::ReminderStore`],
//! [`adhere_core::store::ScheduleSource`], and
//! [`adhere_core::notify::EntitlementProvider`].

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
