//! Core types and trait definitions for the Adhere medication-adherence
//! engine.
//!
//! This crate is deliberately free of database and transport dependencies.
//! All other crates depend on it; it owns the time normaliser, the
//! recurrence expander, the dose and reminder state machines, the stats
//! fold, and the traits that storage and delivery backends implement.

pub mod clock;
pub mod dose;
pub mod error;
pub mod expand;
pub mod notify;
pub mod reminder;
pub mod schedule;
pub mod stats;
pub mod store;

pub use error::{Error, Result};
