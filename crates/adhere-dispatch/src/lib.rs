//! Service layer for the Adhere engine: dose generation, dose
//! state-machine operations, and the periodic reminder dispatcher.
//!
//! Everything here is generic over the traits in [`adhere_core`];
//! the daemon binary wires them to the SQLite store.

pub mod dispatcher;
pub mod doses;
pub mod error;
pub mod generate;
pub mod notify;

pub use error::EngineError;

use std::path::PathBuf;

use serde::Deserialize;

// ─── Configuration ───────────────────────────────────────────────────────────

/// Runtime daemon configuration, deserialised from `config.toml`
/// (overridable with `ADHERE_*` environment variables).
#[derive(Debug, Clone, Deserialize)]
pub struct DaemonConfig {
  pub store_path:      PathBuf,
  /// Minutes between dispatch ticks.
  #[serde(default = "default_cadence_minutes")]
  pub cadence_minutes: u64,
  /// Length of the future window each tick scans.
  #[serde(default = "default_window_minutes")]
  pub window_minutes:  i64,
  /// Re-expand every stored schedule before each tick.
  #[serde(default)]
  pub top_up:          bool,
  /// Move pending doses older than this many minutes to `missed` before
  /// each tick. `None` disables the sweep.
  #[serde(default)]
  pub missed_grace_minutes: Option<i64>,
}

fn default_cadence_minutes() -> u64 { 5 }

fn default_window_minutes() -> i64 { 5 }
