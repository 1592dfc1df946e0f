//! `adhered` — the Adhere dispatch daemon.
//!
//! Reads `config.toml` (or the path given with `--config`), opens the
//! SQLite store, and runs the reminder dispatcher on a fixed cadence
//! until ctrl-c. With `top_up` enabled it also re-expands every stored
//! schedule before each tick.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use chrono::{Duration, Utc};
use clap::Parser;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use adhere_dispatch::{
  DaemonConfig,
  dispatcher::{DispatchConfig, Dispatcher},
  doses, generate,
  notify::LogNotifier,
};
use adhere_store_sqlite::SqliteStore;

#[derive(Parser)]
#[command(author, version, about = "Adhere reminder dispatch daemon")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Run a single tick and exit.
  #[arg(long)]
  once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  // Load configuration.
  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("ADHERE"))
    .build()
    .context("failed to read config file")?;

  let daemon_cfg: DaemonConfig = settings
    .try_deserialize()
    .context("failed to deserialise DaemonConfig")?;

  // Expand `~` in store path.
  let store_path = expand_tilde(&daemon_cfg.store_path);

  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  // The store doubles as the entitlement provider: the billing system
  // writes the entitlements table, we only read it.
  let dispatcher = Dispatcher::new(
    store.clone(),
    LogNotifier,
    store.clone(),
    DispatchConfig {
      window:      Duration::minutes(daemon_cfg.window_minutes),
      user_filter: None,
    },
  );

  tracing::info!(
    store = %store_path.display(),
    cadence_minutes = daemon_cfg.cadence_minutes,
    window_minutes = daemon_cfg.window_minutes,
    top_up = daemon_cfg.top_up,
    "dispatcher started"
  );

  let mut ticker = tokio::time::interval(std::time::Duration::from_secs(
    daemon_cfg.cadence_minutes * 60,
  ));

  loop {
    tokio::select! {
      _ = ticker.tick() => {
        let now = Utc::now();

        if daemon_cfg.top_up {
          match generate::top_up(&store, &store, now).await {
            Ok(created) if created > 0 => {
              tracing::info!(created, "top-up generated records");
            }
            Ok(_) => {}
            Err(e) => tracing::error!(error = %e, "top-up failed"),
          }
        }

        if let Some(grace) = daemon_cfg.missed_grace_minutes {
          let grace = Duration::minutes(grace);
          if let Err(e) = doses::sweep_missed(&store, None, grace, now).await {
            tracing::error!(error = %e, "missed sweep failed");
          }
        }

        match dispatcher.run_once(now).await {
          Ok(summary) => tracing::info!(
            processed = summary.processed,
            sent = summary.sent,
            failed = summary.failed,
            "tick"
          ),
          Err(e) => tracing::error!(error = %e, "dispatch run failed"),
        }

        if cli.once {
          break;
        }
      }
      _ = tokio::signal::ctrl_c() => {
        tracing::info!("shutting down");
        break;
      }
    }
  }

  Ok(())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
