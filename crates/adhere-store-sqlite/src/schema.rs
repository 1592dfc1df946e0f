//! SQL schema for the Adhere SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated
//! on `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Recurrence definitions. Written by the owning application at
-- medication registration, read-only to the engine. Deleting a row stops
-- future generation; existing records are untouched.
CREATE TABLE IF NOT EXISTS schedules (
    schedule_id   TEXT PRIMARY KEY,
    user_id       TEXT NOT NULL,
    medication_id TEXT NOT NULL UNIQUE,
    timezone      TEXT NOT NULL,   -- IANA zone name
    start_date    TEXT NOT NULL,   -- local calendar date, YYYY-MM-DD
    end_date      TEXT,
    times         TEXT NOT NULL,   -- JSON array of 'HH:MM'
    days_of_week  TEXT NOT NULL DEFAULT '[]',  -- JSON array of weekday names
    created_at    TEXT NOT NULL
);

-- One row per expected dose. Generation may be re-run at any time; the
-- UNIQUE pair makes re-expansion a no-op for instants that already exist.
CREATE TABLE IF NOT EXISTS adherence_records (
    record_id     TEXT PRIMARY KEY,
    user_id       TEXT NOT NULL,
    medication_id TEXT NOT NULL,
    scheduled_at  TEXT NOT NULL,   -- RFC 3339 UTC, fixed precision
    timezone      TEXT NOT NULL,   -- zone captured at generation time
    status        TEXT NOT NULL DEFAULT 'pending',
    taken_at      TEXT,
    notes         TEXT,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL,
    UNIQUE (medication_id, scheduled_at)
);

CREATE TABLE IF NOT EXISTS reminders (
    reminder_id   TEXT PRIMARY KEY,
    user_id       TEXT NOT NULL,
    medication_id TEXT NOT NULL,
    scheduled_at  TEXT NOT NULL,
    message       TEXT NOT NULL,
    email_enabled INTEGER NOT NULL DEFAULT 1,
    email_sent    INTEGER NOT NULL DEFAULT 0,
    email_sent_at TEXT,
    sms_enabled   INTEGER NOT NULL DEFAULT 0,
    sms_sent      INTEGER NOT NULL DEFAULT 0,
    sms_sent_at   TEXT,
    status        TEXT NOT NULL DEFAULT 'pending',
    retry_count   INTEGER NOT NULL DEFAULT 0,
    last_retry_at TEXT,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);

-- Written by the external billing system; read-only here.
CREATE TABLE IF NOT EXISTS entitlements (
    user_id    TEXT PRIMARY KEY,
    active     INTEGER NOT NULL,
    expires_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS records_user_idx   ON adherence_records(user_id);
CREATE INDEX IF NOT EXISTS records_status_idx ON adherence_records(status, scheduled_at);
CREATE INDEX IF NOT EXISTS reminders_user_idx ON reminders(user_id);
CREATE INDEX IF NOT EXISTS reminders_due_idx  ON reminders(status, scheduled_at);

PRAGMA user_version = 1;
";
