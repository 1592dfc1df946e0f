//! Adherence statistics: a single-pass, order-independent fold over
//! records reduced to their status and owning medication.

use std::collections::BTreeMap;

use serde::Serialize;
use uuid::Uuid;

use crate::dose::DoseStatus;

// ─── Ranking ─────────────────────────────────────────────────────────────────

/// Letter grade for an adherence rate. The thresholds are closed,
/// ordered, and gap-free: ≥90 A+, ≥80 A, ≥70 B, ≥60 C, ≥50 D, else E.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Ranking {
  APlus,
  A,
  B,
  C,
  D,
  E,
}

impl Ranking {
  pub fn from_rate(rate: f64) -> Self {
    if rate >= 90.0 {
      Self::APlus
    } else if rate >= 80.0 {
      Self::A
    } else if rate >= 70.0 {
      Self::B
    } else if rate >= 60.0 {
      Self::C
    } else if rate >= 50.0 {
      Self::D
    } else {
      Self::E
    }
  }

  pub fn grade(&self) -> &'static str {
    match self {
      Self::APlus => "A+",
      Self::A => "A",
      Self::B => "B",
      Self::C => "C",
      Self::D => "D",
      Self::E => "E",
    }
  }

  pub fn label(&self) -> &'static str {
    match self {
      Self::APlus => "Excellent",
      Self::A => "Great",
      Self::B => "Good",
      Self::C => "Fair",
      Self::D => "Needs Improvement",
      Self::E => "Poor",
    }
  }
}

// ─── Counters ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
  pub total:   u32,
  pub taken:   u32,
  pub missed:  u32,
  pub skipped: u32,
  pub pending: u32,
}

impl StatusCounts {
  fn add(&mut self, status: DoseStatus) {
    self.total += 1;
    match status {
      DoseStatus::Taken => self.taken += 1,
      DoseStatus::Missed => self.missed += 1,
      DoseStatus::Skipped => self.skipped += 1,
      DoseStatus::Pending => self.pending += 1,
    }
  }

  /// `taken / (taken + missed + skipped) × 100`, and `0.0` while no dose
  /// has been resolved yet — never NaN.
  pub fn adherence_rate(&self) -> f64 {
    let resolved = self.taken + self.missed + self.skipped;
    if resolved == 0 {
      return 0.0;
    }
    f64::from(self.taken) / f64::from(resolved) * 100.0
  }
}

// ─── Summary ─────────────────────────────────────────────────────────────────

/// One record reduced to what the fold needs. Medication names come from
/// the external catalog; this crate never resolves them itself.
#[derive(Debug, Clone)]
pub struct DoseSample {
  pub status:          DoseStatus,
  pub medication_id:   Uuid,
  pub medication_name: String,
}

/// Per-medication slice of the summary.
#[derive(Debug, Clone, Serialize)]
pub struct MedicationStats {
  pub name:   String,
  pub counts: StatusCounts,
}

impl MedicationStats {
  pub fn adherence_rate(&self) -> f64 { self.counts.adherence_rate() }
}

/// The aggregate adherence report.
#[derive(Debug, Clone, Serialize)]
pub struct AdherenceSummary {
  pub counts:         StatusCounts,
  pub adherence_rate: f64,
  pub ranking:        Ranking,
  pub by_medication:  BTreeMap<Uuid, MedicationStats>,
}

/// Fold `rows` into overall and per-medication counters in one pass.
/// The result is independent of input order.
pub fn summarize<I>(rows: I) -> AdherenceSummary
where
  I: IntoIterator<Item = DoseSample>,
{
  let mut counts = StatusCounts::default();
  let mut by_medication: BTreeMap<Uuid, MedicationStats> = BTreeMap::new();

  for row in rows {
    counts.add(row.status);
    by_medication
      .entry(row.medication_id)
      .or_insert_with(|| MedicationStats {
        name:   row.medication_name.clone(),
        counts: StatusCounts::default(),
      })
      .counts
      .add(row.status);
  }

  let adherence_rate = counts.adherence_rate();
  AdherenceSummary {
    counts,
    adherence_rate,
    ranking: Ranking::from_rate(adherence_rate),
    by_medication,
  }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
