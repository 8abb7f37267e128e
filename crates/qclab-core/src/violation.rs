//! Recorded rule violations.
//!
//! A violation is written at most once per [`ViolationKey`]. After creation
//! only its operator [`Disposition`] ever changes.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use strum::{AsRefStr, Display, EnumString};

use crate::{limits::ControlContext, rule::Severity};

// ─── Key ─────────────────────────────────────────────────────────────────────

/// The uniqueness key of a violation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ViolationKey {
  pub context:     ControlContext,
  pub measured_on: NaiveDate,
  pub rule_code:   String,
}

impl ViolationKey {
  /// Stable id derived from the key fields; identical keys give identical
  /// ids, so it doubles as the stored primary key.
  pub fn digest(&self) -> String {
    let date = self.measured_on.to_string();
    let mut hasher = Sha256::new();
    for field in [
      self.context.lot_id.as_str(),
      self.context.instrument_id.as_str(),
      self.context.level_id.as_str(),
      self.context.analyte_id.as_str(),
      date.as_str(),
      self.rule_code.as_str(),
    ] {
      hasher.update((field.len() as u64).to_le_bytes());
      hasher.update(field.as_bytes());
    }
    hex::encode(hasher.finalize())
  }
}

// ─── Disposition ─────────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DispositionStatus {
  #[default]
  Pending,
  Approved,
  Rejected,
}

/// Operator follow-up on a violation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disposition {
  pub action:         Option<String>,
  pub assigned_staff: Option<String>,
  #[serde(default)]
  pub status:         DispositionStatus,
}

// ─── Violation ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
  /// [`ViolationKey::digest`] of `key`.
  pub violation_id: String,
  pub key:          ViolationKey,
  pub severity:     Severity,
  /// Human-readable description shown to the operator.
  pub content:      String,
  pub z_score:      Option<f64>,
  pub recorded_at:  DateTime<Utc>,
  pub disposition:  Disposition,
}

/// Result of [`crate::store::QualityStore::record_if_absent`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordOutcome {
  /// `false` when a violation with the same key already existed.
  pub created:   bool,
  /// The stored violation: the new one, or the pre-existing one.
  pub violation: Violation,
}

/// Parameters for [`crate::store::QualityStore::list_violations`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ViolationFilter {
  pub analyte_id:    Option<String>,
  pub lot_id:        Option<String>,
  pub instrument_id: Option<String>,
  pub level_id:      Option<String>,
  pub status:        Option<DispositionStatus>,
  pub limit:         Option<usize>,
}
