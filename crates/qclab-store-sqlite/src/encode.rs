//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC strings so that they
//! sort lexically. Calendar dates are `YYYY-MM-DD`. Enum-like fields use
//! their lowercase names; level lists are compact JSON arrays.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use qclab_core::{
  limits::ControlContext,
  measurement::MeasurementPoint,
  rule::{RuleConfig, Severity},
  violation::{Disposition, DispositionStatus, Violation, ViolationKey},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::Decode(format!("timestamp {s:?}: {e}")))
}

// ─── NaiveDate ───────────────────────────────────────────────────────────────

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d")
    .map_err(|e| Error::Decode(format!("date {s:?}: {e}")))
}

// ─── Enums ───────────────────────────────────────────────────────────────────

pub fn decode_severity(s: &str) -> Result<Severity> {
  Severity::from_str(s)
    .map_err(|_| Error::Core(qclab_core::Error::UnknownSeverity(s.to_owned())))
}

pub fn decode_status(s: &str) -> Result<DispositionStatus> {
  DispositionStatus::from_str(s)
    .map_err(|_| Error::Decode(format!("unknown disposition status: {s:?}")))
}

// ─── Level lists ─────────────────────────────────────────────────────────────

pub fn encode_levels(levels: &[String]) -> Result<String> {
  Ok(serde_json::to_string(levels)?)
}

pub fn decode_levels(s: &str) -> Result<Vec<String>> {
  Ok(serde_json::from_str(s)?)
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw values read directly from a `control_rules` row.
pub struct RawRule {
  pub code:                   String,
  pub severity:               String,
  pub window_size:            i64,
  pub threshold_sd:           Option<f64>,
  pub consecutive_points:     Option<i64>,
  pub same_side:              bool,
  pub opposite_sides:         bool,
  pub sum_abs_z_greater_than: Option<f64>,
  pub active:                 bool,
  pub applies_to_levels:      String,
}

pub const RULE_COLUMNS: &str = "code, severity, window_size, threshold_sd, \
  consecutive_points, same_side, opposite_sides, sum_abs_z_greater_than, \
  active, applies_to_levels";

impl RawRule {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      code:                   row.get(0)?,
      severity:               row.get(1)?,
      window_size:            row.get(2)?,
      threshold_sd:           row.get(3)?,
      consecutive_points:     row.get(4)?,
      same_side:              row.get(5)?,
      opposite_sides:         row.get(6)?,
      sum_abs_z_greater_than: row.get(7)?,
      active:                 row.get(8)?,
      applies_to_levels:      row.get(9)?,
    })
  }

  pub fn into_config(self) -> Result<RuleConfig> {
    let count = |n: i64, what: &str| {
      usize::try_from(n)
        .map_err(|_| Error::Decode(format!("negative {what} for rule {:?}", self.code)))
    };
    Ok(RuleConfig {
      severity:               decode_severity(&self.severity)?,
      window_size:            count(self.window_size, "window_size")?,
      threshold_sd:           self.threshold_sd,
      consecutive_points:     self
        .consecutive_points
        .map(|n| count(n, "consecutive_points"))
        .transpose()?,
      same_side:              self.same_side,
      opposite_sides:         self.opposite_sides,
      sum_abs_z_greater_than: self.sum_abs_z_greater_than,
      active:                 self.active,
      applies_to_levels:      decode_levels(&self.applies_to_levels)?,
      code:                   self.code,
    })
  }
}

/// Raw values read directly from a `measurements` row.
pub struct RawMeasurement {
  pub measurement_id: String,
  pub analyte_id:     String,
  pub lot_id:         String,
  pub instrument_id:  String,
  pub level_id:       String,
  pub value:          f64,
  pub measured_on:    String,
  pub recorded_at:    String,
}

pub const MEASUREMENT_COLUMNS: &str = "measurement_id, analyte_id, lot_id, \
  instrument_id, level_id, value, measured_on, recorded_at";

impl RawMeasurement {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      measurement_id: row.get(0)?,
      analyte_id:     row.get(1)?,
      lot_id:         row.get(2)?,
      instrument_id:  row.get(3)?,
      level_id:       row.get(4)?,
      value:          row.get(5)?,
      measured_on:    row.get(6)?,
      recorded_at:    row.get(7)?,
    })
  }

  pub fn into_point(self) -> Result<MeasurementPoint> {
    Ok(MeasurementPoint {
      measurement_id: decode_uuid(&self.measurement_id)?,
      context:        ControlContext {
        analyte_id:    self.analyte_id,
        lot_id:        self.lot_id,
        instrument_id: self.instrument_id,
        level_id:      self.level_id,
      },
      value:          self.value,
      measured_on:    decode_date(&self.measured_on)?,
      recorded_at:    decode_dt(&self.recorded_at)?,
    })
  }
}

/// Raw values read directly from a `violations` row.
pub struct RawViolation {
  pub violation_id:   String,
  pub analyte_id:     String,
  pub lot_id:         String,
  pub instrument_id:  String,
  pub level_id:       String,
  pub measured_on:    String,
  pub rule_code:      String,
  pub severity:       String,
  pub content:        String,
  pub z_score:        Option<f64>,
  pub recorded_at:    String,
  pub action:         Option<String>,
  pub assigned_staff: Option<String>,
  pub status:         String,
}

pub const VIOLATION_COLUMNS: &str = "violation_id, analyte_id, lot_id, \
  instrument_id, level_id, measured_on, rule_code, severity, content, \
  z_score, recorded_at, action, assigned_staff, status";

impl RawViolation {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      violation_id:   row.get(0)?,
      analyte_id:     row.get(1)?,
      lot_id:         row.get(2)?,
      instrument_id:  row.get(3)?,
      level_id:       row.get(4)?,
      measured_on:    row.get(5)?,
      rule_code:      row.get(6)?,
      severity:       row.get(7)?,
      content:        row.get(8)?,
      z_score:        row.get(9)?,
      recorded_at:    row.get(10)?,
      action:         row.get(11)?,
      assigned_staff: row.get(12)?,
      status:         row.get(13)?,
    })
  }

  pub fn into_violation(self) -> Result<Violation> {
    Ok(Violation {
      violation_id: self.violation_id,
      key:          ViolationKey {
        context:     ControlContext {
          analyte_id:    self.analyte_id,
          lot_id:        self.lot_id,
          instrument_id: self.instrument_id,
          level_id:      self.level_id,
        },
        measured_on: decode_date(&self.measured_on)?,
        rule_code:   self.rule_code,
      },
      severity:     decode_severity(&self.severity)?,
      content:      self.content,
      z_score:      self.z_score,
      recorded_at:  decode_dt(&self.recorded_at)?,
      disposition:  Disposition {
        action:         self.action,
        assigned_staff: self.assigned_staff,
        status:         decode_status(&self.status)?,
      },
    })
  }
}
