//! The `QualityStore` trait: everything the engine needs from persistence.
//!
//! The trait is implemented by storage backends (e.g. `qclab-store-sqlite`).
//! Higher layers (`qclab-api`, [`crate::workflow`]) depend on this
//! abstraction, not on any concrete backend.

use std::future::Future;

use uuid::Uuid;

use crate::{
  catalog::RuleSnapshot,
  limits::{ControlContext, ControlLimits},
  measurement::{MeasurementPoint, NewMeasurement},
  rule::{ControlRule, RuleConfig, Severity},
  violation::{Disposition, RecordOutcome, Violation, ViolationFilter, ViolationKey},
};

/// Input to [`QualityStore::record_if_absent`].
#[derive(Debug, Clone)]
pub struct NewViolation {
  pub key:      ViolationKey,
  pub severity: Severity,
  pub content:  String,
  pub z_score:  Option<f64>,
}

/// Abstraction over a qclab storage backend.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait QualityStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Control limits ────────────────────────────────────────────────────

  /// Mean and SD for `context`, or `None` if none are configured.
  fn get_limits<'a>(
    &'a self,
    context: &'a ControlContext,
  ) -> impl Future<Output = Result<Option<ControlLimits>, Self::Error>> + Send + 'a;

  /// Insert or replace the limits for `context`.
  fn put_limits<'a>(
    &'a self,
    context: &'a ControlContext,
    limits: ControlLimits,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  // ── Rule catalog ──────────────────────────────────────────────────────

  /// Read the whole catalog as one versioned snapshot. Rows that cannot be
  /// parsed are skipped.
  fn rule_snapshot(
    &self,
  ) -> impl Future<Output = Result<RuleSnapshot, Self::Error>> + Send + '_;

  /// Active rules applicable to `level_id`, in catalog order.
  fn get_active_rules<'a>(
    &'a self,
    level_id: &'a str,
  ) -> impl Future<Output = Result<Vec<ControlRule>, Self::Error>> + Send + 'a {
    async move {
      let snapshot = self.rule_snapshot().await?;
      Ok(snapshot.active_for(level_id).cloned().collect())
    }
  }

  /// Raw configuration rows in catalog order, including unparseable ones.
  fn list_rule_configs(
    &self,
  ) -> impl Future<Output = Result<Vec<RuleConfig>, Self::Error>> + Send + '_;

  /// Insert or replace the rule with `config.code` and return the new
  /// catalog version.
  fn upsert_rule(
    &self,
    config: RuleConfig,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  // ── Measurements ──────────────────────────────────────────────────────

  /// Append a measurement; the store assigns id and `recorded_at`.
  fn append_measurement(
    &self,
    input: NewMeasurement,
  ) -> impl Future<Output = Result<MeasurementPoint, Self::Error>> + Send + '_;

  /// All measurements for `context` in run order.
  fn get_run<'a>(
    &'a self,
    context: &'a ControlContext,
  ) -> impl Future<Output = Result<Vec<MeasurementPoint>, Self::Error>> + Send + 'a;

  // ── Violation recorder ────────────────────────────────────────────────

  /// Store a violation unless one with the same key already exists.
  ///
  /// Never fails because of a duplicate key: the first writer wins and
  /// later calls return the existing record with `created = false`.
  fn record_if_absent(
    &self,
    input: NewViolation,
  ) -> impl Future<Output = Result<RecordOutcome, Self::Error>> + Send + '_;

  /// Violations matching `filter`, newest measurement date first.
  fn list_violations<'a>(
    &'a self,
    filter: &'a ViolationFilter,
  ) -> impl Future<Output = Result<Vec<Violation>, Self::Error>> + Send + 'a;

  /// Replace the operator disposition of a violation. Returns `None` if no
  /// violation has that id.
  fn set_disposition(
    &self,
    violation_id: String,
    disposition: Disposition,
  ) -> impl Future<Output = Result<Option<Violation>, Self::Error>> + Send + '_;

  /// Look a single measurement up by id.
  fn get_measurement(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<MeasurementPoint>, Self::Error>> + Send + '_;
}
