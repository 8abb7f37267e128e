//! Measurement-entry and reprocessing workflows.
//!
//! These glue the pure engine to a [`QualityStore`]: read limits, one rule
//! snapshot, and the run; evaluate; record any violation exactly once.

use serde::Serialize;

use crate::{
  catalog::RuleSnapshot,
  evaluate::{Evaluation, evaluate, evaluate_series},
  limits::{ControlContext, ControlLimits, z_score},
  measurement::{MeasurementPoint, NewMeasurement, run_values},
  store::{NewViolation, QualityStore},
  violation::{RecordOutcome, ViolationKey},
};

/// Stand-in used when a context has no configured limits; it always fails
/// validation, so evaluation degrades to `invalid-sd`.
const MISSING_LIMITS: ControlLimits =
  ControlLimits { mean: 0.0, standard_deviation: 0.0 };

/// Evaluation of one measurement and what, if anything, was recorded.
#[derive(Debug, Clone, Serialize)]
pub struct PointOutcome {
  pub measurement: MeasurementPoint,
  pub evaluation:  Evaluation,
  /// `None` for a passing point.
  pub recorded:    Option<RecordOutcome>,
}

/// Summary of [`reprocess_context`].
#[derive(Debug, Clone, Serialize)]
pub struct ReprocessReport {
  pub context:         ControlContext,
  pub catalog_version: u64,
  pub points:          Vec<PointOutcome>,
  /// Violations newly written by this pass.
  pub created:         usize,
  /// Violations that were already on record.
  pub existing:        usize,
}

async fn load_limits<S: QualityStore>(
  store: &S,
  context: &ControlContext,
) -> Result<ControlLimits, S::Error> {
  Ok(store.get_limits(context).await?.unwrap_or_else(|| {
    tracing::warn!(?context, "no control limits configured");
    MISSING_LIMITS
  }))
}

fn describe(
  code: &str,
  point: &MeasurementPoint,
  evaluation: &Evaluation,
  limits: &ControlLimits,
) -> String {
  match evaluation.z_score {
    Some(z) => format!(
      "{code} violated by {} on {}: z = {z:.2} (mean {}, sd {})",
      point.value, point.measured_on, limits.mean, limits.standard_deviation,
    ),
    None => format!(
      "cannot evaluate {} on {}: unusable control limits (mean {}, sd {})",
      point.value, point.measured_on, limits.mean, limits.standard_deviation,
    ),
  }
}

async fn record<S: QualityStore>(
  store: &S,
  point: &MeasurementPoint,
  evaluation: &Evaluation,
  limits: &ControlLimits,
) -> Result<Option<RecordOutcome>, S::Error> {
  let (Some(severity), Some(code)) = (
    evaluation.result.level.severity(),
    evaluation.result.violated_rule(),
  ) else {
    return Ok(None);
  };

  let input = NewViolation {
    key: ViolationKey {
      context:     point.context.clone(),
      measured_on: point.measured_on,
      rule_code:   code.to_owned(),
    },
    severity,
    content: describe(code, point, evaluation, limits),
    z_score: evaluation.z_score,
  };
  let outcome = store.record_if_absent(input).await?;

  if outcome.created {
    tracing::info!(
      rule = code,
      %severity,
      measurement = %point.measurement_id,
      "recorded control rule violation"
    );
  } else {
    tracing::debug!(rule = code, "violation already on record");
  }
  Ok(Some(outcome))
}

/// Evaluate `point`, the last entry of `values` (its run prefix), and
/// record its violation, if any.
async fn evaluate_point<S: QualityStore>(
  store: &S,
  point: &MeasurementPoint,
  values: &[f64],
  limits: &ControlLimits,
  snapshot: &RuleSnapshot,
) -> Result<PointOutcome, S::Error> {
  let level_id = point.context.level_id.as_str();
  let result = evaluate(values, limits, &snapshot.rules, level_id);
  let evaluation = Evaluation { result, z_score: z_score(point.value, limits).ok() };

  let recorded = record(store, point, &evaluation, limits).await?;
  Ok(PointOutcome { measurement: point.clone(), evaluation, recorded })
}

/// Evaluate the newest measurement of `context` and record its violation.
/// Returns `None` when the run is empty.
pub async fn evaluate_newest<S: QualityStore>(
  store: &S,
  context: &ControlContext,
) -> Result<Option<PointOutcome>, S::Error> {
  let limits = load_limits(store, context).await?;
  let snapshot = store.rule_snapshot().await?;
  let run = store.get_run(context).await?;

  let Some(point) = run.last() else {
    return Ok(None);
  };
  let values = run_values(&run);
  evaluate_point(store, point, &values, &limits, &snapshot).await.map(Some)
}

/// Store a new measurement, then evaluate it against every earlier
/// measurement of its run.
///
/// A back-dated measurement is evaluated against the points that precede it
/// in run order, not against later ones.
pub async fn record_and_evaluate<S: QualityStore>(
  store: &S,
  input: NewMeasurement,
) -> Result<PointOutcome, S::Error> {
  let point = store.append_measurement(input).await?;
  let limits = load_limits(store, &point.context).await?;
  let snapshot = store.rule_snapshot().await?;
  let run = store.get_run(&point.context).await?;

  let position = run
    .iter()
    .position(|p| p.measurement_id == point.measurement_id);
  let mut values = match position {
    Some(i) => run_values(&run[..i]),
    None => run_values(&run),
  };
  values.push(point.value);

  evaluate_point(store, &point, &values, &limits, &snapshot).await
}

/// Re-classify every measurement of `context` under one catalog snapshot,
/// recording any violations not yet on record.
pub async fn reprocess_context<S: QualityStore>(
  store: &S,
  context: &ControlContext,
) -> Result<ReprocessReport, S::Error> {
  let limits = load_limits(store, context).await?;
  let snapshot = store.rule_snapshot().await?;
  let run = store.get_run(context).await?;

  let values = run_values(&run);
  let evaluations =
    evaluate_series(&values, &limits, &snapshot.rules, &context.level_id);

  let mut report = ReprocessReport {
    context:         context.clone(),
    catalog_version: snapshot.version,
    points:          Vec::with_capacity(run.len()),
    created:         0,
    existing:        0,
  };

  for (point, evaluation) in run.into_iter().zip(evaluations) {
    let recorded = record(store, &point, &evaluation, &limits).await?;
    match &recorded {
      Some(o) if o.created => report.created += 1,
      Some(_) => report.existing += 1,
      None => {}
    }
    report.points.push(PointOutcome { measurement: point, evaluation, recorded });
  }

  tracing::info!(
    ?context,
    points = report.points.len(),
    created = report.created,
    existing = report.existing,
    "reprocessed run"
  );
  Ok(report)
}

#[cfg(test)]
mod tests {
  use std::{
    collections::HashMap,
    convert::Infallible,
    sync::Mutex,
  };

  use chrono::{NaiveDate, Utc};
  use uuid::Uuid;

  use super::*;
  use crate::{
    evaluate::{INVALID_SD, Level},
    measurement::sort_run,
    rule::{RuleConfig, Severity, WestgardRule},
    violation::{Disposition, Violation, ViolationFilter},
  };

  // A minimal in-memory store for exercising the workflows.
  #[derive(Default)]
  struct MemoryStore {
    limits:       Mutex<HashMap<ControlContext, ControlLimits>>,
    rules:        Mutex<Vec<RuleConfig>>,
    measurements: Mutex<Vec<MeasurementPoint>>,
    violations:   Mutex<Vec<Violation>>,
  }

  impl QualityStore for MemoryStore {
    type Error = Infallible;

    async fn get_limits(
      &self,
      context: &ControlContext,
    ) -> Result<Option<ControlLimits>, Infallible> {
      Ok(self.limits.lock().unwrap().get(context).copied())
    }

    async fn put_limits(
      &self,
      context: &ControlContext,
      limits: ControlLimits,
    ) -> Result<(), Infallible> {
      self.limits.lock().unwrap().insert(context.clone(), limits);
      Ok(())
    }

    async fn rule_snapshot(&self) -> Result<RuleSnapshot, Infallible> {
      let rules = self.rules.lock().unwrap().clone();
      Ok(RuleSnapshot::from_configs(1, rules))
    }

    async fn list_rule_configs(&self) -> Result<Vec<RuleConfig>, Infallible> {
      Ok(self.rules.lock().unwrap().clone())
    }

    async fn upsert_rule(&self, config: RuleConfig) -> Result<u64, Infallible> {
      self.rules.lock().unwrap().push(config);
      Ok(1)
    }

    async fn append_measurement(
      &self,
      input: NewMeasurement,
    ) -> Result<MeasurementPoint, Infallible> {
      let point = MeasurementPoint {
        measurement_id: Uuid::new_v4(),
        context:        input.context,
        value:          input.value,
        measured_on:    input.measured_on,
        recorded_at:    Utc::now(),
      };
      self.measurements.lock().unwrap().push(point.clone());
      Ok(point)
    }

    async fn get_run(
      &self,
      context: &ControlContext,
    ) -> Result<Vec<MeasurementPoint>, Infallible> {
      let mut run: Vec<_> = self
        .measurements
        .lock()
        .unwrap()
        .iter()
        .filter(|p| &p.context == context)
        .cloned()
        .collect();
      sort_run(&mut run);
      Ok(run)
    }

    async fn get_measurement(
      &self,
      id: Uuid,
    ) -> Result<Option<MeasurementPoint>, Infallible> {
      Ok(
        self
          .measurements
          .lock()
          .unwrap()
          .iter()
          .find(|p| p.measurement_id == id)
          .cloned(),
      )
    }

    async fn record_if_absent(
      &self,
      input: NewViolation,
    ) -> Result<RecordOutcome, Infallible> {
      let mut violations = self.violations.lock().unwrap();
      if let Some(existing) = violations.iter().find(|v| v.key == input.key) {
        return Ok(RecordOutcome {
          created:   false,
          violation: existing.clone(),
        });
      }
      let violation = Violation {
        violation_id: input.key.digest(),
        key:          input.key,
        severity:     input.severity,
        content:      input.content,
        z_score:      input.z_score,
        recorded_at:  Utc::now(),
        disposition:  Disposition::default(),
      };
      violations.push(violation.clone());
      Ok(RecordOutcome { created: true, violation })
    }

    async fn list_violations(
      &self,
      _: &ViolationFilter,
    ) -> Result<Vec<Violation>, Infallible> {
      Ok(self.violations.lock().unwrap().clone())
    }

    async fn set_disposition(
      &self,
      _: String,
      _: Disposition,
    ) -> Result<Option<Violation>, Infallible> {
      Ok(None)
    }
  }

  fn context() -> ControlContext { ControlContext::new("GLU", "L1", "I1", "normal") }

  fn day(d: u32) -> NaiveDate { NaiveDate::from_ymd_opt(2024, 3, d).unwrap() }

  async fn seeded() -> MemoryStore {
    let store = MemoryStore::default();
    store.put_limits(&context(), ControlLimits::new(100.0, 10.0)).await.unwrap();
    for rule in [WestgardRule::OneThreeS, WestgardRule::OneTwoS, WestgardRule::TwoTwoS] {
      store.upsert_rule(rule.default_config()).await.unwrap();
    }
    store
  }

  fn entry(value: f64, d: u32) -> NewMeasurement {
    NewMeasurement { context: context(), value, measured_on: day(d) }
  }

  #[tokio::test]
  async fn passing_measurement_records_nothing() {
    let store = seeded().await;
    let outcome = record_and_evaluate(&store, entry(101.0, 1)).await.unwrap();
    assert!(outcome.evaluation.result.is_pass());
    assert!(outcome.recorded.is_none());
    assert!(store.violations.lock().unwrap().is_empty());
  }

  #[tokio::test]
  async fn violation_is_recorded_once() {
    let store = seeded().await;
    let outcome = record_and_evaluate(&store, entry(131.0, 1)).await.unwrap();
    assert_eq!(outcome.evaluation.result.violated_rule(), Some("1-3s"));
    assert!(outcome.recorded.as_ref().unwrap().created);

    let again = evaluate_newest(&store, &context()).await.unwrap().unwrap();
    assert_eq!(again.evaluation.result.violated_rule(), Some("1-3s"));
    assert!(!again.recorded.unwrap().created);
    assert_eq!(store.violations.lock().unwrap().len(), 1);
  }

  #[tokio::test]
  async fn missing_limits_degrade_to_invalid_sd() {
    let store = MemoryStore::default();
    store.upsert_rule(RuleConfig::new("1-3s", Severity::Critical)).await.unwrap();
    let outcome = record_and_evaluate(&store, entry(100.0, 1)).await.unwrap();
    assert_eq!(outcome.evaluation.result.level, Level::Critical);
    assert_eq!(outcome.evaluation.result.violated_rule(), Some(INVALID_SD));
    assert_eq!(outcome.evaluation.z_score, None);
    assert_eq!(outcome.recorded.unwrap().violation.severity, Severity::Critical);
  }

  #[tokio::test]
  async fn back_dated_entry_ignores_later_points() {
    let store = seeded().await;
    record_and_evaluate(&store, entry(125.0, 5)).await.unwrap();
    // Alone on day 1 it is only a 1-2s warning; it must not pair with the
    // later day-5 point to form a 2-2s.
    let outcome = record_and_evaluate(&store, entry(124.0, 1)).await.unwrap();
    assert_eq!(outcome.evaluation.result.violated_rule(), Some("1-2s"));
  }

  #[tokio::test]
  async fn reprocess_is_idempotent() {
    let store = seeded().await;
    for (value, d) in [(100.0, 1), (122.0, 2), (125.0, 3), (131.0, 4)] {
      store.append_measurement(entry(value, d)).await.unwrap();
    }

    let first = reprocess_context(&store, &context()).await.unwrap();
    let codes: Vec<_> = first
      .points
      .iter()
      .map(|p| p.evaluation.result.violated_rule().map(str::to_owned))
      .collect();
    assert_eq!(codes, [
      None,
      Some("1-2s".into()),
      Some("2-2s".into()),
      Some("1-3s".into())
    ]);
    assert_eq!((first.created, first.existing), (3, 0));

    let second = reprocess_context(&store, &context()).await.unwrap();
    assert_eq!((second.created, second.existing), (0, 3));
    assert_eq!(store.violations.lock().unwrap().len(), 3);
  }

  #[tokio::test]
  async fn reprocess_matches_incremental_entry() {
    let incremental = seeded().await;
    let mut entered = Vec::new();
    for (i, value) in [100.0, 122.0, 125.0, 95.0, 131.0].into_iter().enumerate() {
      let outcome = record_and_evaluate(&incremental, entry(value, i as u32 + 1))
        .await
        .unwrap();
      entered.push(outcome.evaluation.result);
    }

    let report = reprocess_context(&incremental, &context()).await.unwrap();
    let batch: Vec<_> = report.points.into_iter().map(|p| p.evaluation.result).collect();
    assert_eq!(batch, entered);
  }
}
