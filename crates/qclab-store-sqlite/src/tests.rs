//! Integration tests for `SqliteStore` against an in-memory database.

use chrono::NaiveDate;
use qclab_core::{
  evaluate::{INVALID_SD, Level},
  limits::{ControlContext, ControlLimits},
  measurement::NewMeasurement,
  rule::{RuleConfig, Severity, WestgardRule},
  store::{NewViolation, QualityStore},
  violation::{Disposition, DispositionStatus, ViolationFilter, ViolationKey},
  workflow,
};
use uuid::Uuid;

use crate::SqliteStore;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn context() -> ControlContext { ControlContext::new("GLU", "LOT-7", "AU680", "normal") }

fn day(d: u32) -> NaiveDate { NaiveDate::from_ymd_opt(2024, 5, d).unwrap() }

fn entry(value: f64, d: u32) -> NewMeasurement {
  NewMeasurement { context: context(), value, measured_on: day(d) }
}

fn new_violation(rule_code: &str, content: &str) -> NewViolation {
  NewViolation {
    key:      ViolationKey {
      context:     context(),
      measured_on: day(1),
      rule_code:   rule_code.into(),
    },
    severity: Severity::Critical,
    content:  content.into(),
    z_score:  Some(3.1),
  }
}

// ─── Control limits ──────────────────────────────────────────────────────────

#[tokio::test]
async fn limits_roundtrip_and_upsert() {
  let s = store().await;
  assert!(s.get_limits(&context()).await.unwrap().is_none());

  s.put_limits(&context(), ControlLimits::new(100.0, 10.0)).await.unwrap();
  s.put_limits(&context(), ControlLimits::new(101.5, 9.5)).await.unwrap();

  let limits = s.get_limits(&context()).await.unwrap().unwrap();
  assert_eq!(limits, ControlLimits::new(101.5, 9.5));

  let other = ControlContext::new("GLU", "LOT-7", "AU680", "high");
  assert!(s.get_limits(&other).await.unwrap().is_none());
}

// ─── Rule catalog ────────────────────────────────────────────────────────────

#[tokio::test]
async fn rules_keep_catalog_order_across_upserts() {
  let s = store().await;
  let v1 = s.upsert_rule(WestgardRule::OneTwoS.default_config()).await.unwrap();
  let v2 = s.upsert_rule(WestgardRule::OneThreeS.default_config()).await.unwrap();
  assert!(v2 > v1);

  let mut updated = WestgardRule::OneTwoS.default_config();
  updated.active = false;
  updated.applies_to_levels = vec!["low".into(), "high".into()];
  let v3 = s.upsert_rule(updated.clone()).await.unwrap();
  assert!(v3 > v2);

  let configs = s.list_rule_configs().await.unwrap();
  assert_eq!(configs.len(), 2);
  assert_eq!(configs[0], updated);
  assert_eq!(configs[1].code, "1-3s");

  let snapshot = s.rule_snapshot().await.unwrap();
  assert_eq!(snapshot.version, v3);
  assert_eq!(snapshot.rules.len(), 2);
}

#[tokio::test]
async fn snapshot_skips_unrecognized_rules() {
  let s = store().await;
  s.upsert_rule(RuleConfig::new("1-3s", Severity::Critical)).await.unwrap();
  s.upsert_rule(RuleConfig::new("not-a-rule", Severity::Error)).await.unwrap();

  assert_eq!(s.list_rule_configs().await.unwrap().len(), 2);
  let snapshot = s.rule_snapshot().await.unwrap();
  let codes: Vec<_> = snapshot.rules.iter().map(|r| r.code()).collect();
  assert_eq!(codes, ["1-3s"]);
}

#[tokio::test]
async fn active_rules_filter_by_level() {
  let s = store().await;
  let mut high_only = RuleConfig::new("1-2s", Severity::Warning);
  high_only.applies_to_levels = vec!["high".into()];
  s.upsert_rule(high_only).await.unwrap();
  s.upsert_rule(RuleConfig::new("1-3s", Severity::Critical)).await.unwrap();

  let normal = s.get_active_rules("normal").await.unwrap();
  assert_eq!(normal.len(), 1);
  let high = s.get_active_rules("high").await.unwrap();
  assert_eq!(high.len(), 2);
}

// ─── Measurements ────────────────────────────────────────────────────────────

#[tokio::test]
async fn run_is_ordered_by_date_then_insertion() {
  let s = store().await;
  s.append_measurement(entry(3.0, 3)).await.unwrap();
  s.append_measurement(entry(1.0, 1)).await.unwrap();
  s.append_measurement(entry(2.0, 1)).await.unwrap();
  let mut elsewhere = entry(9.0, 1);
  elsewhere.context.instrument_id = "AU5800".into();
  s.append_measurement(elsewhere).await.unwrap();

  let run = s.get_run(&context()).await.unwrap();
  let values: Vec<_> = run.iter().map(|p| p.value).collect();
  assert_eq!(values, [1.0, 2.0, 3.0]);
}

#[tokio::test]
async fn measurement_lookup_by_id() {
  let s = store().await;
  let point = s.append_measurement(entry(104.2, 2)).await.unwrap();

  let fetched = s.get_measurement(point.measurement_id).await.unwrap().unwrap();
  assert_eq!(fetched.value, 104.2);
  assert_eq!(fetched.measured_on, day(2));
  assert_eq!(fetched.context, context());
  assert!(s.get_measurement(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn list_contexts_is_distinct() {
  let s = store().await;
  s.append_measurement(entry(1.0, 1)).await.unwrap();
  s.append_measurement(entry(2.0, 2)).await.unwrap();
  let mut high = entry(3.0, 1);
  high.context.level_id = "high".into();
  s.append_measurement(high).await.unwrap();

  assert_eq!(s.list_contexts().await.unwrap().len(), 2);
}

// ─── Violation recorder ──────────────────────────────────────────────────────

#[tokio::test]
async fn record_if_absent_is_idempotent() {
  let s = store().await;

  let first = s.record_if_absent(new_violation("1-3s", "first")).await.unwrap();
  assert!(first.created);
  assert_eq!(first.violation.violation_id, first.violation.key.digest());

  let second = s.record_if_absent(new_violation("1-3s", "second")).await.unwrap();
  assert!(!second.created);
  assert_eq!(second.violation.content, "first");

  let all = s.list_violations(&ViolationFilter::default()).await.unwrap();
  assert_eq!(all.len(), 1);
}

#[tokio::test]
async fn distinct_rules_record_separately() {
  let s = store().await;
  s.record_if_absent(new_violation("1-3s", "a")).await.unwrap();
  let other = s.record_if_absent(new_violation("2-2s", "b")).await.unwrap();
  assert!(other.created);
  assert_eq!(s.list_violations(&ViolationFilter::default()).await.unwrap().len(), 2);
}

#[tokio::test]
async fn concurrent_recorders_write_once() {
  let s = store().await;
  let handles: Vec<_> = (0..8)
    .map(|i| {
      let s = s.clone();
      tokio::spawn(async move {
        s.record_if_absent(new_violation("1-3s", &format!("writer {i}")))
          .await
          .unwrap()
      })
    })
    .collect();

  let mut created = 0;
  for handle in handles {
    if handle.await.unwrap().created {
      created += 1;
    }
  }
  assert_eq!(created, 1);
  assert_eq!(s.list_violations(&ViolationFilter::default()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn disposition_updates_and_filters() {
  let s = store().await;
  let outcome = s.record_if_absent(new_violation("1-3s", "a")).await.unwrap();
  s.record_if_absent(new_violation("2-2s", "b")).await.unwrap();
  assert_eq!(outcome.violation.disposition.status, DispositionStatus::Pending);

  let updated = s
    .set_disposition(outcome.violation.violation_id.clone(), Disposition {
      action:         Some("recalibrated".into()),
      assigned_staff: Some("tech-4".into()),
      status:         DispositionStatus::Approved,
    })
    .await
    .unwrap()
    .unwrap();
  assert_eq!(updated.disposition.action.as_deref(), Some("recalibrated"));
  assert_eq!(updated.disposition.status, DispositionStatus::Approved);
  assert_eq!(updated.content, "a");

  let approved = s
    .list_violations(&ViolationFilter {
      status: Some(DispositionStatus::Approved),
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(approved.len(), 1);

  let missing = s
    .set_disposition("nope".into(), Disposition::default())
    .await
    .unwrap();
  assert!(missing.is_none());
}

#[tokio::test]
async fn list_violations_filters_by_context() {
  let s = store().await;
  s.record_if_absent(new_violation("1-3s", "a")).await.unwrap();
  let mut other = new_violation("1-3s", "b");
  other.key.context.analyte_id = "CHOL".into();
  s.record_if_absent(other).await.unwrap();

  let chol = s
    .list_violations(&ViolationFilter {
      analyte_id: Some("CHOL".into()),
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(chol.len(), 1);
  assert_eq!(chol[0].content, "b");
}

// ─── Workflows over SQLite ───────────────────────────────────────────────────

#[tokio::test]
async fn entry_workflow_records_highest_priority_violation() {
  let s = store().await;
  s.put_limits(&context(), ControlLimits::new(100.0, 10.0)).await.unwrap();
  for rule in [WestgardRule::OneTwoS, WestgardRule::TwoTwoS, WestgardRule::OneThreeS] {
    s.upsert_rule(rule.default_config()).await.unwrap();
  }

  let first = workflow::record_and_evaluate(&s, entry(121.0, 1)).await.unwrap();
  assert_eq!(first.evaluation.result.violated_rule(), Some("1-2s"));
  assert_eq!(first.evaluation.result.level, Level::Warning);

  let second = workflow::record_and_evaluate(&s, entry(123.0, 2)).await.unwrap();
  assert_eq!(second.evaluation.result.violated_rule(), Some("2-2s"));
  assert_eq!(second.evaluation.result.level, Level::Error);

  let stored = s.list_violations(&ViolationFilter::default()).await.unwrap();
  assert_eq!(stored.len(), 2);
  assert_eq!(stored[0].key.rule_code, "2-2s");
}

#[tokio::test]
async fn reevaluating_does_not_duplicate() {
  let s = store().await;
  s.put_limits(&context(), ControlLimits::new(100.0, 10.0)).await.unwrap();
  s.upsert_rule(RuleConfig::new("1-3s", Severity::Critical)).await.unwrap();

  let outcome = workflow::record_and_evaluate(&s, entry(131.0, 1)).await.unwrap();
  assert!(outcome.recorded.unwrap().created);

  let again = workflow::evaluate_newest(&s, &context()).await.unwrap().unwrap();
  assert!(!again.recorded.unwrap().created);

  let report = workflow::reprocess_context(&s, &context()).await.unwrap();
  assert_eq!((report.created, report.existing), (0, 1));
  assert_eq!(s.list_violations(&ViolationFilter::default()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn zero_sd_limits_record_invalid_sd() {
  let s = store().await;
  s.put_limits(&context(), ControlLimits::new(100.0, 0.0)).await.unwrap();
  s.upsert_rule(RuleConfig::new("1-3s", Severity::Critical)).await.unwrap();

  let outcome = workflow::record_and_evaluate(&s, entry(100.0, 1)).await.unwrap();
  assert_eq!(outcome.evaluation.result.violated_rule(), Some(INVALID_SD));
  let recorded = outcome.recorded.unwrap();
  assert_eq!(recorded.violation.key.rule_code, INVALID_SD);
  assert_eq!(recorded.violation.z_score, None);
}
