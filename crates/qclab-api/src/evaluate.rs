//! Handlers for ad-hoc evaluation; nothing is read from or written to the
//! store.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/evaluate` | Classify the newest point of `series` |
//! | `POST` | `/evaluate/series` | Classify every point of `series` |

use axum::Json;
use qclab_core::{
  catalog::RuleSnapshot,
  evaluate::{Evaluation, EvaluationResult, evaluate, evaluate_series},
  limits::ControlLimits,
  rule::RuleConfig,
};
use serde::Deserialize;

/// Body of both evaluation endpoints. Rules whose code cannot be parsed are
/// skipped, as they would be when loaded from the catalog.
#[derive(Debug, Deserialize)]
pub struct EvaluateBody {
  /// Raw values, oldest first.
  pub series:   Vec<f64>,
  pub limits:   ControlLimits,
  pub rules:    Vec<RuleConfig>,
  pub level_id: String,
}

impl EvaluateBody {
  fn snapshot(&self) -> RuleSnapshot {
    RuleSnapshot::from_configs(0, self.rules.iter().cloned())
  }
}

/// `POST /evaluate`
pub async fn newest(Json(body): Json<EvaluateBody>) -> Json<EvaluationResult> {
  let snapshot = body.snapshot();
  Json(evaluate(&body.series, &body.limits, &snapshot.rules, &body.level_id))
}

/// `POST /evaluate/series`
pub async fn series(Json(body): Json<EvaluateBody>) -> Json<Vec<Evaluation>> {
  let snapshot = body.snapshot();
  Json(evaluate_series(
    &body.series,
    &body.limits,
    &snapshot.rules,
    &body.level_id,
  ))
}
