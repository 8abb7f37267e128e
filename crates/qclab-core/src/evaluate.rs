//! The evaluation orchestrator and priority resolver.
//!
//! [`evaluate`] classifies the newest point of a run; [`evaluate_series`]
//! re-classifies every point of a run in one pass. Both go through the same
//! per-prefix classification, so batch and incremental results agree.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::{
  limits::ControlLimits,
  rule::{ControlRule, Severity},
};

/// Reported in place of a rule code when the limits cannot produce z-scores.
pub const INVALID_SD: &str = "invalid-sd";

// ─── Result types ────────────────────────────────────────────────────────────

/// Overall classification of a measurement.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Level {
  Pass,
  Warning,
  Error,
  Critical,
}

impl Level {
  /// The severity behind a non-pass level.
  pub fn severity(self) -> Option<Severity> {
    match self {
      Self::Pass => None,
      Self::Warning => Some(Severity::Warning),
      Self::Error => Some(Severity::Error),
      Self::Critical => Some(Severity::Critical),
    }
  }
}

impl From<Severity> for Level {
  fn from(s: Severity) -> Self {
    match s {
      Severity::Warning => Self::Warning,
      Severity::Error => Self::Error,
      Severity::Critical => Self::Critical,
    }
  }
}

/// Outcome of evaluating one measurement.
///
/// After priority resolution `violated_rule_codes` holds zero or one code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationResult {
  pub level:               Level,
  pub violated_rule_codes: Vec<String>,
}

impl EvaluationResult {
  pub fn pass() -> Self {
    Self { level: Level::Pass, violated_rule_codes: Vec::new() }
  }

  pub fn invalid_sd() -> Self {
    Self {
      level:               Level::Critical,
      violated_rule_codes: vec![INVALID_SD.to_owned()],
    }
  }

  fn violation(rule: &ControlRule) -> Self {
    Self {
      level:               rule.severity().into(),
      violated_rule_codes: vec![rule.code().to_owned()],
    }
  }

  pub fn is_pass(&self) -> bool { self.level == Level::Pass }

  /// The reported rule code, if any.
  pub fn violated_rule(&self) -> Option<&str> {
    self.violated_rule_codes.first().map(String::as_str)
  }
}

/// An [`EvaluationResult`] together with the z-score of the evaluated point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
  pub result:  EvaluationResult,
  /// `None` when the limits were invalid.
  pub z_score: Option<f64>,
}

// ─── Priority resolver ───────────────────────────────────────────────────────

/// Pick the single rule to report among those that triggered.
///
/// Highest [`ControlRule::priority`] wins; ties go to the first rule in the
/// given order.
pub fn resolve_priority<'a>(
  triggered: impl IntoIterator<Item = &'a ControlRule>,
) -> Option<&'a ControlRule> {
  triggered.into_iter().fold(None, |winner, rule| match winner {
    Some(w) if w.priority() >= rule.priority() => Some(w),
    _ => Some(rule),
  })
}

// ─── Orchestrator ────────────────────────────────────────────────────────────

/// Z-scores of the whole series, or `None` when the limits are unusable.
/// The limits are checked once, so an empty series still fails on them.
fn z_scores(series: &[f64], limits: &ControlLimits) -> Option<Vec<f64>> {
  if let Err(e) = limits.validate() {
    tracing::warn!(error = %e, "cannot compute z-scores; flagging as invalid-sd");
    return None;
  }
  Some(
    series
      .iter()
      .map(|v| (v - limits.mean) / limits.standard_deviation)
      .collect(),
  )
}

/// Classify the last point of `z` (a run prefix, oldest first).
fn classify(z: &[f64], rules: &[ControlRule], level_id: &str) -> EvaluationResult {
  let triggered = rules
    .iter()
    .filter(|r| r.is_active() && r.applies_to(level_id))
    .filter(|r| {
      let window = r.effective_window();
      if z.len() < window {
        tracing::debug!(
          rule = r.code(),
          window,
          available = z.len(),
          "rule not yet evaluable"
        );
        return false;
      }
      r.family.matches(&z[z.len() - window..])
    });

  match resolve_priority(triggered) {
    Some(rule) => EvaluationResult::violation(rule),
    None => EvaluationResult::pass(),
  }
}

/// Classify the newest point of `series` (raw values, oldest first).
///
/// Only rules that are active and apply to `level_id` participate. Invalid
/// limits short-circuit to `critical` / [`INVALID_SD`].
pub fn evaluate(
  series: &[f64],
  limits: &ControlLimits,
  rules: &[ControlRule],
  level_id: &str,
) -> EvaluationResult {
  match z_scores(series, limits) {
    Some(z) => classify(&z, rules, level_id),
    None => EvaluationResult::invalid_sd(),
  }
}

/// Classify every point of `series` as if each had been evaluated when it
/// was the newest.
pub fn evaluate_series(
  series: &[f64],
  limits: &ControlLimits,
  rules: &[ControlRule],
  level_id: &str,
) -> Vec<Evaluation> {
  let Some(z) = z_scores(series, limits) else {
    return series
      .iter()
      .map(|_| Evaluation { result: EvaluationResult::invalid_sd(), z_score: None })
      .collect();
  };

  (1..=z.len())
    .map(|end| Evaluation {
      result:  classify(&z[..end], rules, level_id),
      z_score: Some(z[end - 1]),
    })
    .collect()
}
