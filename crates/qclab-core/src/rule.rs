//! Control rules: configuration rows and their parsed, evaluable form.
//!
//! A rule is stored as a flat [`RuleConfig`] row. Its statistical shape is
//! derived from the structural prefix of its code (`1-`, `2-`, `R-`, `4-`,
//! `10x`, or a custom `<n>-...` code) exactly once, when the row is turned
//! into a [`ControlRule`]. Evaluation then matches on the closed
//! [`RuleFamily`] enum and never looks at the code string again.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::{Error, Result};

// ─── Severity ────────────────────────────────────────────────────────────────

/// Operator-facing urgency of a triggered rule.
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
pub enum Severity {
  Warning,
  Error,
  Critical,
}

// ─── Configuration row ───────────────────────────────────────────────────────

fn default_window_size() -> usize { 1 }

fn default_active() -> bool { true }

/// A rule exactly as configured by an operator, before parsing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleConfig {
  /// Stable identifier, e.g. `"1-3s"` or a custom `"4-1s-2s"`.
  pub code:                   String,
  pub severity:               Severity,
  /// How many most-recent points the rule inspects.
  #[serde(default = "default_window_size")]
  pub window_size:            usize,
  pub threshold_sd:           Option<f64>,
  pub consecutive_points:     Option<usize>,
  #[serde(default)]
  pub same_side:              bool,
  #[serde(default)]
  pub opposite_sides:         bool,
  /// Range rules: threshold on the sum of |z| across the two points.
  pub sum_abs_z_greater_than: Option<f64>,
  #[serde(default = "default_active")]
  pub active:                 bool,
  /// Control levels this rule is restricted to; empty means all levels.
  #[serde(default)]
  pub applies_to_levels:      Vec<String>,
}

impl RuleConfig {
  /// A bare, active, all-levels rule with no explicit thresholds.
  pub fn new(code: impl Into<String>, severity: Severity) -> Self {
    Self {
      code: code.into(),
      severity,
      window_size: default_window_size(),
      threshold_sd: None,
      consecutive_points: None,
      same_side: false,
      opposite_sides: false,
      sum_abs_z_greater_than: None,
      active: true,
      applies_to_levels: Vec::new(),
    }
  }
}

// ─── Canonical Westgard rules ────────────────────────────────────────────────

/// The named rules with a fixed reporting precedence.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, EnumIter,
)]
pub enum WestgardRule {
  #[strum(serialize = "1-3s")]
  OneThreeS,
  #[strum(serialize = "2-2s")]
  TwoTwoS,
  #[strum(serialize = "R-4s")]
  RangeFourS,
  #[strum(serialize = "1-2s")]
  OneTwoS,
  #[strum(serialize = "2-3s")]
  TwoThreeS,
  #[strum(serialize = "4-1s")]
  FourOneS,
  #[strum(serialize = "10x")]
  TenX,
}

impl WestgardRule {
  /// Reporting precedence; higher wins when several rules fire at once.
  pub fn priority(self) -> u8 {
    match self {
      Self::OneThreeS => 6,
      Self::TwoTwoS => 5,
      Self::RangeFourS => 4,
      Self::OneTwoS => 3,
      Self::TwoThreeS => 2,
      Self::FourOneS => 1,
      Self::TenX => 0,
    }
  }

  /// A sensible starting configuration for this rule.
  pub fn default_config(self) -> RuleConfig {
    let (severity, window_size) = match self {
      Self::OneThreeS => (Severity::Critical, 1),
      Self::TwoTwoS => (Severity::Error, 2),
      Self::RangeFourS => (Severity::Error, 2),
      Self::OneTwoS => (Severity::Warning, 1),
      Self::TwoThreeS => (Severity::Error, 2),
      Self::FourOneS => (Severity::Warning, 4),
      Self::TenX => (Severity::Warning, 10),
    };
    let mut config = RuleConfig::new(self.as_ref(), severity);
    config.window_size = window_size;
    config.consecutive_points = Some(window_size);
    match self {
      Self::RangeFourS => {
        config.opposite_sides = true;
        config.sum_abs_z_greater_than = Some(4.0);
      }
      Self::TwoTwoS | Self::TwoThreeS | Self::FourOneS | Self::TenX => {
        config.same_side = true;
      }
      Self::OneThreeS | Self::OneTwoS => {}
    }
    config
  }
}

// ─── Rule family ─────────────────────────────────────────────────────────────

/// How a run rule decides that points lie "on the same side" of the mean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SideTest {
  /// All points strictly above or all strictly below; z = 0 breaks the run.
  Strict,
  /// All points strictly above, or all at-or-below. Used by `10x`.
  PositiveOrNotPositive,
}

impl SideTest {
  pub fn holds(self, window: &[f64]) -> bool {
    let all_above = window.iter().all(|z| *z > 0.0);
    match self {
      Self::Strict => all_above || window.iter().all(|z| *z < 0.0),
      Self::PositiveOrNotPositive => {
        all_above || window.iter().all(|z| *z <= 0.0)
      }
    }
  }
}

/// The statistical pattern a rule checks, parsed from its code.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum RuleFamily {
  /// Newest point beyond `threshold` SD.
  SinglePoint { threshold: f64 },
  /// Last two points beyond `threshold` SD on the same side.
  TwoConsecutive { threshold: f64 },
  /// Last two points on opposite sides, spread above `sum_threshold` SD.
  Range { sum_threshold: f64 },
  /// Last `length` points on the same side, optionally all beyond a
  /// threshold.
  Run {
    length:    usize,
    threshold: Option<f64>,
    side:      SideTest,
  },
  /// Operator-defined `<n>-...` code: last `length` points strictly on the
  /// same side and beyond `threshold` SD.
  Custom { length: usize, threshold: f64 },
}

/// `3` SD when the code mentions a 3, `2` SD otherwise.
fn default_sd_threshold(code: &str) -> f64 {
  if code.contains('3') { 3.0 } else { 2.0 }
}

fn all_beyond(window: &[f64], threshold: f64) -> bool {
  window.iter().all(|z| z.abs() >= threshold)
}

impl RuleFamily {
  /// Derive the family from a configuration row.
  pub fn parse(config: &RuleConfig) -> Result<Self> {
    let code = config.code.trim();

    if code == "10x" {
      return Ok(Self::Run {
        length:    10,
        threshold: None,
        side:      SideTest::PositiveOrNotPositive,
      });
    }
    if code.starts_with("1-") {
      let threshold = config
        .threshold_sd
        .unwrap_or_else(|| default_sd_threshold(code));
      return Ok(Self::SinglePoint { threshold });
    }
    if code.starts_with("2-") {
      let threshold = config
        .threshold_sd
        .unwrap_or_else(|| default_sd_threshold(code));
      return Ok(Self::TwoConsecutive { threshold });
    }
    if code.starts_with("R-") {
      let sum_threshold = config.sum_abs_z_greater_than.unwrap_or(4.0);
      return Ok(Self::Range { sum_threshold });
    }
    if code.starts_with("4-") {
      return Ok(Self::Run {
        length:    4,
        threshold: Some(config.threshold_sd.unwrap_or(1.0)),
        side:      SideTest::Strict,
      });
    }

    // Custom `<n>-...`: the leading numeric segment is the run length.
    let mut segments = code.split('-');
    let length = segments
      .next()
      .and_then(|head| head.parse::<usize>().ok())
      .filter(|n| *n > 0);
    match (length, segments.next()) {
      (Some(length), Some(rest)) if !rest.is_empty() => Ok(Self::Custom {
        length,
        threshold: config.threshold_sd.unwrap_or(1.0),
      }),
      _ => Err(Error::UnrecognizedRuleShape(config.code.clone())),
    }
  }

  /// Number of trailing points the family needs to be evaluable.
  pub fn required_len(&self) -> usize {
    match self {
      Self::SinglePoint { .. } => 1,
      Self::TwoConsecutive { .. } | Self::Range { .. } => 2,
      Self::Run { length, .. } | Self::Custom { length, .. } => *length,
    }
  }

  /// Whether the trailing points of `window` (z-scores, oldest first)
  /// match this pattern. A window shorter than [`Self::required_len`]
  /// never matches.
  pub fn matches(&self, window: &[f64]) -> bool {
    let need = self.required_len();
    if window.len() < need {
      return false;
    }
    let tail = &window[window.len() - need..];

    match *self {
      Self::SinglePoint { threshold } => tail[0].abs() >= threshold,
      Self::TwoConsecutive { threshold } => {
        SideTest::Strict.holds(tail) && all_beyond(tail, threshold)
      }
      Self::Range { sum_threshold } => {
        let (a, b) = (tail[0], tail[1]);
        let opposite = (a > 0.0 && b < 0.0) || (a < 0.0 && b > 0.0);
        opposite && a.abs() + b.abs() > sum_threshold
      }
      Self::Run { threshold, side, .. } => {
        side.holds(tail) && threshold.is_none_or(|t| all_beyond(tail, t))
      }
      Self::Custom { threshold, .. } => {
        SideTest::Strict.holds(tail) && all_beyond(tail, threshold)
      }
    }
  }
}

// ─── ControlRule ─────────────────────────────────────────────────────────────

/// A parsed, immutable rule ready for evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlRule {
  pub config:   RuleConfig,
  pub family:   RuleFamily,
  /// Set when the code is one of the canonical Westgard rules.
  pub standard: Option<WestgardRule>,
}

impl ControlRule {
  pub fn from_config(config: RuleConfig) -> Result<Self> {
    if config.window_size == 0 {
      return Err(Error::InvalidWindow(config.code));
    }
    let family = RuleFamily::parse(&config)?;
    let standard = WestgardRule::from_str(config.code.trim()).ok();
    Ok(Self { config, family, standard })
  }

  pub fn code(&self) -> &str { &self.config.code }

  pub fn severity(&self) -> Severity { self.config.severity }

  pub fn is_active(&self) -> bool { self.config.active }

  /// Whether the rule participates for `level_id`.
  pub fn applies_to(&self, level_id: &str) -> bool {
    self.config.applies_to_levels.is_empty()
      || self.config.applies_to_levels.iter().any(|l| l == level_id)
  }

  /// Reporting precedence; non-canonical codes rank lowest.
  pub fn priority(&self) -> u8 {
    self.standard.map(WestgardRule::priority).unwrap_or(0)
  }

  /// Points that must exist before the rule can be evaluated.
  pub fn effective_window(&self) -> usize {
    self.config.window_size.max(self.family.required_len())
  }
}

impl TryFrom<RuleConfig> for ControlRule {
  type Error = Error;

  fn try_from(config: RuleConfig) -> Result<Self> { Self::from_config(config) }
}
