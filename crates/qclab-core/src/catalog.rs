//! Versioned, immutable snapshots of the rule catalog.
//!
//! A snapshot is read once at the start of an evaluation batch and passed
//! into the engine by reference, so every point in the batch sees the same
//! rules. Reloading is the caller's job: fetch a new snapshot and compare
//! [`RuleSnapshot::version`].

use crate::rule::{ControlRule, RuleConfig};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleSnapshot {
  /// Monotonic catalog version the snapshot was read at.
  pub version: u64,
  /// Parsed rules in catalog order.
  pub rules:   Vec<ControlRule>,
}

impl RuleSnapshot {
  /// Parse `configs` into a snapshot, skipping (and logging) rows whose
  /// code or window cannot be evaluated.
  pub fn from_configs(
    version: u64,
    configs: impl IntoIterator<Item = RuleConfig>,
  ) -> Self {
    let rules = configs
      .into_iter()
      .filter_map(|config| match ControlRule::from_config(config) {
        Ok(rule) => Some(rule),
        Err(e) => {
          tracing::warn!(error = %e, "skipping misconfigured control rule");
          None
        }
      })
      .collect();
    Self { version, rules }
  }

  /// Active rules applicable to `level_id`, in catalog order.
  pub fn active_for<'a>(
    &'a self,
    level_id: &'a str,
  ) -> impl Iterator<Item = &'a ControlRule> + 'a {
    self
      .rules
      .iter()
      .filter(move |r| r.is_active() && r.applies_to(level_id))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::rule::Severity;

  #[test]
  fn misconfigured_rows_are_skipped() {
    let snapshot = RuleSnapshot::from_configs(3, vec![
      RuleConfig::new("1-3s", Severity::Critical),
      RuleConfig::new("bogus", Severity::Error),
      RuleConfig::new("2-2s", Severity::Error),
    ]);
    assert_eq!(snapshot.version, 3);
    let codes: Vec<_> = snapshot.rules.iter().map(|r| r.code()).collect();
    assert_eq!(codes, ["1-3s", "2-2s"]);
  }

  #[test]
  fn active_for_filters_inactive_and_other_levels() {
    let mut inactive = RuleConfig::new("1-2s", Severity::Warning);
    inactive.active = false;
    let mut high_only = RuleConfig::new("R-4s", Severity::Error);
    high_only.applies_to_levels = vec!["high".into()];

    let snapshot = RuleSnapshot::from_configs(1, vec![
      RuleConfig::new("1-3s", Severity::Critical),
      inactive,
      high_only,
      RuleConfig::new("10x", Severity::Warning),
    ]);

    let low: Vec<_> = snapshot.active_for("low").map(|r| r.code()).collect();
    assert_eq!(low, ["1-3s", "10x"]);
    let high: Vec<_> = snapshot.active_for("high").map(|r| r.code()).collect();
    assert_eq!(high, ["1-3s", "R-4s", "10x"]);
  }
}
