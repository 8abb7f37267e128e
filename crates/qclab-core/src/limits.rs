//! Evaluation context, control limits, and the z-score calculator.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// The (analyte, lot, instrument, level) tuple that identifies one run.
///
/// Evaluations for different contexts share no state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ControlContext {
  pub analyte_id:    String,
  pub lot_id:        String,
  pub instrument_id: String,
  pub level_id:      String,
}

impl ControlContext {
  pub fn new(
    analyte_id: impl Into<String>,
    lot_id: impl Into<String>,
    instrument_id: impl Into<String>,
    level_id: impl Into<String>,
  ) -> Self {
    Self {
      analyte_id:    analyte_id.into(),
      lot_id:        lot_id.into(),
      instrument_id: instrument_id.into(),
      level_id:      level_id.into(),
    }
  }
}

/// Externally supplied mean and standard deviation for one context.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlLimits {
  pub mean:               f64,
  pub standard_deviation: f64,
}

impl ControlLimits {
  pub fn new(mean: f64, standard_deviation: f64) -> Self {
    Self { mean, standard_deviation }
  }

  /// Fails with [`Error::InvalidLimits`] unless the SD is finite and
  /// strictly positive and the mean is finite.
  pub fn validate(&self) -> Result<()> {
    let sd = self.standard_deviation;
    if !self.mean.is_finite() || !sd.is_finite() || sd <= 0.0 {
      return Err(Error::InvalidLimits { mean: self.mean, sd });
    }
    Ok(())
  }
}

/// Standardised deviation of `value` from the mean, in SD units.
pub fn z_score(value: f64, limits: &ControlLimits) -> Result<f64> {
  limits.validate()?;
  Ok((value - limits.mean) / limits.standard_deviation)
}
