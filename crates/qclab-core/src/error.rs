//! Error types for `qclab-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// Zero, negative, or non-finite standard deviation (or a non-finite mean).
  #[error("invalid control limits: mean {mean}, sd {sd}")]
  InvalidLimits { mean: f64, sd: f64 },

  /// A rule code matches none of the known family shapes.
  #[error("unrecognized rule shape: {0:?}")]
  UnrecognizedRuleShape(String),

  #[error("rule {0:?} has a window size of zero")]
  InvalidWindow(String),

  #[error("unknown severity: {0:?}")]
  UnknownSeverity(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
