//! Measurement points and run ordering.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::limits::ControlContext;

/// One stored control measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementPoint {
  pub measurement_id: Uuid,
  pub context:        ControlContext,
  pub value:          f64,
  /// Calendar date the control was run.
  pub measured_on:    NaiveDate,
  /// Server-assigned; breaks ties between measurements on the same date.
  pub recorded_at:    DateTime<Utc>,
}

/// Input to [`crate::store::QualityStore::append_measurement`].
/// `measurement_id` and `recorded_at` are always set by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMeasurement {
  pub context:     ControlContext,
  pub value:       f64,
  pub measured_on: NaiveDate,
}

/// Sort `points` into run order: by date, then recording time. The sort is
/// stable, so points that tie on both keep their insertion order.
pub fn sort_run(points: &mut [MeasurementPoint]) {
  points.sort_by_key(|p| (p.measured_on, p.recorded_at));
}

/// Raw values of a run, oldest first.
pub fn run_values(points: &[MeasurementPoint]) -> Vec<f64> {
  points.iter().map(|p| p.value).collect()
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone as _;

  use super::*;

  fn point(day: u32, secs: i64, value: f64) -> MeasurementPoint {
    MeasurementPoint {
      measurement_id: Uuid::new_v4(),
      context:        ControlContext::new("GLU", "L1", "I1", "normal"),
      value,
      measured_on:    NaiveDate::from_ymd_opt(2024, 3, day).unwrap(),
      recorded_at:    Utc.timestamp_opt(secs, 0).unwrap(),
    }
  }

  #[test]
  fn run_order_is_date_then_recording_time_then_insertion() {
    let mut points = vec![
      point(2, 10, 1.0),
      point(1, 50, 2.0),
      point(1, 20, 3.0),
      point(1, 20, 4.0),
    ];
    sort_run(&mut points);
    assert_eq!(run_values(&points), [3.0, 4.0, 2.0, 1.0]);
  }
}
