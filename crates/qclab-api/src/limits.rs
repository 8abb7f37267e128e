//! Handlers for `/limits` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/limits` | `?analyte_id&lot_id&instrument_id&level_id`; 404 if unset |
//! | `PUT`  | `/limits` | Body: context fields plus `mean`, `standard_deviation` |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Query, State},
};
use qclab_core::{
  limits::{ControlContext, ControlLimits},
  store::QualityStore,
};
use serde::Deserialize;

use crate::error::ApiError;

/// `GET /limits?analyte_id=..&lot_id=..&instrument_id=..&level_id=..`
pub async fn get_one<S>(
  State(store): State<Arc<S>>,
  Query(context): Query<ControlContext>,
) -> Result<Json<ControlLimits>, ApiError>
where
  S: QualityStore,
{
  let limits = store
    .get_limits(&context)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("no limits for {context:?}")))?;
  Ok(Json(limits))
}

#[derive(Debug, Deserialize)]
pub struct PutBody {
  #[serde(flatten)]
  pub context: ControlContext,
  #[serde(flatten)]
  pub limits:  ControlLimits,
}

/// `PUT /limits`
///
/// A zero SD is accepted (evaluation then reports `invalid-sd`); negative
/// or non-finite values are not.
pub async fn put<S>(
  State(store): State<Arc<S>>,
  Json(body): Json<PutBody>,
) -> Result<Json<ControlLimits>, ApiError>
where
  S: QualityStore,
{
  let PutBody { context, limits } = body;
  let sd = limits.standard_deviation;
  if !limits.mean.is_finite() || !sd.is_finite() || sd < 0.0 {
    return Err(ApiError::BadRequest(format!(
      "mean must be finite and standard deviation finite and non-negative, got {} / {sd}",
      limits.mean
    )));
  }

  store
    .put_limits(&context, limits)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(limits))
}
