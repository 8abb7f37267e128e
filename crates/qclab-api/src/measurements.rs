//! Handlers for `/measurements` and `/reprocess` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/measurements` | Run for `?analyte_id&lot_id&instrument_id&level_id` |
//! | `POST` | `/measurements` | Body: [`NewMeasurement`]; stores, evaluates, records; 201 |
//! | `GET`  | `/measurements/{id}` | Single measurement |
//! | `POST` | `/reprocess` | Body: context; re-classifies the whole run |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use qclab_core::{
  limits::ControlContext,
  measurement::{MeasurementPoint, NewMeasurement},
  store::QualityStore,
  workflow::{self, ReprocessReport},
};
use uuid::Uuid;

use crate::error::ApiError;

/// `GET /measurements?analyte_id=..&lot_id=..&instrument_id=..&level_id=..`
pub async fn list<S>(
  State(store): State<Arc<S>>,
  Query(context): Query<ControlContext>,
) -> Result<Json<Vec<MeasurementPoint>>, ApiError>
where
  S: QualityStore,
{
  let run = store.get_run(&context).await.map_err(ApiError::store)?;
  Ok(Json(run))
}

/// `POST /measurements`
pub async fn create<S>(
  State(store): State<Arc<S>>,
  Json(body): Json<NewMeasurement>,
) -> Result<impl IntoResponse, ApiError>
where
  S: QualityStore,
{
  if !body.value.is_finite() {
    return Err(ApiError::BadRequest("measurement value must be finite".into()));
  }

  let outcome = workflow::record_and_evaluate(store.as_ref(), body)
    .await
    .map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(outcome)))
}

/// `GET /measurements/{id}`
pub async fn get_one<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<MeasurementPoint>, ApiError>
where
  S: QualityStore,
{
  let point = store
    .get_measurement(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("measurement {id} not found")))?;
  Ok(Json(point))
}

/// `POST /reprocess`
pub async fn reprocess<S>(
  State(store): State<Arc<S>>,
  Json(context): Json<ControlContext>,
) -> Result<Json<ReprocessReport>, ApiError>
where
  S: QualityStore,
{
  let report = workflow::reprocess_context(store.as_ref(), &context)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(report))
}
