//! Handlers for `/violations` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/violations` | Optional context fields, `status`, `limit` |
//! | `POST` | `/violations/{id}/disposition` | Body: [`Disposition`]; 404 if unknown |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
};
use qclab_core::{
  store::QualityStore,
  violation::{Disposition, Violation, ViolationFilter},
};

use crate::error::ApiError;

/// `GET /violations`
///
/// All filter fields are optional: `analyte_id`, `lot_id`, `instrument_id`,
/// `level_id`, `status`, `limit`.
pub async fn list<S>(
  State(store): State<Arc<S>>,
  Query(filter): Query<ViolationFilter>,
) -> Result<Json<Vec<Violation>>, ApiError>
where
  S: QualityStore,
{
  let violations = store
    .list_violations(&filter)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(violations))
}

/// `POST /violations/{id}/disposition`
pub async fn set_disposition<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<String>,
  Json(disposition): Json<Disposition>,
) -> Result<Json<Violation>, ApiError>
where
  S: QualityStore,
{
  let violation = store
    .set_disposition(id.clone(), disposition)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("violation {id} not found")))?;
  Ok(Json(violation))
}
