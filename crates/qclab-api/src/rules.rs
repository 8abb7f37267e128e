//! Handlers for `/rules` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/rules` | Raw configuration rows in catalog order |
//! | `POST` | `/rules` | Body: [`RuleConfig`]; upsert by `code`, 400 if unparseable |

use std::sync::Arc;

use axum::{Json, extract::State};
use qclab_core::{
  rule::{ControlRule, RuleConfig},
  store::QualityStore,
};
use serde::Serialize;

use crate::error::ApiError;

/// `GET /rules`
pub async fn list<S>(State(store): State<Arc<S>>) -> Result<Json<Vec<RuleConfig>>, ApiError>
where
  S: QualityStore,
{
  let rules = store.list_rule_configs().await.map_err(ApiError::store)?;
  Ok(Json(rules))
}

#[derive(Debug, Serialize)]
pub struct UpsertResponse {
  pub code:            String,
  pub catalog_version: u64,
}

/// `POST /rules`
pub async fn upsert<S>(
  State(store): State<Arc<S>>,
  Json(config): Json<RuleConfig>,
) -> Result<Json<UpsertResponse>, ApiError>
where
  S: QualityStore,
{
  // Reject rules the engine could never evaluate.
  let rule = ControlRule::from_config(config)?;
  let code = rule.code().to_owned();

  let catalog_version = store
    .upsert_rule(rule.config)
    .await
    .map_err(ApiError::store)?;
  tracing::info!(%code, catalog_version, "control rule saved");

  Ok(Json(UpsertResponse { code, catalog_version }))
}
