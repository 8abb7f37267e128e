//! JSON REST API for qclab.
//!
//! Exposes an axum [`Router`] backed by any
//! [`qclab_core::store::QualityStore`]. Auth and TLS are the caller's
//! responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", qclab_api::api_router(store.clone()))
//! ```

pub mod error;
pub mod evaluate;
pub mod limits;
pub mod measurements;
pub mod rules;
pub mod violations;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use qclab_core::store::QualityStore;
use tower_http::trace::TraceLayer;

pub use error::ApiError;

/// Build a fully-materialised API router for `store`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(store: Arc<S>) -> Router<()>
where
  S: QualityStore + Send + Sync + 'static,
{
  Router::new()
    // Stateless evaluation
    .route("/evaluate", post(evaluate::newest))
    .route("/evaluate/series", post(evaluate::series))
    // Rule catalog
    .route("/rules", get(rules::list::<S>).post(rules::upsert::<S>))
    // Control limits
    .route("/limits", get(limits::get_one::<S>).put(limits::put::<S>))
    // Measurements
    .route(
      "/measurements",
      get(measurements::list::<S>).post(measurements::create::<S>),
    )
    .route("/measurements/{id}", get(measurements::get_one::<S>))
    .route("/reprocess", post(measurements::reprocess::<S>))
    // Violations
    .route("/violations", get(violations::list::<S>))
    .route(
      "/violations/{id}/disposition",
      post(violations::set_disposition::<S>),
    )
    .layer(TraceLayer::new_for_http())
    .with_state(store)
}
