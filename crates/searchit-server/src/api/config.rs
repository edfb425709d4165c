//! Configuration API endpoint.
//!
//! Configuration is read once at startup; this endpoint reports the
//! effective values after file and environment layering.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use searchit_core::Config;

use crate::state::SharedState;

/// Creates the config router.
pub fn router() -> Router<SharedState> {
    Router::new().route("/", get(get_config))
}

/// Get the effective configuration.
#[utoipa::path(
    get,
    path = "/api/config",
    tag = "config",
    operation_id = "getConfig",
    summary = "Get current configuration",
    description = "Returns the beacon name, scan timeout, sampling interval, \
        proximity thresholds, registry and server settings in effect.",
    responses(
        (status = 200, description = "Configuration retrieved", body = Config)
    )
)]
pub async fn get_config(State(state): State<SharedState>) -> Json<Config> {
    Json(state.config().clone())
}
