//! Liveness probe.
//!
//! Reports the radio backend and where the beacon connection stands, so a
//! supervisor can tell a running server with no beacon from a dead one.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use searchit_core::ConnectionState;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::state::SharedState;

/// Liveness report.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "status": "ok",
    "version": "0.1.0",
    "radio": "bluez",
    "connection_state": "monitoring",
    "session_ended": false
}))]
pub struct HealthResponse {
    /// Always `ok` while the server answers.
    #[schema(example = "ok")]
    pub status: String,

    #[schema(example = "0.1.0")]
    pub version: String,

    /// `bluez` or `simulated`.
    #[schema(example = "bluez")]
    pub radio: String,

    /// Beacon connection state.
    pub connection_state: ConnectionState,

    /// Set once `POST /api/pairing/end` was called.
    #[schema(example = false)]
    pub session_ended: bool,
}

/// Creates the health router.
pub fn router() -> Router<SharedState> {
    Router::new().route("/", get(health_check))
}

/// Report liveness.
#[utoipa::path(
    get,
    path = "/health",
    tag = "system",
    operation_id = "healthCheck",
    summary = "Check the server is up",
    description = "Answers as long as the server runs, with the radio backend \
        and the beacon connection state.",
    responses(
        (status = 200, description = "Server is up", body = HealthResponse)
    )
)]
pub async fn health_check(State(state): State<SharedState>) -> Json<HealthResponse> {
    let session = state.session();
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        radio: state.backend().to_string(),
        connection_state: session.status().connection_state,
        session_ended: session.is_ended(),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use searchit_core::{Config, ObjectStore, SimulatedTransport};

    use super::*;
    use crate::beacon::BeaconTransport;
    use crate::state::AppState;

    #[tokio::test]
    async fn test_reports_idle_radio() {
        let state = Arc::new(AppState::with_parts(
            Config::default(),
            Arc::new(ObjectStore::in_memory(3)),
            BeaconTransport::simulated(SimulatedTransport::new()),
        ));

        let Json(report) = health_check(State(state)).await;
        assert_eq!(report.radio, "simulated");
        assert_eq!(report.connection_state, ConnectionState::Disconnected);
        assert!(!report.session_ended);
    }
}
