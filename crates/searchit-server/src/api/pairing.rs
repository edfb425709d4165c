//! Pairing session API endpoints.
//!
//! A scan runs in the background: `POST /api/pairing/scan` checks that a scan can
//! start, answers `202 Accepted`, and the scan, connect and monitoring that
//! follow are observed through `GET /api/pairing` and `GET /api/pairing/events`.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use searchit_core::{Connection, PairingOutcome, SessionStatus};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::api::error::ApiResult;
use crate::state::{LoggedEvent, SharedState};

/// Creates the pairing router with all endpoints.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(get_status))
        .route("/scan", post(start_scan))
        .route("/scan/cancel", post(cancel_scan))
        .route("/reconnect", post(reconnect))
        .route("/disconnect", post(disconnect))
        .route("/end", post(end_session))
        .route("/events", get(get_events))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// A scan was accepted and is running.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "target_name": "ESP32-Locator",
    "timeout_secs": 10
}))]
pub struct ScanAcceptedResponse {
    /// Advertised name being searched for.
    #[schema(example = "ESP32-Locator")]
    pub target_name: String,

    /// Seconds until the scan gives up.
    #[schema(example = 10)]
    pub timeout_secs: u64,
}

/// Result of a cancel request.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CancelScanResponse {
    /// Whether a running scan was stopped.
    pub cancelled: bool,
}

/// Recent session events, oldest first.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct EventsResponse {
    /// Recorded events.
    pub events: Vec<LoggedEvent>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Get the pairing session status.
#[utoipa::path(
    get,
    path = "/api/pairing",
    tag = "pairing",
    operation_id = "getPairingStatus",
    summary = "Get pairing status",
    description = "Returns the bound object, scan and connection state, and \
        the latest proximity reading.",
    responses(
        (status = 200, description = "Current session status", body = SessionStatus)
    )
)]
pub async fn get_status(State(state): State<SharedState>) -> Json<SessionStatus> {
    Json(state.session().status())
}

/// Start scanning for the beacon.
#[utoipa::path(
    post,
    path = "/api/pairing/scan",
    tag = "pairing",
    operation_id = "startScan",
    summary = "Scan for the beacon and pair it",
    description = "Starts a time-bounded scan for the configured beacon name. \
        On a match the beacon is connected and monitored automatically. \
        Follow progress through the status and events endpoints.",
    responses(
        (status = 202, description = "Scan started", body = ScanAcceptedResponse),
        (status = 409, description = "A scan is running or the radio is busy", body = super::error::ErrorResponse),
        (status = 412, description = "No object selected or a beacon is already connected", body = super::error::ErrorResponse)
    )
)]
pub async fn start_scan(
    State(state): State<SharedState>,
) -> ApiResult<(StatusCode, Json<ScanAcceptedResponse>)> {
    let session = state.session();
    session.ensure_ready_to_scan()?;

    let session = Arc::clone(session);
    tokio::spawn(async move {
        match session.start_scan().await {
            Ok(PairingOutcome::Paired(connection)) => {
                info!(device = %connection.device_id, "beacon paired");
            }
            Ok(PairingOutcome::Cancelled) => info!("pairing cancelled"),
            Err(e) if e.is_expected_state() => info!(error = %e, "pairing stopped"),
            Err(e) => warn!(error = %e, code = e.error_code(), "pairing failed"),
        }
    });

    let config = state.session().config();
    Ok((
        StatusCode::ACCEPTED,
        Json(ScanAcceptedResponse {
            target_name: config.target_name.clone(),
            timeout_secs: config.scan_timeout.as_secs(),
        }),
    ))
}

/// Cancel a running scan.
#[utoipa::path(
    post,
    path = "/api/pairing/scan/cancel",
    tag = "pairing",
    operation_id = "cancelScan",
    summary = "Cancel the running scan",
    description = "Stops a running scan. Does nothing if no scan is running.",
    responses(
        (status = 200, description = "Cancel processed", body = CancelScanResponse)
    )
)]
pub async fn cancel_scan(State(state): State<SharedState>) -> Json<CancelScanResponse> {
    Json(CancelScanResponse {
        cancelled: state.session().cancel_scan(),
    })
}

/// Reconnect to the last paired beacon.
#[utoipa::path(
    post,
    path = "/api/pairing/reconnect",
    tag = "pairing",
    operation_id = "reconnect",
    summary = "Reconnect the beacon",
    description = "Reconnects to the previously paired beacon after a \
        disconnect. Only accepted while disconnected.",
    responses(
        (status = 200, description = "Beacon reconnected and monitored", body = Connection),
        (status = 409, description = "Not disconnected, or nothing was paired", body = super::error::ErrorResponse),
        (status = 502, description = "The beacon could not be reached", body = super::error::ErrorResponse)
    )
)]
pub async fn reconnect(State(state): State<SharedState>) -> ApiResult<Json<Connection>> {
    Ok(Json(state.session().reconnect().await?))
}

/// Disconnect the beacon.
#[utoipa::path(
    post,
    path = "/api/pairing/disconnect",
    tag = "pairing",
    operation_id = "disconnect",
    summary = "Disconnect the beacon",
    description = "Disconnects the beacon and stops sampling. Always succeeds.",
    responses(
        (status = 200, description = "Status after disconnecting", body = SessionStatus)
    )
)]
pub async fn disconnect(State(state): State<SharedState>) -> Json<SessionStatus> {
    state.session().disconnect().await;
    Json(state.session().status())
}

/// End the pairing session.
#[utoipa::path(
    post,
    path = "/api/pairing/end",
    tag = "pairing",
    operation_id = "endSession",
    summary = "End the pairing session",
    description = "Cancels any scan and disconnects the beacon. Every later \
        pairing request is refused until the server restarts.",
    responses(
        (status = 200, description = "Status after ending", body = SessionStatus)
    )
)]
pub async fn end_session(State(state): State<SharedState>) -> Json<SessionStatus> {
    state.session().end().await;
    Json(state.session().status())
}

/// Get recent session events.
#[utoipa::path(
    get,
    path = "/api/pairing/events",
    tag = "pairing",
    operation_id = "getPairingEvents",
    summary = "List recent pairing events",
    responses(
        (status = 200, description = "Recent events, oldest first", body = EventsResponse)
    )
)]
pub async fn get_events(State(state): State<SharedState>) -> Json<EventsResponse> {
    Json(EventsResponse {
        events: state.events().snapshot(),
    })
}
