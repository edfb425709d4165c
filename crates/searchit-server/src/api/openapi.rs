//! OpenAPI specification generation for the Search It API.
//!
//! The document is served at `/api/openapi.json` and written to the workspace
//! root by the `gen-openapi` binary for client generation.

use axum::Json;
use searchit_core::{
    BeaconConfig, Config, Connection, ConnectionState, DeviceId, DisconnectCause,
    DiscoveredDevice, ProximityConfig, ProximityLabel, ProximitySample, RegistryConfig,
    SamplerConfig, ScanState, ServerConfig, SessionEvent, SessionStatus, TrackedObject,
};
use utoipa::OpenApi;

use super::error::ErrorResponse;
use super::health::HealthResponse;
use super::objects::{CreateObjectRequest, ObjectListResponse, UpdateObjectRequest};
use super::pairing::{CancelScanResponse, EventsResponse, ScanAcceptedResponse};
use crate::state::LoggedEvent;

/// Serve the OpenAPI specification as JSON.
pub async fn get_openapi_spec() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Returns the OpenAPI specification as pretty-printed JSON.
///
/// # Errors
///
/// Returns an error if the document cannot be serialized.
pub fn get_openapi_json() -> Result<String, serde_json::Error> {
    ApiDoc::openapi().to_pretty_json()
}

/// Main OpenAPI document structure for Search It.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Search It API",
        version = "0.1.0",
        description = r"
# Search It API

Search It pairs a Bluetooth Low Energy beacon to an everyday object and tells
you how close it is.

## Flow

1. **Register** up to three objects and **select** the one to pair.
2. **Scan**: the server looks for a beacon advertising the configured name
   for a bounded time. On a match it connects and enumerates services.
3. **Monitor**: while connected, the signal strength is read once per
   interval and classified as `very_near`, `near`, `far` or `very_far`.
4. If the beacon drops out of range, a `disconnected` event with cause
   `link_lost` is recorded. Reconnecting is an explicit request.

Only one radio operation runs at a time: a scan and a connection attempt
never overlap.
",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "/", description = "Local Search It server")
    ),
    tags(
        (name = "system", description = "Health checks"),
        (name = "objects", description = "Tracked objects and selection"),
        (name = "pairing", description = "Beacon scan, connection and proximity monitoring"),
        (name = "config", description = "Effective configuration")
    ),
    paths(
        super::health::health_check,
        super::objects::list_objects,
        super::objects::create_object,
        super::objects::update_object,
        super::objects::select_object,
        super::objects::clear_selection,
        super::pairing::get_status,
        super::pairing::start_scan,
        super::pairing::cancel_scan,
        super::pairing::reconnect,
        super::pairing::disconnect,
        super::pairing::end_session,
        super::pairing::get_events,
        super::config::get_config,
    ),
    components(
        schemas(
            // Error types
            ErrorResponse,
            // Health types
            HealthResponse,
            // Object types
            TrackedObject,
            ObjectListResponse,
            CreateObjectRequest,
            UpdateObjectRequest,
            // Pairing types
            SessionStatus,
            ScanState,
            DiscoveredDevice,
            DeviceId,
            Connection,
            ConnectionState,
            ProximitySample,
            ProximityLabel,
            SessionEvent,
            DisconnectCause,
            LoggedEvent,
            EventsResponse,
            ScanAcceptedResponse,
            CancelScanResponse,
            // Config types
            Config,
            BeaconConfig,
            SamplerConfig,
            ProximityConfig,
            RegistryConfig,
            ServerConfig,
        )
    )
)]
pub struct ApiDoc;
