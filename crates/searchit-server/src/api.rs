//! HTTP API routes and handlers.
//!
//! This module contains all HTTP endpoint implementations organized by domain:
//! - `health` - Service health checks
//! - `objects` - Tracked-object registry and selection
//! - `pairing` - Beacon scan, connection and proximity monitoring
//! - `config` - Effective configuration
//! - `error` - API error types
//! - `openapi` - OpenAPI specification generation

use axum::routing::get;
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::SharedState;

pub mod config;
pub mod error;
pub mod health;
pub mod objects;
pub mod openapi;
pub mod pairing;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use openapi::get_openapi_json;

/// Creates the combined API router with all endpoints.
///
/// # Route Structure
///
/// ```text
/// /health                - Health check
/// /api
/// ├── /objects           - List, register, edit and select objects
/// ├── /pairing           - Status, scan, cancel, reconnect, disconnect, end, events
/// ├── /config            - Effective configuration
/// └── /openapi.json      - OpenAPI specification
/// ```
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .nest("/health", health::router())
        .nest(
            "/api",
            Router::new()
                .route("/openapi.json", get(openapi::get_openapi_spec))
                .nest("/objects", objects::router())
                .nest("/pairing", pairing::router())
                .nest("/config", config::router()),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use searchit_core::{Config, ObjectStore, SimulatedTransport};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::beacon::BeaconTransport;
    use crate::state::AppState;

    fn app_with(sim: SimulatedTransport) -> (Router, SharedState) {
        let state = Arc::new(AppState::with_parts(
            Config::default(),
            Arc::new(ObjectStore::in_memory(3)),
            BeaconTransport::simulated(sim),
        ));
        (create_router(Arc::clone(&state)), state)
    }

    async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn select_new_object(app: &Router) -> String {
        let (status, object) = call(
            app,
            Method::POST,
            "/api/objects",
            Some(json!({"name": "Keys", "description": "Hallway shelf"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = object["id"].as_str().unwrap().to_string();

        let (status, _) = call(app, Method::POST, &format!("/api/objects/{id}/select"), None).await;
        assert_eq!(status, StatusCode::OK);
        id
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = app_with(SimulatedTransport::new());
        let (status, body) = call(&app, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["radio"], "simulated");
        assert_eq!(body["connection_state"], "disconnected");
    }

    #[tokio::test]
    async fn test_object_registry_round() {
        let (app, _) = app_with(SimulatedTransport::new());
        let id = select_new_object(&app).await;

        let (status, body) = call(
            &app,
            Method::PUT,
            &format!("/api/objects/{id}"),
            Some(json!({"name": "House keys", "description": "Bowl by the door"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "House keys");

        let (_, list) = call(&app, Method::GET, "/api/objects", None).await;
        assert_eq!(list["objects"].as_array().map(Vec::len), Some(1));
        assert_eq!(list["selected"], id.as_str());

        let (status, _) = call(&app, Method::DELETE, "/api/objects/selection", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (_, list) = call(&app, Method::GET, "/api/objects", None).await;
        assert!(list["selected"].is_null());
    }

    #[tokio::test]
    async fn test_registry_errors() {
        let (app, _) = app_with(SimulatedTransport::new());

        let (status, body) = call(&app, Method::POST, "/api/objects", Some(json!({"name": "  "}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "EMPTY_OBJECT_NAME");

        for name in ["a", "b", "c"] {
            let (status, _) = call(&app, Method::POST, "/api/objects", Some(json!({"name": name}))).await;
            assert_eq!(status, StatusCode::CREATED);
        }
        let (status, body) = call(&app, Method::POST, "/api/objects", Some(json!({"name": "d"}))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "MAX_OBJECTS_REACHED");

        let unknown = uuid::Uuid::now_v7();
        let (status, _) = call(&app, Method::POST, &format!("/api/objects/{unknown}/select"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_scan_without_selection_is_refused() {
        let sim = SimulatedTransport::new();
        let (app, _) = app_with(sim.clone());

        let (status, body) = call(&app, Method::POST, "/api/pairing/scan", None).await;
        assert_eq!(status, StatusCode::PRECONDITION_FAILED);
        assert_eq!(body["error"], "PRECONDITION_FAILED");
        assert_eq!(sim.discover_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_pairs_and_monitors() {
        let sim = SimulatedTransport::demo(searchit_core::DEFAULT_BEACON_NAME);
        let (app, _) = app_with(sim.clone());
        select_new_object(&app).await;

        let (status, body) = call(&app, Method::POST, "/api/pairing/scan", None).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["target_name"], "ESP32-Locator");
        assert_eq!(body["timeout_secs"], 10);

        tokio::time::sleep(Duration::from_secs(5)).await;
        let (_, status_body) = call(&app, Method::GET, "/api/pairing", None).await;
        assert_eq!(status_body["connection_state"], "monitoring");
        assert_eq!(status_body["object"]["name"], "Keys");
        assert_eq!(status_body["sampling"], true);
        assert!(status_body["latest_sample"]["label"].is_string());

        let (status, body) = call(&app, Method::POST, "/api/pairing/scan", None).await;
        assert_eq!(status, StatusCode::PRECONDITION_FAILED);
        assert_eq!(body["error"], "PRECONDITION_FAILED");

        let (status, body) = call(&app, Method::POST, "/api/pairing/disconnect", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["connection_state"], "disconnected");

        tokio::time::sleep(Duration::from_millis(10)).await;
        let (_, events) = call(&app, Method::GET, "/api/pairing/events", None).await;
        let kinds: Vec<&str> = events["events"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|e| e["event"]["event"].as_str())
            .collect();
        assert_eq!(
            kinds,
            vec!["scan_started", "device_found", "connecting", "paired", "disconnected"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_after_disconnect() {
        let sim = SimulatedTransport::demo(searchit_core::DEFAULT_BEACON_NAME);
        let (app, _) = app_with(sim.clone());
        select_new_object(&app).await;

        let (status, _) = call(&app, Method::POST, "/api/pairing/reconnect", None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        call(&app, Method::POST, "/api/pairing/scan", None).await;
        tokio::time::sleep(Duration::from_secs(5)).await;
        call(&app, Method::POST, "/api/pairing/disconnect", None).await;

        let (status, body) = call(&app, Method::POST, "/api/pairing/reconnect", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"], "monitoring");
        assert_eq!(body["device_id"], "24:6F:28:00:00:01");
        assert_eq!(sim.connect_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_running_scan() {
        let sim = SimulatedTransport::new();
        let (app, _) = app_with(sim.clone());
        select_new_object(&app).await;

        call(&app, Method::POST, "/api/pairing/scan", None).await;
        tokio::time::sleep(Duration::from_secs(1)).await;

        let (status, body) = call(&app, Method::POST, "/api/pairing/scan", None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "RADIO_BUSY");

        let (_, body) = call(&app, Method::POST, "/api/pairing/scan/cancel", None).await;
        assert_eq!(body["cancelled"], true);
        tokio::time::sleep(Duration::from_millis(10)).await;

        let (_, status_body) = call(&app, Method::GET, "/api/pairing", None).await;
        assert_eq!(status_body["scan"]["state"], "idle");
        assert_eq!(status_body["connection_state"], "disconnected");
        assert!(!sim.is_discovering());
    }

    #[tokio::test]
    async fn test_end_refuses_later_scans() {
        let (app, state) = app_with(SimulatedTransport::new());
        select_new_object(&app).await;

        let (status, body) = call(&app, Method::POST, "/api/pairing/end", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ended"], true);
        assert!(state.session().is_ended());

        let (status, body) = call(&app, Method::POST, "/api/pairing/scan", None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "INVALID_STATE");
    }

    #[tokio::test]
    async fn test_config_and_openapi_are_served() {
        let (app, _) = app_with(SimulatedTransport::new());

        let (status, config) = call(&app, Method::GET, "/api/config", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(config["beacon"]["name"], "ESP32-Locator");
        assert_eq!(config["sampler"]["interval_ms"], 1000);

        let (status, spec) = call(&app, Method::GET, "/api/openapi.json", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(spec["paths"]["/api/pairing/scan"].is_object());
    }
}
