//!
//! nimbus HTTP front end
//! ---------------------
//! This module defines the Axum-based HTTP surface for nimbus.
//!
//! Responsibilities:
//! - Single POST endpoint accepting query-protocol form bodies and
//!   JSON-protocol bodies selected by the `X-Amz-Target` header.
//! - Building the action registry at boot and failing fast when a declared
//!   action has no handler.
//! - Mapping gateway `WireResponse` values onto HTTP status, content type and
//!   the `x-amzn-RequestId` header.
//! - Startup inventory logs.

use std::net::SocketAddr;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use tracing::info;

use crate::error::ApiError;
use crate::gateway::{Registry, WireResponse};
use crate::handlers;
use crate::store::SharedStore;
use crate::value::Value;
use crate::wire;

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: SharedStore,
    pub registry: std::sync::Arc<Registry>,
}

/// Build the full action registry for the shipped services.
pub fn build_registry() -> anyhow::Result<Registry> {
    handlers::register(Registry::builder()).build()
}

/// Start the nimbus HTTP server bound to the given port.
///
/// Builds the store and registry, logs the action inventory, and mounts the
/// routes. Returns only on listener failure.
pub async fn run_with_port(http_port: u16) -> anyhow::Result<()> {
    let store = SharedStore::new();
    let registry = build_registry()?;
    info!(
        target: "startup",
        "registry built: {} service(s), {} action(s)",
        registry.service_count(),
        registry.action_count()
    );

    let app_state = AppState { store, registry: std::sync::Arc::new(registry) };

    let app = Router::new()
        .route("/", get(|| async { "nimbus ok" }))
        .route("/", post(api_handler))
        .with_state(app_state);

    let addr: SocketAddr = format!("0.0.0.0:{}", http_port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Convenience entry point using the default port (5000).
pub async fn run() -> anyhow::Result<()> {
    let port = std::env::var("NIMBUS_HTTP_PORT")
        .ok()
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(5000);
    run_with_port(port).await
}

/// The single API endpoint. JSON-protocol requests carry an `X-Amz-Target`
/// header naming `<Service>.<Action>`; everything else is treated as a
/// form-encoded query-protocol body with an `Action` parameter.
async fn api_handler(State(state): State<AppState>, headers: HeaderMap, body: String) -> Response {
    let resp = match headers.get("x-amz-target").and_then(|v| v.to_str().ok()) {
        Some(target) => dispatch_json(&state, target, &body).await,
        None => dispatch_query(&state, &body).await,
    };
    to_http(resp)
}

async fn dispatch_query(state: &AppState, body: &str) -> WireResponse {
    let mut params = match wire::decode_request(body) {
        Ok(p) => p,
        Err(e) => return error_response(&e),
    };
    let Some(action) = params.take("Action").and_then(|v| v.scalar_string()) else {
        let e = ApiError::missing_parameter("Action");
        return error_response(&e);
    };
    params.take("Version");
    state.registry.dispatch(&state.store, "ec2", &action, params).await
}

async fn dispatch_json(state: &AppState, target: &str, body: &str) -> WireResponse {
    // targets look like "AmazonEC2.DescribeVpcs"
    let Some((service_part, action)) = target.split_once('.') else {
        let e = ApiError::malformed(format!("Invalid X-Amz-Target '{}'", target));
        return json_error_response(&e);
    };
    let service = service_part
        .to_ascii_lowercase()
        .trim_start_matches("amazon")
        .to_string();
    if state.registry.service(&service).is_none() {
        let e = ApiError::unsupported(target);
        return json_error_response(&e);
    }

    let json: serde_json::Value = if body.trim().is_empty() {
        serde_json::Value::Object(serde_json::Map::new())
    } else {
        match serde_json::from_str(body) {
            Ok(j) => j,
            Err(e) => {
                let e = ApiError::malformed(format!("Invalid JSON body: {}", e));
                return json_error_response(&e);
            }
        }
    };
    let params = Value::from_json(&json);
    state.registry.dispatch(&state.store, &service, action, params).await
}

/// Encode a decode-stage error in the provider document shape. Runs before
/// routing, so the query envelope is used directly.
fn error_response(err: &ApiError) -> WireResponse {
    let request_id = uuid::Uuid::new_v4().to_string();
    WireResponse {
        status: err.http_status(),
        content_type: "text/xml;charset=UTF-8",
        body: wire::xml_error(err.code_str(), err.message(), &request_id),
        request_id,
    }
}

/// Errors raised before a JSON-target request resolves to a service keep
/// the JSON error shape instead of falling back to the query envelope.
fn json_error_response(err: &ApiError) -> WireResponse {
    WireResponse {
        status: err.http_status(),
        content_type: "application/x-amz-json-1.1",
        body: wire::json_error(err.code_str(), err.message()),
        request_id: uuid::Uuid::new_v4().to_string(),
    }
}

fn to_http(resp: WireResponse) -> Response {
    let status = StatusCode::from_u16(resp.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut headers = HeaderMap::new();
    if let Ok(ct) = resp.content_type.parse() {
        headers.insert("content-type", ct);
    }
    if let Ok(rid) = resp.request_id.parse() {
        headers.insert("x-amzn-requestid", rid);
    }
    (status, headers, resp.body).into_response()
}
