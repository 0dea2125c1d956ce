//! HTTP API routes and handlers.
//!
//! This module contains all HTTP endpoint implementations organized by domain:
//! - `devices` - Catalog listing, detail, advertisement decoding, connections
//! - `gatt` - Services, characteristic read/write, subscriptions
//! - `scan` - Scan control and adapters
//! - `decode` - On-demand decoding and name lookup
//! - `settings` - Theme and locale
//! - `events` - Server-Sent Events stream
//! - `health` - Service health checks
//! - `error` - API error types
//! - `openapi` - OpenAPI specification generation

use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::state::SharedState;

pub mod decode;
pub mod devices;
pub mod error;
pub mod events;
pub mod gatt;
pub mod health;
pub mod openapi;
pub mod scan;
pub mod settings;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use openapi::{get_openapi_json, ApiDoc};

/// Creates the combined API router with all endpoints.
///
/// # Route Structure
///
/// ```text
/// /health                                  - Health check
/// /swagger-ui                              - Interactive API docs
/// /api
/// ├── /devices                             - List (filtered, ranked) / clear
/// │   └── /{id}                            - Detail
/// │       ├── /advertisement               - Decoded frame + hex dump
/// │       ├── /manufacturer-data           - Company-resolved summaries
/// │       ├── /connect, /disconnect        - Guarded connection commands
/// │       ├── /services                    - GATT discovery
/// │       └── /characteristics/{svc}/{chr} - Read / write
/// │           └── /subscription            - Subscribe / unsubscribe
/// ├── /scan                                - State, /start, /stop
/// ├── /adapters                            - Local adapters
/// ├── /decode?hex=                         - On-demand decode
/// ├── /names/{table}/{id}                  - Name lookup
/// ├── /settings                            - Theme and locale
/// ├── /events                              - Server-Sent Events
/// └── /openapi.json                        - OpenAPI specification
/// ```
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .nest("/health", health::router())
        .nest(
            "/api",
            Router::new()
                .nest("/devices", devices::router().merge(gatt::router()))
                .nest("/scan", scan::router())
                .route("/adapters", get(scan::list_adapters))
                .merge(decode::router())
                .nest("/settings", settings::router())
                .nest("/events", events::router())
                .route("/openapi.json", get(openapi::get_openapi_spec)),
        )
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
