//! Health check API endpoint.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use blescope_core::ScanStatus;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::state::SharedState;

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "status": "ok",
    "version": "0.1.0",
    "radio_backend": "bluez",
    "scan_status": "scanning",
    "device_count": 12,
    "uptime_secs": 3600,
    "checked_at_utc": "2025-01-15T03:30:00Z"
}))]
pub struct HealthResponse {
    /// Service status.
    #[schema(example = "ok")]
    pub status: String,

    /// Service version from Cargo.toml.
    #[schema(example = "0.1.0")]
    pub version: String,

    /// Radio implementation in use (`bluez` or `mock`).
    #[schema(example = "bluez")]
    pub radio_backend: String,

    /// Current scan lifecycle state.
    pub scan_status: ScanStatus,

    /// Devices in the catalog.
    #[schema(example = 12)]
    pub device_count: usize,

    /// Seconds since the server started.
    #[schema(example = 3600)]
    pub uptime_secs: u64,

    /// When this response was produced.
    #[schema(example = "2025-01-15T03:30:00Z")]
    pub checked_at_utc: String,
}

/// Creates the health router.
pub fn router() -> Router<SharedState> {
    Router::new().route("/", get(health_check))
}

/// Health check endpoint.
#[utoipa::path(
    get,
    path = "/health",
    tag = "system",
    operation_id = "healthCheck",
    summary = "Check service health",
    description = "Returns service status, the radio backend and a summary of the \
        device catalog. Use this endpoint for monitoring.",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
pub async fn health_check(State(state): State<SharedState>) -> Json<HealthResponse> {
    let snapshot = state.monitor.snapshot();

    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        radio_backend: state.radio.backend().to_string(),
        scan_status: snapshot.scan_status,
        device_count: snapshot.devices.len(),
        uptime_secs: state.uptime_secs(),
        checked_at_utc: Utc::now().to_rfc3339(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_response_serialization() {
        let response = HealthResponse {
            status: "ok".to_string(),
            version: "0.1.0".to_string(),
            radio_backend: "mock".to_string(),
            scan_status: ScanStatus::Idle,
            device_count: 0,
            uptime_secs: 5,
            checked_at_utc: "2025-01-15T03:30:00Z".to_string(),
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"status\":\"ok\""));
        assert!(json.contains("\"scan_status\":\"idle\""));
    }
}
