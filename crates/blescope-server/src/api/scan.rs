//! Scan control and adapter API endpoints.

use axum::body::Bytes;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use blescope_core::{AdapterInfo, ScanMode, ScanStatus};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

use crate::api::error::{ApiError, ApiResult};
use crate::state::SharedState;

/// Creates the scan router.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(get_scan))
        .route("/start", post(start_scan))
        .route("/stop", post(stop_scan))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Scan state.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "status": "scanning",
    "radio_scanning": true,
    "device_count": 4,
    "last_error": null,
    "scan_notice": null,
    "default_duration_secs": 10
}))]
pub struct ScanStateResponse {
    /// Scan lifecycle as recorded by the catalog.
    pub status: ScanStatus,

    /// Whether the radio reports a running scan.
    pub radio_scanning: bool,

    /// Devices in the catalog.
    #[schema(example = 4)]
    pub device_count: usize,

    /// Message of the last scan failure, if any.
    #[schema(nullable)]
    pub last_error: Option<String>,

    /// Latest informational notice, e.g. an automatic scan restart.
    #[schema(nullable)]
    pub scan_notice: Option<String>,

    /// Duration used when a start request names none; 0 means continuous.
    #[schema(example = 10)]
    pub default_duration_secs: u64,
}

/// Scan start request.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[schema(example = json!({"duration_secs": 30}))]
pub struct StartScanRequest {
    /// Duration in seconds, clamped to 1..=180. 0 scans until stopped.
    /// Omit to use the configured default.
    #[schema(example = 30)]
    pub duration_secs: Option<u64>,
}

/// Scan start result.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({"continuous": false, "duration_secs": 30}))]
pub struct StartScanResponse {
    /// Whether the scan runs until stopped.
    pub continuous: bool,

    /// Effective duration after clamping; absent for continuous scans.
    #[schema(nullable)]
    pub duration_secs: Option<u64>,
}

impl From<ScanMode> for StartScanResponse {
    fn from(mode: ScanMode) -> Self {
        match mode {
            ScanMode::Continuous => Self {
                continuous: true,
                duration_secs: None,
            },
            ScanMode::Timed(duration) => Self {
                continuous: false,
                duration_secs: Some(duration.as_secs()),
            },
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Get scan state.
#[utoipa::path(
    get,
    path = "/api/scan",
    tag = "scan",
    operation_id = "getScan",
    summary = "Get scan state",
    responses(
        (status = 200, description = "Scan state", body = ScanStateResponse)
    )
)]
pub async fn get_scan(State(state): State<SharedState>) -> Json<ScanStateResponse> {
    let snapshot = state.monitor.snapshot();
    let default_duration_secs = if state.config.scan.continuous {
        0
    } else {
        state.config.scan.default_duration_secs
    };

    Json(ScanStateResponse {
        status: snapshot.scan_status,
        radio_scanning: state.radio.is_scanning().await,
        device_count: snapshot.devices.len(),
        last_error: snapshot.last_error.clone(),
        scan_notice: snapshot.scan_notice.clone(),
        default_duration_secs,
    })
}

/// Start a scan.
#[utoipa::path(
    post,
    path = "/api/scan/start",
    tag = "scan",
    operation_id = "startScan",
    summary = "Start scanning",
    description = "Starts (or restarts) discovery. The catalog is kept; devices seen in \
        earlier scans stay listed. Timed scans end with status `completed`.",
    request_body(content = StartScanRequest, description = "Optional; an empty body uses the configured default"),
    responses(
        (status = 200, description = "Scan started", body = StartScanResponse),
        (status = 503, description = "Adapter unavailable", body = super::error::ErrorResponse)
    )
)]
pub async fn start_scan(
    State(state): State<SharedState>,
    body: Bytes,
) -> ApiResult<Json<StartScanResponse>> {
    let request = if body.is_empty() {
        StartScanRequest::default()
    } else {
        serde_json::from_slice::<StartScanRequest>(&body).map_err(|e| ApiError::BadRequest {
            error_code: "INVALID_BODY".to_string(),
            message: e.to_string(),
        })?
    };

    let mode = state.config.scan.scan_mode(request.duration_secs);
    state.radio.start_scan(mode).await?;
    info!(?mode, "scan started via API");

    Ok(Json(StartScanResponse::from(mode)))
}

/// Stop the running scan.
#[utoipa::path(
    post,
    path = "/api/scan/stop",
    tag = "scan",
    operation_id = "stopScan",
    summary = "Stop scanning",
    description = "Stops discovery, merges anything still pending and sets the status \
        to `idle`. Stopping when idle is not an error.",
    responses(
        (status = 200, description = "Scan stopped", body = ScanStateResponse),
        (status = 503, description = "Adapter or monitor unavailable", body = super::error::ErrorResponse)
    )
)]
pub async fn stop_scan(State(state): State<SharedState>) -> ApiResult<Json<ScanStateResponse>> {
    state.radio.stop_scan().await?;
    state.monitor.flush_now().await?;
    state.monitor.set_scan_status(ScanStatus::Idle).await?;
    info!("scan stopped via API");

    Ok(get_scan(State(state)).await)
}

/// List local adapters.
#[utoipa::path(
    get,
    path = "/api/adapters",
    tag = "scan",
    operation_id = "listAdapters",
    summary = "List Bluetooth adapters",
    responses(
        (status = 200, description = "Adapters", body = Vec<AdapterInfo>),
        (status = 503, description = "No adapter available", body = super::error::ErrorResponse)
    )
)]
pub async fn list_adapters(State(state): State<SharedState>) -> ApiResult<Json<Vec<AdapterInfo>>> {
    Ok(Json(state.radio.adapters().await?))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_start_response_from_mode() {
        let timed = StartScanResponse::from(ScanMode::Timed(Duration::from_secs(30)));
        assert!(!timed.continuous);
        assert_eq!(timed.duration_secs, Some(30));

        let continuous = StartScanResponse::from(ScanMode::Continuous);
        assert!(continuous.continuous);
        assert_eq!(continuous.duration_secs, None);
    }
}
