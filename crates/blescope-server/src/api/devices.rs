//! Device catalog API endpoints.
//!
//! Listing, detail, advertisement decoding and connect/disconnect. GATT
//! access under `/devices/{id}/...` lives in [`super::gatt`].

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use blescope_core::gatt::{device_category_from_services, DeviceCategory};
use blescope_core::view::{self, DeviceFilter, DEFAULT_MAX_RSSI, DEFAULT_MIN_RSSI};
use blescope_core::{
    decode_with, format_hex_block, format_manufacturer_data, synthesize_raw_advertisement,
    CanonicalDevice, ConnectableFilter, ConnectionOutcome, ManufacturerDataSummary,
    ParsedAdvertisement, ScanStatus,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::api::error::{ApiError, ApiResult};
use crate::state::SharedState;

/// Bytes per line in hex dumps.
pub const HEX_DUMP_WIDTH: usize = 16;

/// Creates the devices router.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(list_devices).delete(clear_devices))
        .route("/{id}", get(get_device))
        .route("/{id}/advertisement", get(get_advertisement))
        .route("/{id}/manufacturer-data", get(get_manufacturer_data))
        .route("/{id}/connect", post(connect_device))
        .route("/{id}/disconnect", post(disconnect_device))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Display filter for the device list. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DeviceQuery {
    /// Case-insensitive substring of the advertised name.
    #[param(example = "buds")]
    pub name: Option<String>,

    /// Case-insensitive substring of the address.
    #[param(example = "0C:1D")]
    pub address: Option<String>,

    /// Inclusive lower RSSI bound (default -100).
    #[param(example = -80)]
    pub min_rssi: Option<i16>,

    /// Inclusive upper RSSI bound (default 0).
    #[param(example = 0)]
    pub max_rssi: Option<i16>,

    /// `all`, `connectable` or `non-connectable`.
    pub connectable: Option<ConnectableFilter>,
}

impl From<DeviceQuery> for DeviceFilter {
    fn from(query: DeviceQuery) -> Self {
        Self {
            name: query.name.unwrap_or_default(),
            address: query.address.unwrap_or_default(),
            min_rssi: query.min_rssi.unwrap_or(DEFAULT_MIN_RSSI),
            max_rssi: query.max_rssi.unwrap_or(DEFAULT_MAX_RSSI),
            connectable: query.connectable.unwrap_or_default(),
        }
    }
}

/// Filtered and ranked device list.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "devices": [{
        "identifier": "0C:1D:2E:3F:4A:5B",
        "name": "JL Buds Pro",
        "address": "0C:1D:2E:3F:4A:5B",
        "rssi": -52,
        "connectable": true,
        "paired": false,
        "manufacturer_data": {"5583": "0201040325AABBCCDDEEFF"},
        "services": ["180F"]
    }],
    "total": 4,
    "generation": 17,
    "scan_status": "scanning"
}))]
pub struct DeviceListResponse {
    /// Devices passing the filter, strongest signal first.
    pub devices: Vec<CanonicalDevice>,

    /// Devices in the catalog before filtering.
    #[schema(example = 4)]
    pub total: usize,

    /// Snapshot generation the list was taken from.
    #[schema(example = 17)]
    pub generation: u64,

    /// Scan lifecycle state.
    pub scan_status: ScanStatus,
}

/// One device with catalog metadata.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DeviceDetailResponse {
    /// The merged device record.
    pub device: CanonicalDevice,

    /// Position in first-seen order, starting at zero.
    #[schema(example = 0)]
    pub first_seen_index: Option<u64>,

    /// Category guessed from advertised services.
    pub category: DeviceCategory,
}

/// Where the decoded frame came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AdvertisementSource {
    /// The radio reported the raw frame.
    Raw,
    /// Rebuilt from the first manufacturer-data entry.
    Synthesized,
    /// Nothing to decode.
    None,
}

/// Decoded advertisement of a catalog device.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AdvertisementResponse {
    /// Device identity.
    #[schema(example = "0C:1D:2E:3F:4A:5B")]
    pub identity: String,

    /// Origin of the frame.
    pub source: AdvertisementSource,

    /// Field-by-field decode.
    pub parsed: ParsedAdvertisement,

    /// Offset-prefixed hex dump of the frame.
    #[schema(example = "0000: 1E FF 83 55 02 01 04 03 25 0C 1D 2E 3F 4A 5B 01")]
    pub hex_dump: String,
}

// ============================================================================
// Helpers
// ============================================================================

fn find_device(state: &SharedState, identity: &str) -> ApiResult<CanonicalDevice> {
    state
        .monitor
        .snapshot()
        .device(identity)
        .cloned()
        .ok_or_else(|| ApiError::device_not_found(identity))
}

/// Pick the frame to decode: the raw one, else one rebuilt from manufacturer data.
fn advertisement_frame(device: &CanonicalDevice) -> (AdvertisementSource, String) {
    if let Some(raw) = device.raw_adv_data.as_deref().filter(|r| !r.is_empty()) {
        return (AdvertisementSource::Raw, raw.to_string());
    }
    synthesize_raw_advertisement(&device.manufacturer_data).map_or_else(
        || (AdvertisementSource::None, String::new()),
        |frame| (AdvertisementSource::Synthesized, frame),
    )
}

// ============================================================================
// Handlers
// ============================================================================

/// List catalog devices.
#[utoipa::path(
    get,
    path = "/api/devices",
    tag = "devices",
    operation_id = "listDevices",
    summary = "List discovered devices",
    description = "Returns the devices that pass the filter, ordered by signal strength \
        (strongest first, unknown RSSI last), then by name, then by identifier. A device \
        with unknown RSSI always passes the RSSI bounds.",
    params(DeviceQuery),
    responses(
        (status = 200, description = "Device list", body = DeviceListResponse)
    )
)]
pub async fn list_devices(
    State(state): State<SharedState>,
    Query(query): Query<DeviceQuery>,
) -> Json<DeviceListResponse> {
    let snapshot = state.monitor.snapshot();
    let filter = DeviceFilter::from(query);

    Json(DeviceListResponse {
        devices: view::view(&snapshot.devices, &filter),
        total: snapshot.devices.len(),
        generation: snapshot.generation,
        scan_status: snapshot.scan_status,
    })
}

/// Clear the catalog.
#[utoipa::path(
    delete,
    path = "/api/devices",
    tag = "devices",
    operation_id = "clearDevices",
    summary = "Clear the device catalog",
    description = "Drops every known device and any discoveries not yet merged. Scanning \
        continues; devices reappear as they are seen again.",
    responses(
        (status = 204, description = "Catalog cleared"),
        (status = 503, description = "Device monitor not running", body = super::error::ErrorResponse)
    )
)]
pub async fn clear_devices(State(state): State<SharedState>) -> ApiResult<StatusCode> {
    state.monitor.clear().await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Get one device.
#[utoipa::path(
    get,
    path = "/api/devices/{id}",
    tag = "devices",
    operation_id = "getDevice",
    summary = "Get a device",
    params(("id" = String, Path, description = "Device identity", example = "0C:1D:2E:3F:4A:5B")),
    responses(
        (status = 200, description = "Device found", body = DeviceDetailResponse),
        (status = 404, description = "Device not in the catalog", body = super::error::ErrorResponse)
    )
)]
pub async fn get_device(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<DeviceDetailResponse>> {
    let device = find_device(&state, &id)?;
    let first_seen_index = state.monitor.first_seen_index(&id).await?;
    let category = device_category_from_services(&state.names, &device.services);

    Ok(Json(DeviceDetailResponse {
        device,
        first_seen_index,
        category,
    }))
}

/// Decode a device's advertisement.
#[utoipa::path(
    get,
    path = "/api/devices/{id}/advertisement",
    tag = "devices",
    operation_id = "getDeviceAdvertisement",
    summary = "Decode a device's advertisement",
    description = "Decodes the raw advertisement frame. When the radio did not report one, \
        a frame is rebuilt from the first manufacturer-data entry. Decoding never fails; \
        unrecognised frames are listed byte by byte.",
    params(("id" = String, Path, description = "Device identity", example = "0C:1D:2E:3F:4A:5B")),
    responses(
        (status = 200, description = "Decoded frame", body = AdvertisementResponse),
        (status = 404, description = "Device not in the catalog", body = super::error::ErrorResponse)
    )
)]
pub async fn get_advertisement(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<AdvertisementResponse>> {
    let device = find_device(&state, &id)?;
    let (source, frame) = advertisement_frame(&device);
    let parsed = decode_with(&state.names, &frame);

    Ok(Json(AdvertisementResponse {
        identity: device.identifier,
        source,
        hex_dump: format_hex_block(&parsed.raw, HEX_DUMP_WIDTH),
        parsed,
    }))
}

/// Summarise a device's manufacturer data.
#[utoipa::path(
    get,
    path = "/api/devices/{id}/manufacturer-data",
    tag = "devices",
    operation_id = "getDeviceManufacturerData",
    summary = "Summarise manufacturer data",
    description = "One entry per company ID, with the resolved company name and a \
        vendor-specific interpretation for Apple, Google and Microsoft payloads.",
    params(("id" = String, Path, description = "Device identity", example = "D4:8A:21:00:11:22")),
    responses(
        (status = 200, description = "Manufacturer data", body = Vec<ManufacturerDataSummary>),
        (status = 404, description = "Device not in the catalog", body = super::error::ErrorResponse)
    )
)]
pub async fn get_manufacturer_data(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<ManufacturerDataSummary>>> {
    let device = find_device(&state, &id)?;
    let summaries = device
        .manufacturer_data
        .iter()
        .map(|(company, data)| format_manufacturer_data(&state.names, company, data))
        .collect();
    Ok(Json(summaries))
}

/// Connect to a device.
#[utoipa::path(
    post,
    path = "/api/devices/{id}/connect",
    tag = "devices",
    operation_id = "connectDevice",
    summary = "Connect to a device",
    description = "Issues a connect command and verifies the result. If verification is \
        inconclusive the device is assumed connected and `verified` is false. Only one \
        command per device may run at a time.",
    params(("id" = String, Path, description = "Device identity", example = "0C:1D:2E:3F:4A:5B")),
    responses(
        (status = 200, description = "Command settled", body = ConnectionOutcome),
        (status = 404, description = "Device unknown to the radio", body = super::error::ErrorResponse),
        (status = 409, description = "A command for this device is already running", body = super::error::ErrorResponse),
        (status = 502, description = "The radio failed the command", body = super::error::ErrorResponse)
    )
)]
pub async fn connect_device(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ConnectionOutcome>> {
    state
        .controller
        .connect(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::command_in_flight(&id))
}

/// Disconnect from a device.
#[utoipa::path(
    post,
    path = "/api/devices/{id}/disconnect",
    tag = "devices",
    operation_id = "disconnectDevice",
    summary = "Disconnect from a device",
    description = "Issues a disconnect command and verifies the result. If verification \
        is inconclusive the device is assumed disconnected and `verified` is false.",
    params(("id" = String, Path, description = "Device identity", example = "0C:1D:2E:3F:4A:5B")),
    responses(
        (status = 200, description = "Command settled", body = ConnectionOutcome),
        (status = 404, description = "Device unknown to the radio", body = super::error::ErrorResponse),
        (status = 409, description = "A command for this device is already running", body = super::error::ErrorResponse),
        (status = 502, description = "The radio failed the command", body = super::error::ErrorResponse)
    )
)]
pub async fn disconnect_device(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ConnectionOutcome>> {
    state
        .controller
        .disconnect(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::command_in_flight(&id))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn test_query_defaults_match_filter_defaults() {
        assert_eq!(DeviceFilter::from(DeviceQuery::default()), DeviceFilter::default());
    }

    #[test]
    fn test_query_overrides() {
        let filter = DeviceFilter::from(DeviceQuery {
            name: Some("buds".into()),
            min_rssi: Some(-70),
            connectable: Some(ConnectableFilter::NonConnectable),
            ..DeviceQuery::default()
        });
        assert_eq!(filter.name, "buds");
        assert_eq!(filter.min_rssi, -70);
        assert_eq!(filter.max_rssi, DEFAULT_MAX_RSSI);
        assert_eq!(filter.connectable, ConnectableFilter::NonConnectable);
    }

    #[test]
    fn test_advertisement_frame_prefers_raw() {
        let device = CanonicalDevice {
            raw_adv_data: Some("0201060AFF".into()),
            manufacturer_data: BTreeMap::from([("004C".into(), "0215".into())]),
            ..CanonicalDevice::default()
        };
        assert_eq!(
            advertisement_frame(&device),
            (AdvertisementSource::Raw, "0201060AFF".to_string())
        );
    }

    #[test]
    fn test_advertisement_frame_synthesized_from_manufacturer_data() {
        let device = CanonicalDevice {
            manufacturer_data: BTreeMap::from([("004C".into(), "0215".into())]),
            ..CanonicalDevice::default()
        };
        let (source, frame) = advertisement_frame(&device);
        assert_eq!(source, AdvertisementSource::Synthesized);
        assert_eq!(frame, "1EFF4C000215");
    }

    #[test]
    fn test_advertisement_frame_none() {
        let (source, frame) = advertisement_frame(&CanonicalDevice::default());
        assert_eq!(source, AdvertisementSource::None);
        assert!(frame.is_empty());
    }
}
