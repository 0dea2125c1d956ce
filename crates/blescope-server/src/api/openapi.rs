//! OpenAPI specification for the blescope API.
//!
//! Served at `/api/openapi.json`, browsable at `/swagger-ui`, and written to
//! the workspace root by the `gen-openapi` binary for client generation.

use axum::Json;
use blescope_core::advertisement::{
    AdvField, BatteryInfo, BatteryLevel, DeviceTypeCode, ParsedAdvertisement, StructuredSummary,
};
use blescope_core::gatt::{DeviceCategory, UuidDisplay};
use blescope_core::radio::CharacteristicProperty;
use blescope_core::{
    AdapterInfo, CanonicalDevice, CatalogSnapshot, CharacteristicUpdate, ConnectableFilter,
    ConnectionAction, ConnectionOutcome, Locale, ManufacturerDataSummary, NameTable, ScanStatus,
    Settings, SettingsUpdate, SubscriptionKind, ThemeMode, WriteKind,
};
use utoipa::OpenApi;

use super::decode::{DecodeResponse, NameResponse};
use super::devices::{
    AdvertisementResponse, AdvertisementSource, DeviceDetailResponse, DeviceListResponse,
};
use super::error::ErrorResponse;
use super::gatt::{
    CharacteristicInfo, CharacteristicValueResponse, MtuResponse, ServiceInfo, SubscribeRequest,
    SubscriptionResponse, WriteCharacteristicRequest, WriteCharacteristicResponse,
};
use super::health::HealthResponse;
use super::scan::{ScanStateResponse, StartScanRequest, StartScanResponse};

/// Serve the OpenAPI specification as JSON.
pub async fn get_openapi_spec() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// The OpenAPI specification as pretty-printed JSON.
///
/// # Errors
///
/// Returns an error if the document cannot be serialized.
pub fn get_openapi_json() -> Result<String, serde_json::Error> {
    ApiDoc::openapi().to_pretty_json()
}

/// Main OpenAPI document structure for blescope.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "blescope API",
        version = "0.1.0",
        description = r#"
# blescope API

blescope watches Bluetooth Low Energy advertisements, keeps a stable catalog of the
devices it has seen and decodes their vendor advertisement frames.

## Overview

1. **Catalog**: discoveries are buffered and merged once per flush interval. Devices keep
   their first-seen position; signal strength is always the latest reading, while
   manufacturer data and service lists are kept from earlier sightings when a later one
   omits them.
2. **View**: `/api/devices` filters by name, address, RSSI range and connectability, and
   sorts by signal strength.
3. **Decoding**: 31-byte vendor frames are split into named fields (company, device type,
   MAC, batteries, nonce, integrity hash). Malformed input never fails.
4. **GATT**: connect, discover services, read, write and subscribe. Only one connect or
   disconnect per device runs at a time.
5. **Events**: `/api/events` streams catalog snapshots, settings and characteristic values.
"#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "/", description = "Local blescope server")
    ),
    tags(
        (name = "system", description = "Health checks"),
        (name = "devices", description = "Device catalog, advertisement decoding and connections"),
        (name = "gatt", description = "Services, characteristics and subscriptions on connected devices"),
        (name = "scan", description = "Scan control and adapters"),
        (name = "decode", description = "On-demand decoding and name resolution"),
        (name = "settings", description = "Theme and locale shared by all clients"),
        (name = "events", description = "Server-Sent Events")
    ),
    paths(
        // Health
        super::health::health_check,
        // Devices
        super::devices::list_devices,
        super::devices::clear_devices,
        super::devices::get_device,
        super::devices::get_advertisement,
        super::devices::get_manufacturer_data,
        super::devices::connect_device,
        super::devices::disconnect_device,
        // GATT
        super::gatt::list_services,
        super::gatt::get_mtu,
        super::gatt::read_characteristic,
        super::gatt::write_characteristic,
        super::gatt::subscribe,
        super::gatt::unsubscribe,
        // Scan
        super::scan::get_scan,
        super::scan::start_scan,
        super::scan::stop_scan,
        super::scan::list_adapters,
        // Decode
        super::decode::decode_advertisement,
        super::decode::resolve_name,
        // Settings
        super::settings::get_settings,
        super::settings::update_settings,
        // Events
        super::events::stream_events,
    ),
    components(
        schemas(
            ErrorResponse,
            HealthResponse,
            // Catalog
            CanonicalDevice,
            CatalogSnapshot,
            ScanStatus,
            ConnectableFilter,
            DeviceCategory,
            DeviceListResponse,
            DeviceDetailResponse,
            ConnectionAction,
            ConnectionOutcome,
            // Advertisement
            AdvertisementSource,
            AdvertisementResponse,
            ParsedAdvertisement,
            AdvField,
            StructuredSummary,
            DeviceTypeCode,
            BatteryLevel,
            BatteryInfo,
            ManufacturerDataSummary,
            DecodeResponse,
            NameTable,
            NameResponse,
            // GATT
            UuidDisplay,
            CharacteristicProperty,
            CharacteristicInfo,
            ServiceInfo,
            MtuResponse,
            CharacteristicValueResponse,
            WriteKind,
            WriteCharacteristicRequest,
            WriteCharacteristicResponse,
            SubscriptionKind,
            SubscribeRequest,
            SubscriptionResponse,
            CharacteristicUpdate,
            // Scan
            AdapterInfo,
            ScanStateResponse,
            StartScanRequest,
            StartScanResponse,
            // Settings
            ThemeMode,
            Locale,
            Settings,
            SettingsUpdate,
        )
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_spec_generation() {
        let spec = ApiDoc::openapi();
        assert_eq!(spec.info.title, "blescope API");
        assert!(spec.paths.paths.contains_key("/api/devices"));
        assert!(spec.paths.paths.contains_key("/api/devices/{id}/connect"));
        assert!(spec.paths.paths.contains_key("/api/events"));
    }

    #[test]
    fn test_openapi_json_serialization() {
        let json = get_openapi_json().unwrap();
        assert!(json.contains("\"openapi\":"));
        assert!(json.contains("\"blescope API\""));
        assert!(json.contains("connectDevice"));
    }
}
