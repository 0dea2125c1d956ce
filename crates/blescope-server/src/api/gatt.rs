//! GATT API endpoints: service discovery, characteristic read/write and
//! notification subscriptions on a connected device.
//!
//! Subscribed values are not returned here; they are pushed on the
//! `/api/events` stream as `characteristic` events.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use blescope_core::gatt::{format_uuid_for_display, UuidDisplay};
use blescope_core::radio::CharacteristicProperty;
use blescope_core::{format_hex_block, parse_payload, GattService, SubscriptionKind, WriteKind};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::devices::HEX_DUMP_WIDTH;
use crate::api::error::{ApiError, ApiResult};
use crate::state::SharedState;

/// Creates the GATT router, nested under `/api/devices`.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/{id}/services", get(list_services))
        .route("/{id}/mtu", get(get_mtu))
        .route(
            "/{id}/characteristics/{service}/{characteristic}",
            get(read_characteristic).put(write_characteristic),
        )
        .route(
            "/{id}/characteristics/{service}/{characteristic}/subscription",
            post(subscribe).delete(unsubscribe),
        )
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// A characteristic with its resolved name.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CharacteristicInfo {
    /// UUID as reported by the device.
    #[schema(example = "2A19")]
    pub uuid: String,

    /// Short/full forms and the resolved name.
    pub display: UuidDisplay,

    /// Supported operations.
    pub properties: Vec<CharacteristicProperty>,
}

/// A service with its resolved name and characteristics.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// UUID as reported by the device.
    #[schema(example = "180F")]
    pub uuid: String,

    /// Short/full forms and the resolved name.
    pub display: UuidDisplay,

    /// Characteristics in discovery order.
    pub characteristics: Vec<CharacteristicInfo>,
}

/// Negotiated ATT MTU.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({"identity": "0C:1D:2E:3F:4A:5B", "mtu": 247}))]
pub struct MtuResponse {
    /// Device identity.
    pub identity: String,
    /// MTU in bytes.
    pub mtu: u16,
}

/// Characteristic value.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "identity": "0C:1D:2E:3F:4A:5B",
    "service": "180F",
    "characteristic": "2A19",
    "value_hex": "5A",
    "hex_dump": "0000: 5A",
    "text": "Z"
}))]
pub struct CharacteristicValueResponse {
    /// Device identity.
    pub identity: String,
    /// Service UUID.
    pub service: String,
    /// Characteristic UUID.
    pub characteristic: String,
    /// Value as uppercase hex.
    pub value_hex: String,
    /// Offset-prefixed hex dump.
    pub hex_dump: String,
    /// The value as text, when it is printable UTF-8.
    pub text: Option<String>,
}

/// Characteristic write.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[schema(example = json!({"value": "0x0102FF", "kind": "request"}))]
pub struct WriteCharacteristicRequest {
    /// Hex (`0x`-prefixed or bare) or plain text sent as UTF-8.
    #[schema(example = "0x0102FF")]
    pub value: String,

    /// Write with or without response.
    #[serde(default)]
    pub kind: WriteKind,
}

/// Result of a characteristic write.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({"bytes_written": 3, "value_hex": "0102FF"}))]
pub struct WriteCharacteristicResponse {
    /// Payload length in bytes.
    pub bytes_written: usize,
    /// Payload as uppercase hex.
    pub value_hex: String,
}

/// Subscription request.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct SubscribeRequest {
    /// Notify (default) or indicate.
    #[serde(default)]
    pub kind: SubscriptionKind,
}

/// Active subscription.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SubscriptionResponse {
    /// Device identity.
    pub identity: String,
    /// Service UUID.
    pub service: String,
    /// Characteristic UUID.
    pub characteristic: String,
    /// Subscription kind.
    pub kind: SubscriptionKind,
}

fn printable_text(bytes: &[u8]) -> Option<String> {
    let text = std::str::from_utf8(bytes).ok()?;
    (!text.is_empty() && text.chars().all(|c| !c.is_control() || c.is_whitespace()))
        .then(|| text.to_string())
}

fn describe(state: &SharedState, services: Vec<GattService>) -> Vec<ServiceInfo> {
    services
        .into_iter()
        .map(|service| ServiceInfo {
            display: format_uuid_for_display(&state.names, &service.uuid),
            characteristics: service
                .characteristics
                .into_iter()
                .map(|c| {
                    let mut display = format_uuid_for_display(&state.names, &c.uuid);
                    display.name = state.names.resolve_characteristic_name(&c.uuid);
                    CharacteristicInfo {
                        uuid: c.uuid,
                        display,
                        properties: c.properties,
                    }
                })
                .collect(),
            uuid: service.uuid,
        })
        .collect()
}

// ============================================================================
// Handlers
// ============================================================================

/// Discover services on a connected device.
#[utoipa::path(
    get,
    path = "/api/devices/{id}/services",
    tag = "gatt",
    operation_id = "listServices",
    summary = "Discover GATT services",
    params(("id" = String, Path, description = "Device identity")),
    responses(
        (status = 200, description = "Services and characteristics", body = Vec<ServiceInfo>),
        (status = 404, description = "Device unknown to the radio", body = super::error::ErrorResponse),
        (status = 409, description = "Device not connected", body = super::error::ErrorResponse)
    )
)]
pub async fn list_services(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<ServiceInfo>>> {
    let services = state.radio.services(&id).await?;
    Ok(Json(describe(&state, services)))
}

/// Read the negotiated MTU of a connected device.
#[utoipa::path(
    get,
    path = "/api/devices/{id}/mtu",
    tag = "gatt",
    operation_id = "getMtu",
    summary = "Get negotiated MTU",
    params(("id" = String, Path, description = "Device identity")),
    responses(
        (status = 200, description = "Negotiated MTU", body = MtuResponse),
        (status = 400, description = "Backend cannot report the MTU", body = super::error::ErrorResponse),
        (status = 404, description = "Device unknown to the radio", body = super::error::ErrorResponse),
        (status = 409, description = "Device not connected", body = super::error::ErrorResponse)
    )
)]
pub async fn get_mtu(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<MtuResponse>> {
    let mtu = state.radio.mtu(&id).await?;
    Ok(Json(MtuResponse { identity: id, mtu }))
}

/// Read a characteristic.
#[utoipa::path(
    get,
    path = "/api/devices/{id}/characteristics/{service}/{characteristic}",
    tag = "gatt",
    operation_id = "readCharacteristic",
    summary = "Read a characteristic",
    params(
        ("id" = String, Path, description = "Device identity"),
        ("service" = String, Path, description = "Service UUID, short or full", example = "180F"),
        ("characteristic" = String, Path, description = "Characteristic UUID, short or full", example = "2A19")
    ),
    responses(
        (status = 200, description = "Current value", body = CharacteristicValueResponse),
        (status = 400, description = "Characteristic is not readable", body = super::error::ErrorResponse),
        (status = 404, description = "Unknown device or characteristic", body = super::error::ErrorResponse),
        (status = 409, description = "Device not connected", body = super::error::ErrorResponse)
    )
)]
pub async fn read_characteristic(
    State(state): State<SharedState>,
    Path((id, service, characteristic)): Path<(String, String, String)>,
) -> ApiResult<Json<CharacteristicValueResponse>> {
    let value_hex = state
        .radio
        .read_characteristic(&id, &service, &characteristic)
        .await?;
    let text = printable_text(&blescope_core::bytes_from_hex(&value_hex));

    Ok(Json(CharacteristicValueResponse {
        identity: id,
        service,
        characteristic,
        hex_dump: format_hex_block(&value_hex, HEX_DUMP_WIDTH),
        value_hex,
        text,
    }))
}

/// Write a characteristic.
#[utoipa::path(
    put,
    path = "/api/devices/{id}/characteristics/{service}/{characteristic}",
    tag = "gatt",
    operation_id = "writeCharacteristic",
    summary = "Write a characteristic",
    description = "The value is decoded as hex when it is `0x`-prefixed or entirely hex \
        digits, otherwise it is sent as UTF-8 text.",
    params(
        ("id" = String, Path, description = "Device identity"),
        ("service" = String, Path, description = "Service UUID, short or full"),
        ("characteristic" = String, Path, description = "Characteristic UUID, short or full")
    ),
    request_body = WriteCharacteristicRequest,
    responses(
        (status = 200, description = "Value written", body = WriteCharacteristicResponse),
        (status = 400, description = "Empty payload or characteristic not writable", body = super::error::ErrorResponse),
        (status = 404, description = "Unknown device or characteristic", body = super::error::ErrorResponse),
        (status = 409, description = "Device not connected", body = super::error::ErrorResponse)
    )
)]
pub async fn write_characteristic(
    State(state): State<SharedState>,
    Path((id, service, characteristic)): Path<(String, String, String)>,
    Json(request): Json<WriteCharacteristicRequest>,
) -> ApiResult<Json<WriteCharacteristicResponse>> {
    let payload = parse_payload(&request.value);
    if payload.is_empty() {
        return Err(ApiError::BadRequest {
            error_code: "EMPTY_PAYLOAD".to_string(),
            message: "Write value must contain at least one byte".to_string(),
        });
    }

    state
        .radio
        .write_characteristic(&id, &service, &characteristic, &payload, request.kind)
        .await?;

    Ok(Json(WriteCharacteristicResponse {
        bytes_written: payload.len(),
        value_hex: blescope_core::hex_from_bytes(&payload),
    }))
}

/// Subscribe to a characteristic.
#[utoipa::path(
    post,
    path = "/api/devices/{id}/characteristics/{service}/{characteristic}/subscription",
    tag = "gatt",
    operation_id = "subscribeCharacteristic",
    summary = "Subscribe to value changes",
    description = "Values are delivered on `/api/events` as `characteristic` events.",
    params(
        ("id" = String, Path, description = "Device identity"),
        ("service" = String, Path, description = "Service UUID, short or full"),
        ("characteristic" = String, Path, description = "Characteristic UUID, short or full")
    ),
    request_body(content = SubscribeRequest, description = "Optional; an empty body means notify"),
    responses(
        (status = 200, description = "Subscribed", body = SubscriptionResponse),
        (status = 400, description = "Characteristic does not support the kind", body = super::error::ErrorResponse),
        (status = 404, description = "Unknown device or characteristic", body = super::error::ErrorResponse),
        (status = 409, description = "Device not connected", body = super::error::ErrorResponse)
    )
)]
pub async fn subscribe(
    State(state): State<SharedState>,
    Path((id, service, characteristic)): Path<(String, String, String)>,
    body: Bytes,
) -> ApiResult<Json<SubscriptionResponse>> {
    let kind = if body.is_empty() {
        SubscriptionKind::default()
    } else {
        serde_json::from_slice::<SubscribeRequest>(&body)
            .map_err(|e| ApiError::BadRequest {
                error_code: "INVALID_BODY".to_string(),
                message: e.to_string(),
            })?
            .kind
    };
    state
        .radio
        .subscribe(&id, &service, &characteristic, kind)
        .await?;

    Ok(Json(SubscriptionResponse {
        identity: id,
        service,
        characteristic,
        kind,
    }))
}

/// Cancel a subscription.
#[utoipa::path(
    delete,
    path = "/api/devices/{id}/characteristics/{service}/{characteristic}/subscription",
    tag = "gatt",
    operation_id = "unsubscribeCharacteristic",
    summary = "Cancel a subscription",
    params(
        ("id" = String, Path, description = "Device identity"),
        ("service" = String, Path, description = "Service UUID, short or full"),
        ("characteristic" = String, Path, description = "Characteristic UUID, short or full")
    ),
    responses(
        (status = 204, description = "Unsubscribed, or was not subscribed"),
        (status = 404, description = "Unknown device", body = super::error::ErrorResponse)
    )
)]
pub async fn unsubscribe(
    State(state): State<SharedState>,
    Path((id, service, characteristic)): Path<(String, String, String)>,
) -> ApiResult<StatusCode> {
    state
        .radio
        .unsubscribe(&id, &service, &characteristic)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_printable_text() {
        assert_eq!(printable_text(b"JL Buds"), Some("JL Buds".to_string()));
        assert_eq!(printable_text(&[0x5A]), Some("Z".to_string()));
        assert_eq!(printable_text(&[0x01, 0x02]), None);
        assert_eq!(printable_text(&[0xFF, 0xFE]), None);
        assert_eq!(printable_text(&[]), None);
    }

    #[test]
    fn test_write_request_defaults_to_request_kind() {
        let request: WriteCharacteristicRequest =
            serde_json::from_str(r#"{"value": "hello"}"#).unwrap();
        assert_eq!(request.kind, WriteKind::Request);
    }
}
