//! Stateless lookups: on-demand advertisement decoding and name resolution.

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use blescope_core::{decode_with, format_hex_block, NameTable, ParsedAdvertisement};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::devices::HEX_DUMP_WIDTH;
use crate::state::SharedState;

/// Creates the decode router.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/decode", get(decode_advertisement))
        .route("/names/{table}/{id}", get(resolve_name))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Frame to decode.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DecodeQuery {
    /// Hex string; whitespace is ignored and case does not matter.
    #[param(example = "1EFF835502010403250C1D2E3F4A5B01E4320A070000001122334455667788")]
    #[serde(default)]
    pub hex: String,
}

/// Decoded frame.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DecodeResponse {
    /// Field-by-field decode.
    pub parsed: ParsedAdvertisement,

    /// Offset-prefixed hex dump of the cleaned input.
    pub hex_dump: String,
}

/// Resolved name.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({"table": "companies", "id": "004C", "name": "Apple, Inc."}))]
pub struct NameResponse {
    /// Table consulted.
    pub table: NameTable,

    /// Identifier as given.
    #[schema(example = "004C")]
    pub id: String,

    /// Resolved name, or a descriptive placeholder.
    #[schema(example = "Apple, Inc.")]
    pub name: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// Decode an advertisement.
#[utoipa::path(
    get,
    path = "/api/decode",
    tag = "decode",
    operation_id = "decodeAdvertisement",
    summary = "Decode an advertisement frame",
    description = "Frames of 31 bytes or more are decoded with the vendor layout; shorter \
        frames are listed byte by byte. Invalid hex pairs are skipped. This never fails.",
    params(DecodeQuery),
    responses(
        (status = 200, description = "Decoded frame", body = DecodeResponse)
    )
)]
pub async fn decode_advertisement(
    State(state): State<SharedState>,
    Query(query): Query<DecodeQuery>,
) -> Json<DecodeResponse> {
    let parsed = decode_with(&state.names, &query.hex);
    Json(DecodeResponse {
        hex_dump: format_hex_block(&parsed.raw, HEX_DUMP_WIDTH),
        parsed,
    })
}

/// Resolve a name.
#[utoipa::path(
    get,
    path = "/api/names/{table}/{id}",
    tag = "decode",
    operation_id = "resolveName",
    summary = "Resolve a company, service or characteristic name",
    description = "Unknown identifiers resolve to a descriptive placeholder such as \
        `Unknown Manufacturer (0x1234)` rather than an error.",
    params(
        ("table" = NameTable, Path, description = "companies, services or characteristics"),
        ("id" = String, Path, description = "Company ID or UUID", example = "004C")
    ),
    responses(
        (status = 200, description = "Resolved name", body = NameResponse),
        (status = 400, description = "Unknown table")
    )
)]
pub async fn resolve_name(
    State(state): State<SharedState>,
    Path((table, id)): Path<(NameTable, String)>,
) -> Json<NameResponse> {
    let name = match table {
        NameTable::Companies => state.names.resolve_company_name(&id),
        NameTable::Services => state.names.resolve_service_name(&id),
        NameTable::Characteristics => state.names.resolve_characteristic_name(&id),
    };
    Json(NameResponse { table, id, name })
}
