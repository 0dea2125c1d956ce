//! Manufacturer-specific advertisement data formatting.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::hex::clean_hex;
use crate::names::{normalize_company_id, NameRegistry};

/// Display summary for one manufacturer-data entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "company_id": "0x004C",
    "company_name": "Apple, Inc.",
    "data_hex": "0215AABB",
    "data_length": 4,
    "interpretation": "iBeacon Advertisement"
}))]
pub struct ManufacturerDataSummary {
    /// Company ID as `0x` + 4 hex digits.
    pub company_id: String,

    /// Resolved company name.
    pub company_name: String,

    /// Payload as uppercase hex.
    pub data_hex: String,

    /// Payload length in bytes.
    pub data_length: usize,

    /// Vendor-specific reading of the payload, when the vendor is known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interpretation: Option<String>,
}

/// Summarise a manufacturer-data entry, applying vendor interpreters where known.
#[must_use]
pub fn format_manufacturer_data(
    registry: &NameRegistry,
    company_id: &str,
    data_hex: &str,
) -> ManufacturerDataSummary {
    let (full, _) = normalize_company_id(company_id);
    let data = clean_hex(data_hex);

    let interpretation = match full.as_str() {
        "004C" => Some(interpret("Apple", &data, apple_subtype)),
        "00E0" => Some(interpret("Google", &data, google_subtype)),
        "0006" => Some(interpret("Microsoft", &data, microsoft_subtype)),
        _ => None,
    };

    ManufacturerDataSummary {
        company_id: format!("0x{full}"),
        company_name: registry.resolve_company_name(&full),
        data_length: data.len().div_ceil(2),
        data_hex: data,
        interpretation,
    }
}

/// Whether `data` is an even-length string of hex digits.
#[must_use]
pub fn is_valid_manufacturer_data(data: &str) -> bool {
    data.len() % 2 == 0 && data.chars().all(|c| c.is_ascii_hexdigit())
}

fn interpret(vendor: &str, data: &str, table: fn(&str) -> Option<&'static str>) -> String {
    let subtype = match data.get(..2) {
        Some(subtype) if data.len() >= 4 => subtype,
        _ => return format!("Invalid {vendor} data"),
    };
    table(subtype).map_or_else(|| format!("{vendor} Type 0x{subtype}"), ToString::to_string)
}

fn apple_subtype(subtype: &str) -> Option<&'static str> {
    match subtype {
        "02" => Some("iBeacon Advertisement"),
        "05" => Some("AirDrop Advertisement"),
        "07" => Some("AirPods Advertisement"),
        "09" => Some("AirPlay Advertisement"),
        "10" => Some("Nearby Info Advertisement"),
        "0C" => Some("Handoff Advertisement"),
        _ => None,
    }
}

fn google_subtype(subtype: &str) -> Option<&'static str> {
    match subtype {
        "00" => Some("Eddystone Beacon"),
        "01" => Some("UriBeacon"),
        "02" => Some("Eddystone-URL"),
        "03" => Some("Eddystone-UID"),
        "04" => Some("Eddystone-TLM"),
        "05" => Some("Eddystone-EID"),
        _ => None,
    }
}

fn microsoft_subtype(subtype: &str) -> Option<&'static str> {
    match subtype {
        "01" => Some("Microsoft Beacon"),
        "03" => Some("Microsoft Advertisement"),
        _ => None,
    }
}
