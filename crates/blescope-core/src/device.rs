//! Device records exchanged between the radio, the reconciler and consumers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One advertisement sighting as reported by the radio.
///
/// Immutable once received; the reconciler folds these into [`CanonicalDevice`]s.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
#[schema(example = json!({
    "identifier": "hci0/AA:BB:CC:DD:EE:FF",
    "name": "JL Buds",
    "address": "AA:BB:CC:DD:EE:FF",
    "rssi": -55,
    "connectable": true,
    "paired": false,
    "manufacturer_data": {"5583": "0A0B0C"},
    "services": ["180F"]
}))]
pub struct RawObservation {
    /// Stable opaque identity used to correlate sightings of one device.
    pub identifier: String,

    /// Advertised local name.
    pub name: Option<String>,

    /// MAC-formatted address.
    pub address: String,

    /// Signal strength in dBm.
    pub rssi: Option<i16>,

    /// Advertised transmit power in dBm.
    pub tx_power: Option<i16>,

    /// Whether the device accepts connections.
    pub connectable: bool,

    /// Whether the device is paired/connected.
    pub paired: bool,

    /// Company ID (4 hex digits) → payload hex.
    pub manufacturer_data: BTreeMap<String, String>,

    /// Advertised service UUIDs, in radio order.
    pub services: Vec<String>,

    /// Named advertisement fields for inspection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adv_data: Option<BTreeMap<String, String>>,

    /// Raw advertisement frame as hex.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_adv_data: Option<String>,
}

impl RawObservation {
    /// Minimal observation carrying only an identity and address.
    #[must_use]
    pub fn new(identifier: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            address: address.into(),
            ..Self::default()
        }
    }
}

/// Reconciled, display-ready record for one device identity.
///
/// Same shape as [`RawObservation`], but long-lived: see
/// [`Reconciler`](crate::reconciler::Reconciler) for the merge rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CanonicalDevice {
    /// Stable opaque identity.
    pub identifier: String,

    /// Advertised local name.
    pub name: Option<String>,

    /// MAC-formatted address.
    pub address: String,

    /// Latest signal strength in dBm.
    pub rssi: Option<i16>,

    /// Advertised transmit power in dBm.
    pub tx_power: Option<i16>,

    /// Whether the device accepts connections.
    pub connectable: bool,

    /// Whether the device is paired/connected.
    pub paired: bool,

    /// Company ID → payload hex. Filled once, never emptied.
    pub manufacturer_data: BTreeMap<String, String>,

    /// Advertised service UUIDs. Filled once, never emptied.
    pub services: Vec<String>,

    /// Named advertisement fields.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adv_data: Option<BTreeMap<String, String>>,

    /// Raw advertisement frame as hex.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_adv_data: Option<String>,
}

impl CanonicalDevice {
    /// The display name, treating an empty string as no name.
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.name.as_deref().filter(|n| !n.is_empty())
    }
}

impl From<RawObservation> for CanonicalDevice {
    fn from(obs: RawObservation) -> Self {
        Self {
            identifier: obs.identifier,
            name: obs.name,
            address: obs.address,
            rssi: obs.rssi,
            tx_power: obs.tx_power,
            connectable: obs.connectable,
            paired: obs.paired,
            manufacturer_data: obs.manufacturer_data,
            services: obs.services,
            adv_data: obs.adv_data,
            raw_adv_data: obs.raw_adv_data,
        }
    }
}

/// A local Bluetooth adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AdapterInfo {
    /// Adapter name, e.g. `hci0`.
    #[schema(example = "hci0")]
    pub identifier: String,

    /// Adapter MAC address.
    #[schema(example = "00:1A:7D:DA:71:13")]
    pub address: String,

    /// Whether the adapter is powered on.
    pub powered: bool,
}

/// Scan lifecycle as seen by consumers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    /// No scan running.
    #[default]
    Idle,
    /// A scan is in progress.
    Scanning,
    /// The last timed scan ran to completion.
    Completed,
}

/// Format any MAC-like string as `XX:XX:XX:XX:XX:XX`.
///
/// Non-hex characters are stripped first. Input that does not contain
/// exactly 12 hex digits is returned upper-cased but otherwise untouched.
#[must_use]
pub fn format_mac_address(address: &str) -> String {
    let hex: Vec<char> = address
        .chars()
        .filter(char::is_ascii_hexdigit)
        .map(|c| c.to_ascii_uppercase())
        .collect();
    if hex.len() != 12 {
        return address.to_uppercase();
    }
    hex.chunks(2)
        .map(|pair| pair.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join(":")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_mac_address() {
        assert_eq!(format_mac_address("aabbccddeeff"), "AA:BB:CC:DD:EE:FF");
        assert_eq!(format_mac_address("aa-bb-cc-dd-ee-ff"), "AA:BB:CC:DD:EE:FF");
        assert_eq!(format_mac_address("abc"), "ABC");
        assert_eq!(format_mac_address(""), "");
    }

    #[test]
    fn test_observation_deserializes_with_missing_fields() {
        let obs: RawObservation =
            serde_json::from_str(r#"{"identifier": "A", "address": "AA:BB:CC:DD:EE:FF", "rssi": -40}"#)
                .unwrap();
        assert_eq!(obs.rssi, Some(-40));
        assert!(obs.manufacturer_data.is_empty());
        assert!(obs.services.is_empty());
        assert!(!obs.connectable);
    }

    #[test]
    fn test_display_name_ignores_empty() {
        let mut device = CanonicalDevice::from(RawObservation::new("A", "00:00:00:00:00:01"));
        assert_eq!(device.display_name(), None);
        device.name = Some(String::new());
        assert_eq!(device.display_name(), None);
        device.name = Some("Buds".into());
        assert_eq!(device.display_name(), Some("Buds"));
    }

    #[test]
    fn test_scan_status_serialization() {
        assert_eq!(
            serde_json::to_string(&ScanStatus::Scanning).unwrap(),
            "\"scanning\""
        );
    }
}
