//! Bluetooth UUID helpers.
//!
//! SIG-assigned 16-bit UUIDs live inside the Bluetooth base UUID
//! `0000XXXX-0000-1000-8000-00805F9B34FB`; these helpers move between the
//! short and full forms and build display records.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::names::NameRegistry;

/// Suffix shared by every UUID derived from the Bluetooth base UUID.
pub const BASE_UUID_SUFFIX: &str = "-0000-1000-8000-00805F9B34FB";

static BASE_UUID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^0000([0-9A-F]{4})-0000-1000-8000-00805F9B34FB$").expect("valid regex")
});

static FULL_UUID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9A-F]{8}-[0-9A-F]{4}-[0-9A-F]{4}-[0-9A-F]{4}-[0-9A-F]{12}$")
        .expect("valid regex")
});

/// Expand a 4-digit UUID to its 128-bit base-UUID form. Other input is returned upper-cased.
#[must_use]
pub fn expand_short_uuid(uuid: &str) -> String {
    let upper = uuid.to_ascii_uppercase();
    if upper.len() == 4 {
        format!("0000{upper}{BASE_UUID_SUFFIX}")
    } else {
        upper
    }
}

/// Extract the 16-bit form of a base-UUID, if `uuid` is one.
#[must_use]
pub fn short_uuid(uuid: &str) -> Option<String> {
    let upper = uuid.to_ascii_uppercase();
    BASE_UUID
        .captures(&upper)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// First eight characters of a UUID, used in truncated placeholders.
pub(crate) fn uuid_prefix(uuid: &str) -> String {
    uuid.chars().take(8).collect()
}

/// Returns `true` for a well-formed 128-bit UUID string (upper-case hex).
#[must_use]
pub fn is_full_uuid(uuid: &str) -> bool {
    FULL_UUID.is_match(uuid)
}

/// Short and full keys for a GATT UUID, accepting an optional `0x` prefix.
///
/// Returns `(short, full)`; either may be absent for non-standard input.
#[must_use]
pub fn normalize_gatt_uuid(uuid: &str) -> (Option<String>, Option<String>) {
    let upper = uuid.trim().to_ascii_uppercase();
    let bare = upper.strip_prefix("0X").unwrap_or(&upper);
    if bare.len() == 4 && bare.chars().all(|c| c.is_ascii_hexdigit()) {
        return (Some(bare.to_string()), Some(expand_short_uuid(bare)));
    }
    if is_full_uuid(bare) {
        return (short_uuid(bare), Some(bare.to_string()));
    }
    (None, None)
}

/// Display record for a service UUID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UuidDisplay {
    /// Compact form shown in lists.
    #[schema(example = "180F")]
    pub display: String,

    /// Full 128-bit form.
    #[schema(example = "0000180F-0000-1000-8000-00805F9B34FB")]
    pub full: String,

    /// Resolved service name.
    #[schema(example = "Battery Service")]
    pub name: String,

    /// Whether the UUID is SIG-assigned (base-UUID derived).
    pub is_standard: bool,
}

/// Build the display record for a service UUID.
#[must_use]
pub fn format_uuid_for_display(registry: &NameRegistry, uuid: &str) -> UuidDisplay {
    let upper = uuid.to_ascii_uppercase();
    let name = registry.resolve_service_name(uuid);

    match upper.len() {
        4 => UuidDisplay {
            display: upper.clone(),
            full: expand_short_uuid(&upper),
            name,
            is_standard: true,
        },
        36 => {
            let short = short_uuid(&upper);
            UuidDisplay {
                display: short
                    .clone()
                    .unwrap_or_else(|| format!("{}...", uuid_prefix(&upper))),
                full: upper,
                name,
                is_standard: short.is_some(),
            }
        }
        _ => UuidDisplay {
            display: uuid.to_string(),
            full: uuid.to_string(),
            name,
            is_standard: false,
        },
    }
}

/// Coarse device category guessed from advertised services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DeviceCategory {
    /// Heart rate / fitness machine.
    Fitness,
    /// Audio or media control.
    Audio,
    /// Apple continuity services.
    Apple,
    /// Serial/UART development boards.
    Development,
    /// Glucose and other health profiles.
    Health,
    /// Nothing recognisable.
    Generic,
}

/// Classify a device by keyword matches on its resolved service names.
#[must_use]
pub fn device_category_from_services(registry: &NameRegistry, services: &[String]) -> DeviceCategory {
    let names: Vec<String> = services
        .iter()
        .map(|s| registry.resolve_service_name(s).to_lowercase())
        .collect();
    let any = |keywords: &[&str]| {
        names
            .iter()
            .any(|name| keywords.iter().any(|k| name.contains(k)))
    };

    if any(&["heart rate", "fitness"]) {
        DeviceCategory::Fitness
    } else if any(&["audio", "media"]) {
        DeviceCategory::Audio
    } else if any(&["apple", "continuity"]) {
        DeviceCategory::Apple
    } else if any(&["uart", "serial"]) {
        DeviceCategory::Development
    } else if any(&["glucose", "health"]) {
        DeviceCategory::Health
    } else {
        DeviceCategory::Generic
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_and_shorten() {
        assert_eq!(
            expand_short_uuid("180f"),
            "0000180F-0000-1000-8000-00805F9B34FB"
        );
        assert_eq!(
            short_uuid("0000180f-0000-1000-8000-00805f9b34fb").as_deref(),
            Some("180F")
        );
        assert_eq!(short_uuid("6E400001-B5A3-F393-E0A9-E50E24DCCA9E"), None);
    }

    #[test]
    fn test_normalize_gatt_uuid() {
        assert_eq!(
            normalize_gatt_uuid("0x2a19"),
            (
                Some("2A19".to_string()),
                Some("00002A19-0000-1000-8000-00805F9B34FB".to_string())
            )
        );
        let (short, full) = normalize_gatt_uuid("6e400001-b5a3-f393-e0a9-e50e24dcca9e");
        assert_eq!(short, None);
        assert_eq!(full.as_deref(), Some("6E400001-B5A3-F393-E0A9-E50E24DCCA9E"));
        assert_eq!(normalize_gatt_uuid("nope"), (None, None));
    }

    #[test]
    fn test_format_uuid_for_display() {
        let registry = NameRegistry::seeded();
        let short = format_uuid_for_display(&registry, "180f");
        assert_eq!(short.display, "180F");
        assert_eq!(short.name, "Battery Service");
        assert!(short.is_standard);

        let custom = format_uuid_for_display(&registry, "6E400001-B5A3-F393-E0A9-E50E24DCCA9E");
        assert_eq!(custom.display, "6E400001...");
        assert_eq!(custom.name, "Nordic UART Service");
        assert!(!custom.is_standard);
    }

    #[test]
    fn test_device_category() {
        let registry = NameRegistry::seeded();
        let category = |s: &[&str]| {
            let owned: Vec<String> = s.iter().map(ToString::to_string).collect();
            device_category_from_services(&registry, &owned)
        };
        assert_eq!(category(&["180D"]), DeviceCategory::Fitness);
        assert_eq!(category(&["FE26"]), DeviceCategory::Audio);
        assert_eq!(category(&["FE59"]), DeviceCategory::Apple);
        assert_eq!(category(&["FFE0"]), DeviceCategory::Development);
        assert_eq!(category(&["1808"]), DeviceCategory::Health);
        assert_eq!(category(&["1800"]), DeviceCategory::Generic);
        assert_eq!(category(&[]), DeviceCategory::Generic);
    }
}
