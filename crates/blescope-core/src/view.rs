//! Filtering and ranking of the device catalog for display.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::device::CanonicalDevice;

/// Default lower RSSI bound (dBm).
pub const DEFAULT_MIN_RSSI: i16 = -100;

/// Default upper RSSI bound (dBm).
pub const DEFAULT_MAX_RSSI: i16 = 0;

/// Connectable tri-state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectableFilter {
    /// No constraint.
    #[default]
    All,
    /// Only connectable devices.
    Connectable,
    /// Only non-connectable devices.
    NonConnectable,
}

/// Conjunctive display predicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct DeviceFilter {
    /// Case-insensitive name substring; empty matches everything.
    pub name: String,

    /// Case-insensitive address substring; empty matches everything.
    pub address: String,

    /// Inclusive lower RSSI bound.
    #[schema(example = -100)]
    pub min_rssi: i16,

    /// Inclusive upper RSSI bound.
    #[schema(example = 0)]
    pub max_rssi: i16,

    /// Connectable constraint.
    pub connectable: ConnectableFilter,
}

impl Default for DeviceFilter {
    fn default() -> Self {
        Self {
            name: String::new(),
            address: String::new(),
            min_rssi: DEFAULT_MIN_RSSI,
            max_rssi: DEFAULT_MAX_RSSI,
            connectable: ConnectableFilter::All,
        }
    }
}

impl DeviceFilter {
    /// Whether `device` passes every conjunct.
    ///
    /// Devices with unknown RSSI always pass the range check.
    #[must_use]
    pub fn matches(&self, device: &CanonicalDevice) -> bool {
        if !contains_ignore_case(device.name.as_deref().unwrap_or_default(), &self.name) {
            return false;
        }
        if !contains_ignore_case(&device.address, &self.address) {
            return false;
        }
        if let Some(rssi) = device.rssi {
            if rssi < self.min_rssi || rssi > self.max_rssi {
                return false;
            }
        }
        match self.connectable {
            ConnectableFilter::All => true,
            ConnectableFilter::Connectable => device.connectable,
            ConnectableFilter::NonConnectable => !device.connectable,
        }
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    needle.is_empty() || haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Borrowing subset of `devices` that pass `filter`, in input order.
#[must_use]
pub fn filter<'a>(devices: &'a [CanonicalDevice], filter: &DeviceFilter) -> Vec<&'a CanonicalDevice> {
    devices.iter().filter(|d| filter.matches(d)).collect()
}

/// Display ordering.
///
/// Strongest signal first with unknown RSSI last, then case-insensitive name
/// with named devices ahead of unnamed ones, then identity.
#[must_use]
pub fn compare_devices(a: &CanonicalDevice, b: &CanonicalDevice) -> Ordering {
    let by_rssi = match (a.rssi, b.rssi) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };

    let by_name = || match (a.display_name(), b.display_name()) {
        (Some(x), Some(y)) => x.to_lowercase().cmp(&y.to_lowercase()),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };

    by_rssi
        .then_with(by_name)
        .then_with(|| a.identifier.cmp(&b.identifier))
}

/// Sort devices in place by [`compare_devices`].
pub fn rank(devices: &mut [CanonicalDevice]) {
    devices.sort_by(compare_devices);
}

/// Filter then rank, producing the display list.
#[must_use]
pub fn view(devices: &[CanonicalDevice], predicate: &DeviceFilter) -> Vec<CanonicalDevice> {
    let mut visible: Vec<CanonicalDevice> = filter(devices, predicate).into_iter().cloned().collect();
    rank(&mut visible);
    visible
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::RawObservation;

    fn device(id: &str, name: Option<&str>, rssi: Option<i16>, connectable: bool) -> CanonicalDevice {
        CanonicalDevice {
            name: name.map(ToString::to_string),
            rssi,
            connectable,
            ..CanonicalDevice::from(RawObservation::new(id, format!("AA:BB:CC:00:00:{id}")))
        }
    }

    #[test]
    fn test_default_filter_accepts_everything_in_range() {
        let f = DeviceFilter::default();
        assert!(f.matches(&device("01", None, None, false)));
        assert!(f.matches(&device("02", Some("x"), Some(-100), true)));
        assert!(f.matches(&device("03", Some("x"), Some(0), true)));
        assert!(!f.matches(&device("04", Some("x"), Some(-101), true)));
    }

    #[test]
    fn test_rssi_range_excludes_before_connectable() {
        let f = DeviceFilter {
            min_rssi: -60,
            max_rssi: 0,
            connectable: ConnectableFilter::Connectable,
            ..DeviceFilter::default()
        };
        assert!(!f.matches(&device("01", Some("Buds"), Some(-70), true)));
        assert!(f.matches(&device("02", Some("Buds"), Some(-50), true)));
        assert!(!f.matches(&device("03", Some("Buds"), Some(-50), false)));
        // unknown rssi passes the range check
        assert!(f.matches(&device("04", Some("Buds"), None, true)));
    }

    #[test]
    fn test_name_and_address_substrings() {
        let f = DeviceFilter {
            name: "BUD".into(),
            ..DeviceFilter::default()
        };
        assert!(f.matches(&device("01", Some("JL buds"), Some(-40), true)));
        assert!(!f.matches(&device("02", Some("Watch"), Some(-40), true)));
        assert!(!f.matches(&device("03", None, Some(-40), true)));

        let f = DeviceFilter {
            address: "cc:00".into(),
            ..DeviceFilter::default()
        };
        assert!(f.matches(&device("01", None, Some(-40), true)));
    }

    #[test]
    fn test_non_connectable_filter() {
        let f = DeviceFilter {
            connectable: ConnectableFilter::NonConnectable,
            ..DeviceFilter::default()
        };
        assert!(f.matches(&device("01", None, None, false)));
        assert!(!f.matches(&device("02", None, None, true)));
    }

    #[test]
    fn test_connectable_filter_serde() {
        let f: DeviceFilter =
            serde_json::from_str(r#"{"connectable": "non-connectable", "min_rssi": -70}"#).unwrap();
        assert_eq!(f.connectable, ConnectableFilter::NonConnectable);
        assert_eq!(f.min_rssi, -70);
        assert_eq!(f.max_rssi, DEFAULT_MAX_RSSI);
    }

    #[test]
    fn test_rank_order() {
        let mut devices = vec![
            device("05", None, None, true),
            device("04", Some("zeta"), Some(-80), true),
            device("03", None, Some(-40), true),
            device("02", Some("Beta"), Some(-40), true),
            device("01", Some("alpha"), Some(-40), true),
            device("00", Some(""), Some(-80), true),
        ];
        rank(&mut devices);
        let order: Vec<&str> = devices.iter().map(|d| d.identifier.as_str()).collect();
        assert_eq!(order, vec!["01", "02", "03", "04", "00", "05"]);
    }

    #[test]
    fn test_rank_identity_tiebreak_and_determinism() {
        let mut a = vec![
            device("b", Some("Same"), Some(-50), true),
            device("a", Some("same"), Some(-50), true),
        ];
        let mut b = a.clone();
        b.reverse();
        rank(&mut a);
        rank(&mut b);
        assert_eq!(a, b);
        assert_eq!(a[0].identifier, "a");
    }

    #[test]
    fn test_view_filters_then_ranks() {
        let devices = vec![
            device("01", Some("far"), Some(-80), true),
            device("02", Some("near"), Some(-40), true),
            device("03", Some("off"), Some(-30), false),
        ];
        let f = DeviceFilter {
            connectable: ConnectableFilter::Connectable,
            ..DeviceFilter::default()
        };
        let visible = view(&devices, &f);
        let order: Vec<&str> = visible.iter().map(|d| d.identifier.as_str()).collect();
        assert_eq!(order, vec!["02", "01"]);
    }
}
