//! Radio collaborator seam.
//!
//! Everything that touches real hardware sits behind the [`Radio`] trait.
//! Implementations push discovery and connection events into an
//! `mpsc::Sender<RadioEvent>` handed to them at construction; the
//! [`monitor`](crate::monitor) task is the only consumer.
//!
//! Two implementations ship with the crate:
//!
//! - [`MockRadio`]: in-memory devices and optional JSON-lines replay, used in
//!   tests and whenever the `bluetooth` feature is off.
//! - `BluerRadio` (feature `bluetooth`): BlueZ over D-Bus via `bluer`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use utoipa::ToSchema;

use crate::device::{AdapterInfo, RawObservation};
use crate::gatt::normalize_gatt_uuid;

#[cfg(feature = "bluetooth")]
mod bluez;
mod health;
#[cfg(any(feature = "mock-radio", not(feature = "bluetooth"), test))]
mod mock;

#[cfg(feature = "bluetooth")]
pub use bluez::BluerRadio;
pub use health::{ScanHealthPolicy, ScanWatchdog};
#[cfg(any(feature = "mock-radio", not(feature = "bluetooth"), test))]
pub use mock::{demo_devices, MockDevice, MockRadio};

/// Capacity of the radio → monitor event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Errors reported by a radio implementation.
///
/// These are returned to callers unchanged; nothing in this crate retries.
#[derive(Debug, Error)]
pub enum RadioError {
    /// No adapter present.
    #[error("Bluetooth adapter not found")]
    AdapterNotFound,

    /// Adapter present but powered off.
    #[error("Bluetooth adapter is powered off")]
    AdapterPoweredOff,

    /// The identity is unknown to the radio.
    #[error("Device not found: {identity}")]
    DeviceNotFound {
        /// Device identity.
        identity: String,
    },

    /// The device must be connected for this operation.
    #[error("Device not connected: {identity}")]
    NotConnected {
        /// Device identity.
        identity: String,
    },

    /// The service/characteristic pair does not exist on the device.
    #[error("Characteristic {characteristic} not found in service {service}")]
    CharacteristicNotFound {
        /// Service UUID as given.
        service: String,
        /// Characteristic UUID as given.
        characteristic: String,
    },

    /// A timed operation ran out of time.
    #[error("Scan timed out after {duration_secs} seconds")]
    ScanTimeout {
        /// Allowed duration.
        duration_secs: u64,
    },

    /// The identity is not a valid Bluetooth address.
    #[error("Invalid Bluetooth address: {address}")]
    InvalidAddress {
        /// Offending input.
        address: String,
    },

    /// The radio backend could not be initialised.
    #[error("Failed to initialize radio session: {message}")]
    SessionInitFailed {
        /// Backend message.
        message: String,
    },

    /// Discovery could not be started or failed mid-way.
    #[error("Device discovery failed: {message}")]
    DiscoveryFailed {
        /// Backend message.
        message: String,
    },

    /// Connect, read, write or subscribe failed at the GATT layer.
    #[error("{operation} failed: {message}")]
    GattOperationFailed {
        /// Operation name, e.g. `connect`.
        operation: String,
        /// Backend message.
        message: String,
    },

    /// The characteristic does not support the requested operation.
    #[error("Operation not supported: {operation}")]
    Unsupported {
        /// Operation name.
        operation: String,
    },

    /// Anything else.
    #[error("Internal radio error: {message}")]
    Internal {
        /// Backend message.
        message: String,
    },
}

/// How long a scan runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// Stop after the given duration and emit [`RadioEvent::ScanCompleted`].
    Timed(Duration),
    /// Run until [`Radio::stop_scan`].
    Continuous,
}

impl ScanMode {
    /// Map an API duration to a mode; zero means continuous.
    #[must_use]
    pub const fn from_secs(secs: u64) -> Self {
        if secs == 0 {
            Self::Continuous
        } else {
            Self::Timed(Duration::from_secs(secs))
        }
    }
}

/// GATT write flavour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum WriteKind {
    /// Write with response.
    #[default]
    Request,
    /// Write without response.
    Command,
}

/// GATT subscription flavour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionKind {
    /// Unacknowledged notifications.
    #[default]
    Notify,
    /// Acknowledged indications.
    Indicate,
}

/// Characteristic capability flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum CharacteristicProperty {
    /// Readable.
    Read,
    /// Writable with response.
    Write,
    /// Writable without response.
    WriteWithoutResponse,
    /// Supports notifications.
    Notify,
    /// Supports indications.
    Indicate,
}

/// One GATT characteristic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct GattCharacteristic {
    /// Characteristic UUID.
    #[schema(example = "2A19")]
    pub uuid: String,
    /// Capabilities.
    pub properties: Vec<CharacteristicProperty>,
}

impl GattCharacteristic {
    /// Whether the characteristic has `property`.
    #[must_use]
    pub fn supports(&self, property: CharacteristicProperty) -> bool {
        self.properties.contains(&property)
    }
}

/// One GATT service with its characteristics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct GattService {
    /// Service UUID.
    #[schema(example = "180F")]
    pub uuid: String,
    /// Characteristics in discovery order.
    pub characteristics: Vec<GattCharacteristic>,
}

impl GattService {
    /// Find a characteristic by UUID, tolerating short/full forms.
    #[must_use]
    pub fn characteristic(&self, uuid: &str) -> Option<&GattCharacteristic> {
        self.characteristics.iter().find(|c| same_uuid(&c.uuid, uuid))
    }
}

/// Find a characteristic across services, tolerating short/full UUID forms.
#[must_use]
pub fn find_characteristic<'a>(
    services: &'a [GattService],
    service: &str,
    characteristic: &str,
) -> Option<&'a GattCharacteristic> {
    services
        .iter()
        .find(|s| same_uuid(&s.uuid, service))
        .and_then(|s| s.characteristic(characteristic))
}

/// Compare two UUIDs given in short, `0x`-prefixed or full form.
#[must_use]
pub fn same_uuid(a: &str, b: &str) -> bool {
    match (normalize_gatt_uuid(a).1, normalize_gatt_uuid(b).1) {
        (Some(x), Some(y)) => x == y,
        _ => a.eq_ignore_ascii_case(b),
    }
}

/// Key for per-characteristic backend state.
pub type CharacteristicKey = (String, String, String);

/// Build a [`CharacteristicKey`] that is the same for every spelling of the
/// same characteristic: identity upper-cased, UUIDs in full 128-bit form.
#[must_use]
pub fn characteristic_key(identity: &str, service: &str, characteristic: &str) -> CharacteristicKey {
    let full = |uuid: &str| {
        normalize_gatt_uuid(uuid)
            .1
            .unwrap_or_else(|| uuid.trim().to_ascii_uppercase())
    };
    (
        identity.to_ascii_uppercase(),
        full(service),
        full(characteristic),
    )
}

/// Something the radio observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioEvent {
    /// An advertisement was received.
    Discovered(RawObservation),
    /// Scanning began.
    ScanStarted,
    /// A timed scan ran to completion.
    ScanCompleted,
    /// Scanning stopped because of an error.
    ScanError(String),
    /// Informational scan notice, e.g. a stalled scan was restarted.
    ScanInfo(String),
    /// A device connected or disconnected.
    ConnectionChanged {
        /// Device identity.
        identity: String,
        /// New pairing/connection state.
        paired: bool,
    },
    /// A subscribed characteristic produced a value.
    CharacteristicValue {
        /// Device identity.
        identity: String,
        /// Service UUID.
        service: String,
        /// Characteristic UUID.
        characteristic: String,
        /// Value as uppercase hex.
        value_hex: String,
        /// Subscription that produced it.
        kind: SubscriptionKind,
    },
}

/// Sending half of the radio event channel.
pub type RadioEventSender = mpsc::Sender<RadioEvent>;

/// Receiving half of the radio event channel.
pub type RadioEventReceiver = mpsc::Receiver<RadioEvent>;

/// Create a radio event channel with the default capacity.
#[must_use]
pub fn event_channel() -> (RadioEventSender, RadioEventReceiver) {
    mpsc::channel(EVENT_CHANNEL_CAPACITY)
}

/// Scanning and GATT operations on a local Bluetooth adapter.
#[async_trait]
pub trait Radio: Send + Sync {
    /// Short backend name for logs.
    fn backend(&self) -> &'static str;

    /// Local adapters.
    async fn adapters(&self) -> Result<Vec<AdapterInfo>, RadioError>;

    /// Start scanning. Restarts the scan if one is already running.
    async fn start_scan(&self, mode: ScanMode) -> Result<(), RadioError>;

    /// Stop scanning. No-op when idle.
    async fn stop_scan(&self) -> Result<(), RadioError>;

    /// Whether a scan is running.
    async fn is_scanning(&self) -> bool;

    /// Connect to a device.
    async fn connect(&self, identity: &str) -> Result<(), RadioError>;

    /// Disconnect from a device.
    async fn disconnect(&self, identity: &str) -> Result<(), RadioError>;

    /// Ask the radio whether a device is connected.
    async fn is_connected(&self, identity: &str) -> Result<bool, RadioError>;

    /// Negotiated ATT MTU of a connected device.
    async fn mtu(&self, identity: &str) -> Result<u16, RadioError>;

    /// Discover GATT services on a connected device.
    async fn services(&self, identity: &str) -> Result<Vec<GattService>, RadioError>;

    /// Read a characteristic, returning uppercase hex.
    async fn read_characteristic(
        &self,
        identity: &str,
        service: &str,
        characteristic: &str,
    ) -> Result<String, RadioError>;

    /// Write bytes to a characteristic.
    async fn write_characteristic(
        &self,
        identity: &str,
        service: &str,
        characteristic: &str,
        value: &[u8],
        kind: WriteKind,
    ) -> Result<(), RadioError>;

    /// Subscribe to value changes. Values arrive as [`RadioEvent::CharacteristicValue`].
    async fn subscribe(
        &self,
        identity: &str,
        service: &str,
        characteristic: &str,
        kind: SubscriptionKind,
    ) -> Result<(), RadioError>;

    /// Cancel a subscription. No-op when not subscribed.
    async fn unsubscribe(
        &self,
        identity: &str,
        service: &str,
        characteristic: &str,
    ) -> Result<(), RadioError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_mode_from_secs() {
        assert_eq!(ScanMode::from_secs(0), ScanMode::Continuous);
        assert_eq!(
            ScanMode::from_secs(10),
            ScanMode::Timed(Duration::from_secs(10))
        );
    }

    #[test]
    fn test_same_uuid() {
        assert!(same_uuid("2a19", "00002A19-0000-1000-8000-00805F9B34FB"));
        assert!(same_uuid("0x180F", "180f"));
        assert!(!same_uuid("180F", "180D"));
        assert!(same_uuid("custom", "CUSTOM"));
    }

    #[test]
    fn test_find_characteristic() {
        let services = vec![GattService {
            uuid: "180F".into(),
            characteristics: vec![GattCharacteristic {
                uuid: "2A19".into(),
                properties: vec![CharacteristicProperty::Read, CharacteristicProperty::Notify],
            }],
        }];
        let found = find_characteristic(&services, "0000180f-0000-1000-8000-00805f9b34fb", "2a19");
        assert!(found.is_some_and(|c| c.supports(CharacteristicProperty::Notify)));
        assert!(find_characteristic(&services, "180F", "2A00").is_none());
    }

    #[test]
    fn test_characteristic_key_normalizes_spellings() {
        let short = characteristic_key("aa:bb:cc:dd:ee:ff", "180f", "2a19");
        let full = characteristic_key(
            "AA:BB:CC:DD:EE:FF",
            "0000180F-0000-1000-8000-00805F9B34FB",
            "0x2A19",
        );
        assert_eq!(short, full);
        assert_eq!(short.1, "0000180F-0000-1000-8000-00805F9B34FB");
        assert_ne!(short, characteristic_key("AA:BB:CC:DD:EE:FF", "180F", "2A1A"));
    }

    #[test]
    fn test_property_serialization() {
        assert_eq!(
            serde_json::to_string(&CharacteristicProperty::WriteWithoutResponse).unwrap(),
            "\"write-without-response\""
        );
    }
}
