//! # blescope-core
//!
//! Core logic for the blescope BLE advertisement inspector.
//!
//! This crate provides:
//! - Decoding of the vendor advertisement frame into named fields
//! - Company, service and characteristic name resolution
//! - Reconciliation of bursty discovery events into a stable device catalog
//! - Deterministic filtering and ranking for display
//!
//! ## Architecture
//!
//! Leaf modules are pure:
//!
//! - [`hex`] - Hex string / byte conversion and dumps
//! - [`advertisement`] - Fixed-layout vendor frame decoder
//! - [`names`], [`gatt`], [`manufacturer`] - Name tables and display helpers
//! - [`reconciler`] - Pending buffer + sticky-fill merge into the catalog
//! - [`view`] - Filter predicate and ranking comparator
//!
//! Around them sit the runtime pieces:
//!
//! - [`radio`] - The radio collaborator trait with mock and BlueZ backends
//! - [`monitor`] - The single task that owns the reconciler
//! - [`controller`] and [`guard`] - Connect/disconnect with an in-flight guard
//! - [`settings`] - Theme/locale broadcast between surfaces
//! - [`config`] and [`error`] - Configuration loading and error types

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(missing_docs)]

pub mod advertisement;
pub mod config;
pub mod controller;
pub mod device;
pub mod error;
pub mod gatt;
pub mod guard;
pub mod hex;
pub mod manufacturer;
pub mod monitor;
pub mod names;
pub mod radio;
pub mod reconciler;
pub mod settings;
pub mod view;

// Re-export primary types for convenience
pub use advertisement::{
    decode, decode_with, synthesize_raw_advertisement, AdvField, BatteryInfo, BatteryLevel,
    DeviceTypeCode, ParsedAdvertisement, StructuredSummary,
};
pub use config::{
    default_config_path, Config, ConfigError, ConfigResult, NamesConfig, RadioConfig, ScanConfig,
    ServerConfig,
};
pub use controller::{ConnectionAction, ConnectionOutcome, DeviceController};
pub use device::{format_mac_address, AdapterInfo, CanonicalDevice, RawObservation, ScanStatus};
pub use error::{BlescopeError, Result};
pub use guard::{InFlightPermit, InFlightSet};
pub use hex::{bytes_from_hex, clean_hex, format_hex_block, hex_from_bytes, parse_payload};
pub use manufacturer::{format_manufacturer_data, ManufacturerDataSummary};
pub use monitor::{CatalogSnapshot, CharacteristicUpdate, MonitorHandle};
pub use names::{
    resolve_characteristic_name, resolve_company_name, resolve_service_name, NameRegistry,
    NameTable,
};
#[cfg(feature = "bluetooth")]
pub use radio::BluerRadio;
#[cfg(any(feature = "mock-radio", not(feature = "bluetooth"), test))]
pub use radio::{MockDevice, MockRadio};
pub use radio::{
    GattCharacteristic, GattService, Radio, RadioError, RadioEvent, ScanMode, SubscriptionKind,
    WriteKind,
};
pub use reconciler::Reconciler;
pub use settings::{Locale, Settings, SettingsBus, SettingsUpdate, ThemeMode};
pub use view::{ConnectableFilter, DeviceFilter};
