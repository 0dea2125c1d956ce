//! Vendor advertisement frame decoding.
//!
//! The target device family broadcasts a fixed 31-byte manufacturer-specific
//! frame:
//!
//! ```text
//! offset len field
//!      0   1 length byte
//!      1   1 AD type (0xFF = manufacturer specific)
//!      2   2 company ID          (little-endian)
//!      4   2 VID                 (little-endian)
//!      6   2 PID                 (little-endian)
//!      8   1 device type (high nibble) / protocol version (low nibble)
//!      9   6 embedded MAC        (wire order)
//!     15   1 connection flag
//!  16-18   3 left / right / case battery (bit 7 = charging, bits 0-6 = percent)
//!     19   1 sequence nonce
//!     23   8 integrity hash      (opaque, not verified)
//!     31+  - extension data
//! ```
//!
//! Shorter input is reported byte by byte. Decoding never fails.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::hex::{bytes_from_hex, clean_hex, hex_from_bytes};
use crate::names::NameRegistry;

/// Minimum byte length for the fixed vendor layout.
pub const VENDOR_FRAME_LEN: usize = 31;

/// AD type for manufacturer-specific data.
pub const AD_TYPE_MANUFACTURER: u8 = 0xFF;

/// Length byte written into synthesised frames.
const SYNTHETIC_LENGTH_BYTE: u8 = 0x1E;

/// Product class carried in the high nibble of byte 8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DeviceTypeCode {
    /// Nibble 0x0.
    Speaker,
    /// Nibble 0x2: true-wireless earbuds.
    Tws,
    /// Nibble 0x4.
    Soundcard,
    /// Nibble 0x5.
    Watch,
    /// Any other nibble; the raw value is kept alongside.
    Unknown,
}

impl DeviceTypeCode {
    /// Classify a device-type nibble.
    #[must_use]
    pub const fn from_nibble(nibble: u8) -> Self {
        match nibble {
            0x0 => Self::Speaker,
            0x2 => Self::Tws,
            0x4 => Self::Soundcard,
            0x5 => Self::Watch,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for DeviceTypeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Speaker => "speaker",
            Self::Tws => "tws",
            Self::Soundcard => "soundcard",
            Self::Watch => "watch",
            Self::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

/// One battery byte: bit 7 charging, bits 0-6 percent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BatteryLevel {
    /// Charge level, 0-127 as transmitted.
    pub percent: u8,
    /// Whether the unit is charging.
    pub charging: bool,
}

impl BatteryLevel {
    /// Split a battery byte into level and charging flag.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Self {
        Self {
            percent: byte & 0x7F,
            charging: byte & 0x80 != 0,
        }
    }
}

impl fmt::Display for BatteryLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.percent)?;
        if self.charging {
            f.write_str(" (charging)")?;
        }
        Ok(())
    }
}

/// Left unit, right unit and charging case batteries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BatteryInfo {
    /// Left earbud.
    pub left: BatteryLevel,
    /// Right earbud.
    pub right: BatteryLevel,
    /// Charging case.
    pub case: BatteryLevel,
}

/// A named slice of the frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AdvField {
    /// Field name.
    pub name: String,
    /// Byte offset within the frame.
    pub offset: usize,
    /// Length in bytes.
    pub length: usize,
    /// Raw bytes as uppercase hex, in wire order.
    pub value: String,
    /// Human-readable reading of the bytes.
    pub interpretation: String,
}

/// Structured reading of a vendor frame. Empty for short input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StructuredSummary {
    /// Product class.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_type_code: Option<DeviceTypeCode>,

    /// Raw device-type nibble.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_type_raw: Option<u8>,

    /// Protocol version, e.g. `v5`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol_version: Option<String>,

    /// Company ID as 4 uppercase hex digits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_id: Option<String>,

    /// Resolved company name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,

    /// Embedded MAC, colon separated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,

    /// Raw connection flag byte (1 = connected).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_flag: Option<u8>,

    /// Battery triple.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery_info: Option<BatteryInfo>,
}

impl StructuredSummary {
    /// Whether nothing was extracted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Whether the connection flag reports a live connection.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection_flag == Some(1)
    }
}

/// Decode result for one raw advertisement string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ParsedAdvertisement {
    /// Cleaned input (whitespace removed, upper-cased).
    pub raw: String,
    /// Number of decoded bytes.
    pub length: usize,
    /// Fields in ascending offset order.
    pub fields: Vec<AdvField>,
    /// Structured reading.
    pub structured: StructuredSummary,
}

/// Decode using the process-wide name registry.
#[must_use]
pub fn decode(raw_hex: &str) -> ParsedAdvertisement {
    decode_with(&NameRegistry::global(), raw_hex)
}

/// Decode using a specific name registry for company resolution.
#[must_use]
pub fn decode_with(registry: &NameRegistry, raw_hex: &str) -> ParsedAdvertisement {
    let raw = clean_hex(raw_hex);
    if raw.is_empty() {
        return ParsedAdvertisement::default();
    }
    let bytes = bytes_from_hex(&raw);

    let mut parsed = ParsedAdvertisement {
        raw,
        length: bytes.len(),
        ..ParsedAdvertisement::default()
    };

    if bytes.len() >= VENDOR_FRAME_LEN {
        decode_vendor_frame(registry, &bytes, &mut parsed);
    } else {
        parsed.fields = bytes
            .iter()
            .enumerate()
            .map(|(i, b)| field(format!("Byte {i}"), i, &[*b], format!("Value: {b}")))
            .collect();
    }
    parsed
}

fn field(name: impl Into<String>, offset: usize, bytes: &[u8], interpretation: String) -> AdvField {
    AdvField {
        name: name.into(),
        offset,
        length: bytes.len(),
        value: hex_from_bytes(bytes),
        interpretation,
    }
}

fn le16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

// Caller guarantees `bytes.len() >= VENDOR_FRAME_LEN`.
fn decode_vendor_frame(registry: &NameRegistry, bytes: &[u8], out: &mut ParsedAdvertisement) {
    let s = &mut out.structured;
    let mut fields = Vec::with_capacity(14);

    fields.push(field("Length", 0, &bytes[0..1], format!("{} bytes", bytes[0])));

    let ad_type = if bytes[1] == AD_TYPE_MANUFACTURER {
        "Manufacturer Specific Data"
    } else {
        "Unknown type"
    };
    fields.push(field("AD Type", 1, &bytes[1..2], ad_type.to_string()));

    let company_id = format!("{:04X}", le16(bytes, 2));
    let company_name = registry.resolve_company_name(&company_id);
    fields.push(field(
        "Company ID",
        2,
        &bytes[2..4],
        format!("0x{company_id} {company_name}"),
    ));
    s.company_id = Some(company_id);
    s.company_name = Some(company_name);

    fields.push(field("VID", 4, &bytes[4..6], format!("0x{:04X}", le16(bytes, 4))));
    fields.push(field("PID", 6, &bytes[6..8], format!("0x{:04X}", le16(bytes, 6))));

    let type_nibble = bytes[8] >> 4;
    let protocol = bytes[8] & 0x0F;
    let code = DeviceTypeCode::from_nibble(type_nibble);
    let type_label = match code {
        DeviceTypeCode::Speaker => "Speaker".to_string(),
        DeviceTypeCode::Tws => "TWS earbuds".to_string(),
        DeviceTypeCode::Soundcard => "Sound card".to_string(),
        DeviceTypeCode::Watch => "Watch".to_string(),
        DeviceTypeCode::Unknown => format!("Unknown type (0x{type_nibble:X})"),
    };
    fields.push(field(
        "Device Type / Protocol",
        8,
        &bytes[8..9],
        format!("{type_label}, protocol v{protocol}"),
    ));
    s.device_type_code = Some(code);
    s.device_type_raw = Some(type_nibble);
    s.protocol_version = Some(format!("v{protocol}"));

    let mac = bytes[9..15]
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(":");
    fields.push(field("MAC Address", 9, &bytes[9..15], mac.clone()));
    s.mac_address = Some(mac);

    let flag = bytes[15];
    let connection = if flag == 1 { "Connected" } else { "Not connected" };
    fields.push(field("Connection Flag", 15, &bytes[15..16], connection.to_string()));
    s.connection_flag = Some(flag);

    let battery = BatteryInfo {
        left: BatteryLevel::from_byte(bytes[16]),
        right: BatteryLevel::from_byte(bytes[17]),
        case: BatteryLevel::from_byte(bytes[18]),
    };
    fields.push(field("Left Battery", 16, &bytes[16..17], battery.left.to_string()));
    fields.push(field("Right Battery", 17, &bytes[17..18], battery.right.to_string()));
    fields.push(field("Case Battery", 18, &bytes[18..19], battery.case.to_string()));
    s.battery_info = Some(battery);

    fields.push(field(
        "Sequence Nonce",
        19,
        &bytes[19..20],
        format!("Sequence: {}", bytes[19]),
    ));

    // Bytes 20-22 are reserved and not reported.
    fields.push(field(
        "Integrity Hash",
        23,
        &bytes[23..31],
        "Integrity hash (not verified)".to_string(),
    ));

    if bytes.len() > VENDOR_FRAME_LEN {
        let rest = &bytes[VENDOR_FRAME_LEN..];
        fields.push(field(
            "Extension Data",
            VENDOR_FRAME_LEN,
            rest,
            format!("{} bytes of extension data", rest.len()),
        ));
    }

    out.fields = fields;
}

/// Build a raw advertisement frame from manufacturer data.
///
/// Radios that report parsed manufacturer data without the original frame
/// use this to give the decoder something to work on. The lowest company ID
/// wins; returns `None` if there is no entry or the ID is not hex.
#[must_use]
pub fn synthesize_raw_advertisement(manufacturer_data: &BTreeMap<String, String>) -> Option<String> {
    let (company_id, payload) = manufacturer_data.iter().next()?;
    let bare = company_id
        .trim()
        .trim_start_matches("0x")
        .trim_start_matches("0X");
    let id = u16::from_str_radix(bare, 16).ok()?;

    let mut frame = vec![SYNTHETIC_LENGTH_BYTE, AD_TYPE_MANUFACTURER];
    frame.extend_from_slice(&id.to_le_bytes());
    frame.extend(bytes_from_hex(payload));
    Some(hex_from_bytes(&frame))
}
