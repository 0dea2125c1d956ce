//! Human-readable names for company IDs, services and characteristics.
//!
//! Every table starts from a compiled-in seed and can be augmented at
//! startup from external sources (local files or HTTP URLs) in either JSON
//! or the plain-text format distributed with the Bluetooth SIG assigned
//! numbers. Loading happens in a background task; lookups never wait for it
//! and keep answering from whatever is in the table at the time.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use crate::gatt::{normalize_gatt_uuid, short_uuid, uuid_prefix};

static TXT_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:0[xX])?([0-9A-Fa-f]{4})\s+(.+?)\s*$").expect("valid regex")
});

static REGISTRY: Lazy<Arc<NameRegistry>> = Lazy::new(|| Arc::new(NameRegistry::seeded()));

const COMPANY_SEED: &[(&str, &str)] = &[
    ("004C", "Apple, Inc."),
    ("038F", "Xiaomi Inc."),
    ("00E0", "Google"),
    ("0006", "Microsoft"),
    ("0059", "Nordic Semiconductor ASA"),
    ("000F", "Broadcom Corporation"),
    ("001D", "Qualcomm"),
    ("0002", "Intel Corp."),
    ("000D", "Texas Instruments Inc."),
    ("0075", "Samsung Electronics Co. Ltd."),
    ("5583", "JL (Zhuhai Jieli)"),
];

const SERVICE_SEED: &[(&str, &str)] = &[
    ("1800", "Generic Access"),
    ("1801", "Generic Attribute"),
    ("1802", "Immediate Alert"),
    ("1803", "Link Loss"),
    ("1804", "Tx Power"),
    ("1805", "Current Time"),
    ("1806", "Reference Time Update"),
    ("1807", "Next DST Change"),
    ("1808", "Glucose"),
    ("1809", "Health Thermometer"),
    ("180A", "Device Information"),
    ("180D", "Heart Rate"),
    ("180E", "Phone Alert Status"),
    ("180F", "Battery Service"),
    ("1810", "Blood Pressure"),
    ("1811", "Alert Notification"),
    ("1812", "Human Interface Device"),
    ("1813", "Scan Parameters"),
    ("1814", "Running Speed and Cadence"),
    ("1815", "Automation IO"),
    ("1816", "Cycling Speed and Cadence"),
    ("1818", "Cycling Power"),
    ("1819", "Location and Navigation"),
    ("181A", "Environmental Sensing"),
    ("181B", "Body Composition"),
    ("181C", "User Data"),
    ("181D", "Weight Scale"),
    ("181E", "Bond Management"),
    ("181F", "Continuous Glucose Monitoring"),
    ("1820", "Internet Protocol Support"),
    ("1821", "Indoor Positioning"),
    ("1822", "Pulse Oximeter"),
    ("1823", "HTTP Proxy"),
    ("1824", "Transport Discovery"),
    ("1825", "Object Transfer"),
    ("1826", "Fitness Machine"),
    ("1827", "Mesh Provisioning"),
    ("1828", "Mesh Proxy"),
    ("1829", "Reconnection Configuration"),
    ("FE59", "Apple Continuity"),
    ("FE2C", "Apple Notification Center Service"),
    ("FE26", "Apple Media Service"),
    ("6E400001-B5A3-F393-E0A9-E50E24DCCA9E", "Nordic UART Service"),
    ("FFF0", "Simple Key Service"),
    ("FFE0", "HM-10 Serial"),
];

const CHARACTERISTIC_SEED: &[(&str, &str)] = &[
    ("2A00", "Device Name"),
    ("2A01", "Appearance"),
    ("2A04", "Peripheral Preferred Connection Parameters"),
    ("2A05", "Service Changed"),
    ("2A19", "Battery Level"),
    ("2A23", "System ID"),
    ("2A24", "Model Number String"),
    ("2A25", "Serial Number String"),
    ("2A26", "Firmware Revision String"),
    ("2A27", "Hardware Revision String"),
    ("2A28", "Software Revision String"),
    ("2A29", "Manufacturer Name String"),
    ("2AA6", "Central Address Resolution"),
];

/// Which lookup table a source feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum NameTable {
    /// Bluetooth SIG company identifiers.
    Companies,
    /// GATT service UUIDs.
    Services,
    /// GATT characteristic UUIDs.
    Characteristics,
}

impl std::fmt::Display for NameTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Companies => "companies",
            Self::Services => "services",
            Self::Characteristics => "characteristics",
        })
    }
}

/// Errors raised while loading an external name source.
///
/// These never reach lookups: a failed source is logged and the seed stays in place.
#[derive(Debug, Error)]
pub enum NameSourceError {
    /// A local file could not be read.
    #[error("Failed to read name source {}: {source}", path.display())]
    Read {
        /// Path that failed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// An HTTP source could not be fetched.
    #[error("Failed to fetch name source {url}: {source}")]
    Fetch {
        /// URL that failed.
        url: String,
        /// Underlying error.
        #[source]
        source: reqwest::Error,
    },

    /// The source was reachable but contained no usable entries.
    #[error("Name source {0} contained no entries")]
    Empty(String),
}

/// Normalise a company ID to its zero-padded 4-digit and unpadded forms.
///
/// Accepts an optional `0x` prefix and any case: `"0x4c"` → `("004C", "4C")`.
#[must_use]
pub fn normalize_company_id(id: &str) -> (String, String) {
    let trimmed = id.trim();
    let bare = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed)
        .to_ascii_uppercase();
    let full = format!("{bare:0>4}");
    let short = full.trim_start_matches('0');
    let short = if short.is_empty() { "0" } else { short }.to_string();
    (full, short)
}

/// Company, service and characteristic lookup tables.
#[derive(Debug, Default)]
pub struct NameRegistry {
    companies: RwLock<HashMap<String, String>>,
    services: RwLock<HashMap<String, String>>,
    characteristics: RwLock<HashMap<String, String>>,
}

impl NameRegistry {
    /// Registry holding only the compiled-in seed tables.
    #[must_use]
    pub fn seeded() -> Self {
        let registry = Self::default();
        for table in [
            NameTable::Companies,
            NameTable::Services,
            NameTable::Characteristics,
        ] {
            let seed = match table {
                NameTable::Companies => COMPANY_SEED,
                NameTable::Services => SERVICE_SEED,
                NameTable::Characteristics => CHARACTERISTIC_SEED,
            };
            registry.merge(
                table,
                seed.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())),
            );
        }
        registry
    }

    /// Process-wide registry shared by the decoder and the HTTP surface.
    #[must_use]
    pub fn global() -> Arc<Self> {
        Arc::clone(&REGISTRY)
    }

    fn table(&self, table: NameTable) -> &RwLock<HashMap<String, String>> {
        match table {
            NameTable::Companies => &self.companies,
            NameTable::Services => &self.services,
            NameTable::Characteristics => &self.characteristics,
        }
    }

    /// Insert entries into a table, normalising keys for that table.
    ///
    /// Returns the number of entries inserted.
    pub fn merge<I>(&self, table: NameTable, entries: I) -> usize
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut map = self
            .table(table)
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let mut count = 0;
        for (id, name) in entries {
            let name = name.trim().to_string();
            if name.is_empty() {
                continue;
            }
            match table {
                NameTable::Companies => {
                    let (full, short) = normalize_company_id(&id);
                    map.insert(full, name.clone());
                    map.insert(short, name);
                }
                NameTable::Services => {
                    let upper = id.trim().to_ascii_uppercase();
                    let key = upper.strip_prefix("0X").unwrap_or(&upper).to_string();
                    map.insert(key, name);
                }
                NameTable::Characteristics => {
                    let key = match normalize_gatt_uuid(&id) {
                        (Some(short), _) => short,
                        (None, Some(full)) => full,
                        (None, None) => id.trim().to_ascii_uppercase(),
                    };
                    map.insert(key, name);
                }
            }
            count += 1;
        }
        count
    }

    fn get(&self, table: NameTable, key: &str) -> Option<String> {
        self.table(table)
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Look up a company name without a placeholder fallback.
    #[must_use]
    pub fn company_name(&self, company_id: &str) -> Option<String> {
        if company_id.trim().is_empty() {
            return None;
        }
        let (full, short) = normalize_company_id(company_id);
        self.get(NameTable::Companies, &full)
            .or_else(|| self.get(NameTable::Companies, &short))
    }

    /// Company name, or `Unknown Manufacturer (0x<id>)`.
    #[must_use]
    pub fn resolve_company_name(&self, company_id: &str) -> String {
        self.company_name(company_id).unwrap_or_else(|| {
            let (full, _) = normalize_company_id(company_id);
            format!("Unknown Manufacturer (0x{full})")
        })
    }

    /// Service name, or a placeholder describing the UUID.
    #[must_use]
    pub fn resolve_service_name(&self, uuid: &str) -> String {
        let upper = uuid.to_ascii_uppercase();
        match upper.len() {
            4 => self
                .get(NameTable::Services, &upper)
                .unwrap_or_else(|| format!("Unknown Service ({upper})")),
            36 => {
                if let Some(name) = self.get(NameTable::Services, &upper) {
                    return name;
                }
                match short_uuid(&upper) {
                    Some(short) => self
                        .get(NameTable::Services, &short)
                        .unwrap_or_else(|| format!("Standard Service ({short})")),
                    None => format!("Custom Service ({}...)", uuid_prefix(&upper)),
                }
            }
            _ => format!("Unknown Format ({uuid})"),
        }
    }

    /// Characteristic name, or a placeholder describing the UUID.
    #[must_use]
    pub fn resolve_characteristic_name(&self, uuid: &str) -> String {
        match normalize_gatt_uuid(uuid) {
            (Some(short), _) => self
                .get(NameTable::Characteristics, &short)
                .unwrap_or_else(|| format!("Characteristic {short}")),
            (None, Some(full)) => self
                .get(NameTable::Characteristics, &full)
                .unwrap_or_else(|| format!("Characteristic {}...", uuid_prefix(&full))),
            (None, None) => format!("Characteristic {uuid}"),
        }
    }

    /// Number of keys in a table (company entries count twice: padded and unpadded).
    #[must_use]
    pub fn len(&self, table: NameTable) -> usize {
        self.table(table)
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether a table has no entries.
    #[must_use]
    pub fn is_empty(&self, table: NameTable) -> bool {
        self.len(table) == 0
    }

    /// Load one external source and merge it into `table`.
    ///
    /// `source` is either a filesystem path or an `http(s)://` URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be read or yields no entries.
    pub async fn load_source(&self, table: NameTable, source: &str) -> Result<usize, NameSourceError> {
        let text = fetch_source(source).await?;
        let entries = parse_name_source(&text);
        if entries.is_empty() {
            return Err(NameSourceError::Empty(source.to_string()));
        }
        let count = self.merge(table, entries);
        debug!(?table, source, count, "Merged name source");
        Ok(count)
    }

    /// Start loading all configured sources in the background.
    ///
    /// The returned handle resolves to the total number of merged entries;
    /// callers are free to drop it.
    pub fn spawn_preload(self: &Arc<Self>, sources: Vec<(NameTable, String)>) -> JoinHandle<usize> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut total = 0;
            for (table, source) in sources {
                match registry.load_source(table, &source).await {
                    Ok(count) => total += count,
                    Err(e) => warn!(?table, error = %e, "Name source unavailable, keeping seed table"),
                }
            }
            info!(entries = total, "Name table preload finished");
            total
        })
    }
}

async fn fetch_source(source: &str) -> Result<String, NameSourceError> {
    if source.starts_with("http://") || source.starts_with("https://") {
        let fetch_err = |e| NameSourceError::Fetch {
            url: source.to_string(),
            source: e,
        };
        let response = reqwest::get(source)
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(fetch_err)?;
        response.text().await.map_err(fetch_err)
    } else {
        let path = PathBuf::from(source);
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| NameSourceError::Read { path, source: e })
    }
}

/// Parse a name source body.
///
/// JSON (`{"004C": "Apple"}` or `[["004C", "Apple"]]`) is tried first, then the
/// text format: one `0x004C<whitespace>Name` or `004C<whitespace>Name` per line,
/// with blank, `#`, `//` and `UUID` header lines skipped.
#[must_use]
pub fn parse_name_source(text: &str) -> Vec<(String, String)> {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(text) {
        return parse_json_entries(&value);
    }

    text.lines()
        .map(str::trim)
        .filter(|line| {
            !line.is_empty()
                && !line.starts_with('#')
                && !line.starts_with("//")
                && !line.starts_with("UUID")
        })
        .filter_map(|line| {
            let caps = TXT_LINE.captures(line)?;
            Some((caps[1].to_ascii_uppercase(), caps[2].trim().to_string()))
        })
        .collect()
}

fn parse_json_entries(value: &serde_json::Value) -> Vec<(String, String)> {
    let as_text = |v: &serde_json::Value| match v {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };

    match value {
        serde_json::Value::Object(map) => map
            .iter()
            .map(|(id, name)| (id.clone(), as_text(name)))
            .collect(),
        serde_json::Value::Array(items) => items
            .iter()
            .filter_map(|item| match item.as_array()?.as_slice() {
                [id, name, ..] => Some((as_text(id), as_text(name))),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Company name from the global registry, or `Unknown Manufacturer (0x<id>)`.
#[must_use]
pub fn resolve_company_name(company_id: &str) -> String {
    REGISTRY.resolve_company_name(company_id)
}

/// Service name from the global registry.
#[must_use]
pub fn resolve_service_name(uuid: &str) -> String {
    REGISTRY.resolve_service_name(uuid)
}

/// Characteristic name from the global registry.
#[must_use]
pub fn resolve_characteristic_name(uuid: &str) -> String {
    REGISTRY.resolve_characteristic_name(uuid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_normalize_company_id() {
        assert_eq!(normalize_company_id("0x4c"), ("004C".into(), "4C".into()));
        assert_eq!(normalize_company_id("004C"), ("004C".into(), "4C".into()));
        assert_eq!(normalize_company_id("0000"), ("0000".into(), "0".into()));
        assert_eq!(normalize_company_id(" 5583 "), ("5583".into(), "5583".into()));
    }

    #[test]
    fn test_resolve_company_name() {
        let registry = NameRegistry::seeded();
        assert_eq!(registry.resolve_company_name("004C"), "Apple, Inc.");
        assert_eq!(registry.resolve_company_name("4c"), "Apple, Inc.");
        assert_eq!(registry.resolve_company_name("0x0006"), "Microsoft");
        assert_eq!(
            registry.resolve_company_name("ABCD"),
            "Unknown Manufacturer (0xABCD)"
        );
        assert_eq!(registry.resolve_company_name("7"), "Unknown Manufacturer (0x0007)");
    }

    #[test]
    fn test_resolve_service_name() {
        let registry = NameRegistry::seeded();
        assert_eq!(registry.resolve_service_name("180f"), "Battery Service");
        assert_eq!(
            registry.resolve_service_name("0000180F-0000-1000-8000-00805F9B34FB"),
            "Battery Service"
        );
        assert_eq!(
            registry.resolve_service_name("0000ABCD-0000-1000-8000-00805F9B34FB"),
            "Standard Service (ABCD)"
        );
        assert_eq!(
            registry.resolve_service_name("12345678-1234-1234-1234-123456789ABC"),
            "Custom Service (12345678...)"
        );
        assert_eq!(registry.resolve_service_name("BEEF"), "Unknown Service (BEEF)");
        assert_eq!(registry.resolve_service_name("xyz"), "Unknown Format (xyz)");
    }

    #[test]
    fn test_resolve_characteristic_name() {
        let registry = NameRegistry::seeded();
        assert_eq!(registry.resolve_characteristic_name("2a19"), "Battery Level");
        assert_eq!(registry.resolve_characteristic_name("0x2A00"), "Device Name");
        assert_eq!(
            registry.resolve_characteristic_name("00002A29-0000-1000-8000-00805F9B34FB"),
            "Manufacturer Name String"
        );
        assert_eq!(registry.resolve_characteristic_name("2B00"), "Characteristic 2B00");
        assert_eq!(
            registry.resolve_characteristic_name("6E400002-B5A3-F393-E0A9-E50E24DCCA9E"),
            "Characteristic 6E400002..."
        );
        assert_eq!(registry.resolve_characteristic_name("??"), "Characteristic ??");
    }

    #[test]
    fn test_parse_json_object_and_array() {
        let object = parse_name_source(r#"{"0x1234": "Acme", "ABCD": "Widgets"}"#);
        assert_eq!(object.len(), 2);

        let array = parse_name_source(r#"[["1234", "Acme"], ["bad"], ["5678", "Other"]]"#);
        assert_eq!(
            array,
            vec![
                ("1234".to_string(), "Acme".to_string()),
                ("5678".to_string(), "Other".to_string())
            ]
        );
    }

    #[test]
    fn test_parse_txt_lines() {
        let text = "# comment\n// another\nUUID\tName\n0x004C\tApple, Inc.\n1234   Acme Corp  \nnot a line\n";
        let entries = parse_name_source(text);
        assert_eq!(
            entries,
            vec![
                ("004C".to_string(), "Apple, Inc.".to_string()),
                ("1234".to_string(), "Acme Corp".to_string())
            ]
        );
    }

    #[test]
    fn test_merge_augments_seed() {
        let registry = NameRegistry::seeded();
        registry.merge(
            NameTable::Companies,
            vec![("1234".to_string(), "Acme".to_string())],
        );
        assert_eq!(registry.resolve_company_name("1234"), "Acme");
        assert_eq!(registry.resolve_company_name("004C"), "Apple, Inc.");
    }

    #[tokio::test]
    async fn test_load_source_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "0x2B2A\tWidget Counter").unwrap();
        let registry = NameRegistry::seeded();

        let count = registry
            .load_source(NameTable::Characteristics, file.path().to_str().unwrap())
            .await
            .unwrap();

        assert_eq!(count, 1);
        assert_eq!(registry.resolve_characteristic_name("2B2A"), "Widget Counter");
    }

    #[tokio::test]
    async fn test_preload_missing_source_keeps_seed() {
        let registry = Arc::new(NameRegistry::seeded());
        let handle = registry.spawn_preload(vec![(
            NameTable::Companies,
            "/definitely/not/here.json".to_string(),
        )]);

        assert_eq!(handle.await.unwrap(), 0);
        assert_eq!(registry.resolve_company_name("004C"), "Apple, Inc.");
    }

    #[tokio::test]
    async fn test_load_empty_source_is_error() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let registry = NameRegistry::seeded();
        let err = registry
            .load_source(NameTable::Services, file.path().to_str().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, NameSourceError::Empty(_)));
    }
}
