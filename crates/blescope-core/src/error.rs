//! Unified error types for the blescope core library.
//!
//! [`BlescopeError`] covers every failure mode that can reach a caller. Modules
//! that fail keep their own specific error types ([`ConfigError`],
//! [`RadioError`], [`NameSourceError`]) and convert into it.
//!
//! Malformed advertisement input and unknown names are never errors: the
//! decoder and resolvers always produce a result.
//!
//! # Example
//!
//! ```rust
//! use blescope_core::error::{BlescopeError, Result};
//! use std::path::PathBuf;
//!
//! fn load_config(path: &PathBuf) -> Result<()> {
//!     if !path.exists() {
//!         return Err(BlescopeError::ConfigNotFound(path.clone()));
//!     }
//!     Ok(())
//! }
//! ```
//!
//! [`ConfigError`]: crate::config::ConfigError
//! [`RadioError`]: crate::radio::RadioError
//! [`NameSourceError`]: crate::names::NameSourceError

use std::path::PathBuf;
use thiserror::Error;

/// The unified error type for all blescope operations.
#[derive(Debug, Error)]
pub enum BlescopeError {
    // =========================================================================
    // RADIO ERRORS
    // =========================================================================
    /// No Bluetooth adapter was found on this system.
    #[error(
        "No Bluetooth adapter found. Ensure Bluetooth hardware is present and drivers are loaded."
    )]
    RadioAdapterNotFound,

    /// The Bluetooth adapter exists but is powered off.
    #[error("Bluetooth adapter is powered off. Run 'bluetoothctl power on' to enable.")]
    RadioAdapterPoweredOff,

    /// A radio command was rejected or failed.
    #[error("Radio operation failed: {0}")]
    RadioOperationFailed(String),

    /// The device is unknown to the radio or the catalog.
    #[error("Device not found: '{0}'. Ensure the device is powered on and within range.")]
    DeviceNotFound(String),

    /// The operation needs a live connection.
    #[error("Device '{0}' is not connected. Connect to it first.")]
    DeviceNotConnected(String),

    /// The service/characteristic pair does not exist on the device.
    #[error("Characteristic {characteristic} not found in service {service}")]
    CharacteristicNotFound {
        /// Service UUID.
        service: String,
        /// Characteristic UUID.
        characteristic: String,
    },

    /// The characteristic does not support the requested operation.
    #[error("Operation not supported: {0}")]
    UnsupportedOperation(String),

    /// The device identity is not a valid Bluetooth address.
    #[error("Invalid Bluetooth address: '{0}'")]
    InvalidAddress(String),

    // =========================================================================
    // MONITOR ERRORS
    // =========================================================================
    /// The device monitor task is no longer running.
    #[error("Device monitor is not running")]
    MonitorStopped,

    // =========================================================================
    // CONFIGURATION ERRORS
    // =========================================================================
    /// The configuration file was not found at the expected path.
    #[error("Configuration file not found at: {}", .0.display())]
    ConfigNotFound(PathBuf),

    /// The configuration file exists but could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    ConfigParseError(String),

    /// The configuration was parsed but contains invalid values.
    #[error("Configuration validation failed: {0}")]
    ConfigValidationError(String),

    // =========================================================================
    // NAME SOURCE ERRORS
    // =========================================================================
    /// An external name table could not be loaded.
    #[error("Name source unavailable: {0}")]
    NameSourceUnavailable(String),

    // =========================================================================
    // PERSISTENCE & I/O ERRORS
    // =========================================================================
    /// An error occurred while persisting or reading data.
    #[error("Persistence error: {0}")]
    PersistenceError(String),

    /// A low-level I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// A specialized [`Result`] type for blescope operations.
pub type Result<T> = std::result::Result<T, BlescopeError>;

impl BlescopeError {
    /// Returns `true` if this error came from the radio.
    #[inline]
    #[must_use]
    pub const fn is_radio_error(&self) -> bool {
        matches!(
            self,
            Self::RadioAdapterNotFound
                | Self::RadioAdapterPoweredOff
                | Self::RadioOperationFailed(_)
                | Self::DeviceNotFound(_)
                | Self::DeviceNotConnected(_)
                | Self::CharacteristicNotFound { .. }
                | Self::UnsupportedOperation(_)
                | Self::InvalidAddress(_)
        )
    }

    /// Returns `true` if this error is related to configuration.
    #[inline]
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigNotFound(_) | Self::ConfigParseError(_) | Self::ConfigValidationError(_)
        )
    }

    /// Returns `true` if this error is related to I/O or persistence.
    #[inline]
    #[must_use]
    pub const fn is_io_error(&self) -> bool {
        matches!(self, Self::PersistenceError(_) | Self::IoError(_))
    }

    /// Returns `true` if retrying later may succeed without user intervention.
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::DeviceNotFound(_)
                | Self::DeviceNotConnected(_)
                | Self::RadioOperationFailed(_)
                | Self::NameSourceUnavailable(_)
        )
    }

    /// Returns an HTTP-appropriate status code for this error.
    #[inline]
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - malformed input
            Self::InvalidAddress(_) | Self::UnsupportedOperation(_) => 400,

            // 404 Not Found
            Self::ConfigNotFound(_) | Self::DeviceNotFound(_) | Self::CharacteristicNotFound { .. } => {
                404
            }

            // 409 Conflict - valid request, wrong device state
            Self::DeviceNotConnected(_) => 409,

            // 422 Unprocessable Entity - semantic errors
            Self::ConfigParseError(_) | Self::ConfigValidationError(_) => 422,

            // 500 Internal Server Error
            Self::PersistenceError(_) | Self::IoError(_) => 500,

            // 502 Bad Gateway - the radio failed the command
            Self::RadioOperationFailed(_) => 502,

            // 503 Service Unavailable
            Self::RadioAdapterNotFound
            | Self::RadioAdapterPoweredOff
            | Self::MonitorStopped
            | Self::NameSourceUnavailable(_) => 503,
        }
    }

    /// Returns a machine-readable error code for API responses.
    #[inline]
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::RadioAdapterNotFound => "RADIO_ADAPTER_NOT_FOUND",
            Self::RadioAdapterPoweredOff => "RADIO_ADAPTER_POWERED_OFF",
            Self::RadioOperationFailed(_) => "RADIO_OPERATION_FAILED",
            Self::DeviceNotFound(_) => "DEVICE_NOT_FOUND",
            Self::DeviceNotConnected(_) => "DEVICE_NOT_CONNECTED",
            Self::CharacteristicNotFound { .. } => "CHARACTERISTIC_NOT_FOUND",
            Self::UnsupportedOperation(_) => "UNSUPPORTED_OPERATION",
            Self::InvalidAddress(_) => "INVALID_ADDRESS",
            Self::MonitorStopped => "MONITOR_STOPPED",
            Self::ConfigNotFound(_) => "CONFIG_NOT_FOUND",
            Self::ConfigParseError(_) => "CONFIG_PARSE_ERROR",
            Self::ConfigValidationError(_) => "CONFIG_VALIDATION_ERROR",
            Self::NameSourceUnavailable(_) => "NAME_SOURCE_UNAVAILABLE",
            Self::PersistenceError(_) => "PERSISTENCE_ERROR",
            Self::IoError(_) => "IO_ERROR",
        }
    }
}

// =============================================================================
// CONVERSIONS FROM MODULE-SPECIFIC ERRORS
// =============================================================================

impl From<crate::config::ConfigError> for BlescopeError {
    fn from(err: crate::config::ConfigError) -> Self {
        use crate::config::ConfigError;
        match err {
            ConfigError::NotFound(path) => Self::ConfigNotFound(path),
            ConfigError::ReadError { path, source } => {
                Self::PersistenceError(format!("Failed to read {}: {source}", path.display()))
            }
            ConfigError::WriteError { path, source } => {
                Self::PersistenceError(format!("Failed to write {}: {source}", path.display()))
            }
            ConfigError::ParseError(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::SourceError(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::SerializeError(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::ValidationError { field, message } => {
                Self::ConfigValidationError(format!("{field}: {message}"))
            }
            ConfigError::MultipleValidationErrors(errors) => {
                let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
                Self::ConfigValidationError(messages.join("; "))
            }
        }
    }
}

impl From<crate::radio::RadioError> for BlescopeError {
    fn from(err: crate::radio::RadioError) -> Self {
        use crate::radio::RadioError;
        match err {
            RadioError::AdapterNotFound => Self::RadioAdapterNotFound,
            RadioError::AdapterPoweredOff => Self::RadioAdapterPoweredOff,
            RadioError::DeviceNotFound { identity } => Self::DeviceNotFound(identity),
            RadioError::NotConnected { identity } => Self::DeviceNotConnected(identity),
            RadioError::CharacteristicNotFound {
                service,
                characteristic,
            } => Self::CharacteristicNotFound {
                service,
                characteristic,
            },
            RadioError::ScanTimeout { duration_secs } => {
                Self::RadioOperationFailed(format!("Scan timed out after {duration_secs} seconds"))
            }
            RadioError::InvalidAddress { address } => Self::InvalidAddress(address),
            RadioError::Unsupported { operation } => Self::UnsupportedOperation(operation),
            RadioError::GattOperationFailed { operation, message } => {
                Self::RadioOperationFailed(format!("{operation}: {message}"))
            }
            RadioError::SessionInitFailed { message }
            | RadioError::DiscoveryFailed { message }
            | RadioError::Internal { message } => Self::RadioOperationFailed(message),
        }
    }
}

impl From<crate::names::NameSourceError> for BlescopeError {
    fn from(err: crate::names::NameSourceError) -> Self {
        Self::NameSourceUnavailable(err.to_string())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::RadioError;
    use std::io::{Error as IoErr, ErrorKind};

    #[test]
    fn test_radio_error_classification() {
        assert!(BlescopeError::RadioAdapterNotFound.is_radio_error());
        assert!(BlescopeError::RadioOperationFailed("x".into()).is_radio_error());
        assert!(BlescopeError::DeviceNotFound("A".into()).is_radio_error());
        assert!(!BlescopeError::MonitorStopped.is_radio_error());
        assert!(!BlescopeError::ConfigParseError("x".into()).is_radio_error());
    }

    #[test]
    fn test_config_error_classification() {
        assert!(BlescopeError::ConfigNotFound(PathBuf::from("/test")).is_config_error());
        assert!(BlescopeError::ConfigValidationError("invalid".into()).is_config_error());
        assert!(!BlescopeError::RadioAdapterNotFound.is_config_error());
    }

    #[test]
    fn test_io_error_classification() {
        assert!(BlescopeError::PersistenceError("disk full".into()).is_io_error());
        assert!(BlescopeError::IoError(IoErr::new(ErrorKind::NotFound, "test")).is_io_error());
        assert!(!BlescopeError::RadioAdapterNotFound.is_io_error());
    }

    #[test]
    fn test_recoverable_errors() {
        assert!(BlescopeError::DeviceNotFound("A".into()).is_recoverable());
        assert!(BlescopeError::NameSourceUnavailable("offline".into()).is_recoverable());
        assert!(!BlescopeError::RadioAdapterNotFound.is_recoverable());
    }

    #[test]
    fn test_http_status_codes() {
        assert_eq!(BlescopeError::InvalidAddress("zz".into()).http_status_code(), 400);
        assert_eq!(BlescopeError::DeviceNotFound("A".into()).http_status_code(), 404);
        assert_eq!(BlescopeError::DeviceNotConnected("A".into()).http_status_code(), 409);
        assert_eq!(BlescopeError::ConfigParseError("e".into()).http_status_code(), 422);
        assert_eq!(BlescopeError::PersistenceError("e".into()).http_status_code(), 500);
        assert_eq!(BlescopeError::RadioOperationFailed("e".into()).http_status_code(), 502);
        assert_eq!(BlescopeError::MonitorStopped.http_status_code(), 503);
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            BlescopeError::RadioAdapterNotFound.error_code(),
            "RADIO_ADAPTER_NOT_FOUND"
        );
        assert_eq!(
            BlescopeError::CharacteristicNotFound {
                service: "180F".into(),
                characteristic: "2A19".into()
            }
            .error_code(),
            "CHARACTERISTIC_NOT_FOUND"
        );
    }

    #[test]
    fn test_from_radio_error() {
        let err: BlescopeError = RadioError::NotConnected { identity: "A".into() }.into();
        assert!(matches!(err, BlescopeError::DeviceNotConnected(ref id) if id == "A"));

        let err: BlescopeError = RadioError::GattOperationFailed {
            operation: "connect".into(),
            message: "timeout".into(),
        }
        .into();
        assert_eq!(err.to_string(), "Radio operation failed: connect: timeout");
    }

    #[test]
    fn test_from_io_error() {
        let err: BlescopeError = IoErr::new(ErrorKind::NotFound, "file not found").into();
        assert!(matches!(err, BlescopeError::IoError(_)));
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<BlescopeError>();
        assert_sync::<BlescopeError>();
    }
}
