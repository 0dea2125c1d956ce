//! API error types and response handling.
//!
//! Every handler returns [`ApiResult`]; errors become a JSON
//! [`ErrorResponse`] with the matching status code.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use blescope_core::{BlescopeError, ConfigError, RadioError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Result type alias for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;

/// Unified API error type.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// 400 Bad Request - Invalid input from client.
    #[error("Bad Request: {message}")]
    BadRequest {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },

    /// 404 Not Found - Resource does not exist.
    #[error("Not Found: {message}")]
    NotFound {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },

    /// 409 Conflict - The device is not in a state that allows the request.
    #[error("Conflict: {message}")]
    Conflict {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
        /// Identity of the device involved.
        identity: Option<String>,
    },

    /// 500 Internal Server Error - Unexpected server-side error.
    #[error("Internal Error: {message}")]
    InternalError {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
        /// Optional details.
        details: Option<String>,
    },

    /// 502 Bad Gateway - The radio rejected or failed the command.
    #[error("Bad Gateway: {message}")]
    BadGateway {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },

    /// 503 Service Unavailable - Adapter or monitor is unavailable.
    #[error("Service Unavailable: {message}")]
    ServiceUnavailable {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },
}

impl ApiError {
    /// Reject a connect/disconnect because one is already running.
    #[must_use]
    pub fn command_in_flight(identity: &str) -> Self {
        Self::Conflict {
            error_code: "COMMAND_IN_FLIGHT".to_string(),
            message: format!("A connection command for '{identity}' is already in progress"),
            identity: Some(identity.to_string()),
        }
    }

    /// The device is not in the catalog.
    #[must_use]
    pub fn device_not_found(identity: &str) -> Self {
        Self::from(BlescopeError::DeviceNotFound(identity.to_string()))
    }

    /// Status code this error maps to.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::InternalError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BadGateway { .. } => StatusCode::BAD_GATEWAY,
            Self::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Standard JSON error response body.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "DEVICE_NOT_CONNECTED",
    "message": "Device '0C:1D:2E:3F:4A:5B' is not connected. Connect to it first.",
    "details": null
}))]
pub struct ErrorResponse {
    /// Machine-readable error code (e.g., "DEVICE_NOT_FOUND").
    #[schema(example = "DEVICE_NOT_FOUND")]
    pub error: String,

    /// Human-readable error message.
    #[schema(example = "Device not found: 'AA:BB:CC:DD:EE:FF'")]
    pub message: String,

    /// Optional additional details for debugging.
    #[schema(nullable)]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match self {
            Self::BadRequest { error_code, message }
            | Self::NotFound { error_code, message }
            | Self::BadGateway { error_code, message }
            | Self::ServiceUnavailable { error_code, message } => ErrorResponse {
                error: error_code,
                message,
                details: None,
            },

            Self::Conflict {
                error_code,
                message,
                identity,
            } => ErrorResponse {
                error: error_code,
                message,
                details: identity.map(|id| serde_json::json!({ "identity": id })),
            },

            Self::InternalError {
                error_code,
                message,
                details,
            } => {
                tracing::error!(
                    error_code = %error_code,
                    message = %message,
                    details = ?details,
                    "Internal server error"
                );
                ErrorResponse {
                    error: error_code,
                    message,
                    details: details.map(serde_json::Value::String),
                }
            }
        };

        (status, Json(body)).into_response()
    }
}

impl From<BlescopeError> for ApiError {
    fn from(err: BlescopeError) -> Self {
        let error_code = err.error_code().to_string();
        let message = err.to_string();

        match err {
            BlescopeError::InvalidAddress(_) | BlescopeError::UnsupportedOperation(_) => {
                Self::BadRequest { error_code, message }
            }
            BlescopeError::DeviceNotFound(_)
            | BlescopeError::CharacteristicNotFound { .. }
            | BlescopeError::ConfigNotFound(_) => Self::NotFound { error_code, message },
            BlescopeError::DeviceNotConnected(identity) => Self::Conflict {
                error_code,
                message,
                identity: Some(identity),
            },
            BlescopeError::RadioOperationFailed(_) => Self::BadGateway { error_code, message },
            BlescopeError::RadioAdapterNotFound
            | BlescopeError::RadioAdapterPoweredOff
            | BlescopeError::MonitorStopped
            | BlescopeError::NameSourceUnavailable(_) => {
                Self::ServiceUnavailable { error_code, message }
            }
            BlescopeError::ConfigParseError(_)
            | BlescopeError::ConfigValidationError(_)
            | BlescopeError::PersistenceError(_) => Self::InternalError {
                error_code,
                message,
                details: None,
            },
            BlescopeError::IoError(source) => Self::InternalError {
                error_code,
                message,
                details: Some(format!("{:?}", source.kind())),
            },
        }
    }
}

impl From<RadioError> for ApiError {
    fn from(err: RadioError) -> Self {
        Self::from(BlescopeError::from(err))
    }
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        Self::from(BlescopeError::from(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_request_error() {
        let err = ApiError::BadRequest {
            error_code: "test_error".to_string(),
            message: "Test message".to_string(),
        };
        assert!(err.to_string().contains("Bad Request"));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_error_response_serialization() {
        let response = ErrorResponse {
            error: "test_error".to_string(),
            message: "Test message".to_string(),
            details: None,
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("test_error"));
    }

    #[test]
    fn test_status_codes_follow_core_classification() {
        let cases = [
            BlescopeError::DeviceNotFound("A".into()),
            BlescopeError::DeviceNotConnected("A".into()),
            BlescopeError::UnsupportedOperation("read".into()),
            BlescopeError::RadioOperationFailed("boom".into()),
            BlescopeError::RadioAdapterNotFound,
            BlescopeError::MonitorStopped,
            BlescopeError::PersistenceError("disk".into()),
        ];
        for err in cases {
            let expected = err.http_status_code();
            assert_eq!(ApiError::from(err).status_code().as_u16(), expected);
        }
    }

    #[test]
    fn test_in_flight_conflict() {
        let err = ApiError::command_in_flight("A");
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert!(matches!(err, ApiError::Conflict { ref error_code, .. } if error_code == "COMMAND_IN_FLIGHT"));
    }

    #[test]
    fn test_radio_error_conversion() {
        let err = ApiError::from(RadioError::NotConnected {
            identity: "A".into(),
        });
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }
}
