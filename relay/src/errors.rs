use http::StatusCode;
use std::panic::Location;
use thiserror::Error;

/// Errors that stop the relay from starting or serving
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP client error: {0}")]
    HttpClientError(#[from] reqwest::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] crate::config::ConfigValidationError),
}

/// The inbound request cannot be relayed as sent. Never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Acción no especificada o datos inválidos.")]
    InvalidRequest,

    #[error("Acción no reconocida.")]
    UnknownAction(String),

    #[error("Faltan parámetros para \"{action}\": {}.", .fields.join(", "))]
    MissingFields {
        action: &'static str,
        fields: Vec<&'static str>,
    },

    #[error("El parámetro \"{field}\" debe ser un texto o un número.")]
    InvalidFieldType { field: &'static str },
}

/// A single upstream attempt failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct UpstreamError {
    pub message: String,
    /// Set when the upstream answered with an error status
    pub status: Option<StatusCode>,
}

impl UpstreamError {
    pub fn transport(error: impl std::fmt::Display) -> Self {
        Self {
            message: format!("Transport error: {error}"),
            status: None,
        }
    }

    pub fn http(status: StatusCode, detail: &str) -> Self {
        Self {
            message: format!("HTTP {}: {detail}", status.as_u16()),
            status: Some(status),
        }
    }
}

/// Something that should not happen while relaying, e.g. a serialization fault.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct InternalFault {
    pub message: String,
    pub location: Option<&'static Location<'static>>,
}

impl InternalFault {
    #[track_caller]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            location: Some(Location::caller()),
        }
    }

    /// Fault raised by a panic, where no source location is known.
    pub fn from_panic(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            location: None,
        }
    }
}

/// Outcome of a dispatch that did not produce an upstream payload
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Every configured key was tried; carries the last annotated failure.
    #[error("{0}")]
    KeysExhausted(String),

    #[error("No API keys configured or all failed without a specific error.")]
    NoApiKeys,

    #[error("Internal error: {0}")]
    Internal(InternalFault),
}

impl DispatchError {
    pub fn status(&self) -> StatusCode {
        match self {
            DispatchError::Validation(_) => StatusCode::BAD_REQUEST,
            DispatchError::KeysExhausted(_)
            | DispatchError::NoApiKeys
            | DispatchError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<serde_json::Error> for DispatchError {
    #[track_caller]
    fn from(error: serde_json::Error) -> Self {
        DispatchError::Internal(InternalFault::new(error.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_message_names_fields() {
        let error = ValidationError::MissingFields {
            action: "optimization",
            fields: vec!["vehicles", "jobs o shipments"],
        };
        let message = error.to_string();
        assert!(message.contains("optimization"));
        assert!(message.contains("vehicles, jobs o shipments"));
    }

    #[test]
    fn test_upstream_error_messages() {
        let error = UpstreamError::http(StatusCode::TOO_MANY_REQUESTS, "rate limit");
        assert_eq!(error.to_string(), "HTTP 429: rate limit");
        assert_eq!(error.status, Some(StatusCode::TOO_MANY_REQUESTS));

        let error = UpstreamError::transport("connection refused");
        assert_eq!(error.to_string(), "Transport error: connection refused");
        assert_eq!(error.status, None);
    }

    #[test]
    fn test_dispatch_error_status() {
        assert_eq!(
            DispatchError::from(ValidationError::InvalidRequest).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            DispatchError::NoApiKeys.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            DispatchError::KeysExhausted("HTTP 429: rate limit (failed with key 1/1)".into())
                .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_internal_fault_records_location() {
        let fault = InternalFault::new("boom");
        let location = fault.location.expect("location");
        assert!(location.file().ends_with("errors.rs"));
        assert!(InternalFault::from_panic("boom").location.is_none());
    }
}
