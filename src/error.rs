// src/error.rs
//! Error types for the device location service

use std::fmt;

pub type Result<T> = std::result::Result<T, DeviceLocationError>;

/// Coarse classification of a [`DeviceLocationError`], for callers that
/// need to react to a failure without inspecting its message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Connection,
    AlreadyOpen,
    ConnectionLost,
    Validation,
    InvalidState,
    Projection,
    Config,
    Io,
    Other,
}

#[derive(Debug)]
pub enum DeviceLocationError {
    /// The source could not be opened (port missing, claimed or misconfigured)
    Connection(String),
    /// `open` was called while another source is open
    AlreadyOpen,
    /// Fatal I/O failure after the connection was established
    ConnectionLost(String),
    /// A property value was rejected
    Validation(String),
    /// Operation is not allowed in the current service/map state
    InvalidState(String),
    Projection(String),
    Config(String),
    Io(std::io::Error),
    Serial(tokio_serial::Error),
    Json(serde_json::Error),
    Other(String),
}

impl DeviceLocationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DeviceLocationError::Connection(_) | DeviceLocationError::Serial(_) => {
                ErrorKind::Connection
            }
            DeviceLocationError::AlreadyOpen => ErrorKind::AlreadyOpen,
            DeviceLocationError::ConnectionLost(_) => ErrorKind::ConnectionLost,
            DeviceLocationError::Validation(_) => ErrorKind::Validation,
            DeviceLocationError::InvalidState(_) => ErrorKind::InvalidState,
            DeviceLocationError::Projection(_) => ErrorKind::Projection,
            DeviceLocationError::Config(_) | DeviceLocationError::Json(_) => ErrorKind::Config,
            DeviceLocationError::Io(_) => ErrorKind::Io,
            DeviceLocationError::Other(_) => ErrorKind::Other,
        }
    }
}

impl fmt::Display for DeviceLocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceLocationError::Connection(msg) => write!(f, "Connection error: {}", msg),
            DeviceLocationError::AlreadyOpen => {
                write!(f, "A device location source is already open; close it first")
            }
            DeviceLocationError::ConnectionLost(msg) => write!(f, "Connection lost: {}", msg),
            DeviceLocationError::Validation(msg) => write!(f, "Validation error: {}", msg),
            DeviceLocationError::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            DeviceLocationError::Projection(msg) => write!(f, "Projection error: {}", msg),
            DeviceLocationError::Config(msg) => write!(f, "Configuration error: {}", msg),
            DeviceLocationError::Io(e) => write!(f, "IO error: {}", e),
            DeviceLocationError::Serial(e) => write!(f, "Serial error: {}", e),
            DeviceLocationError::Json(e) => write!(f, "JSON error: {}", e),
            DeviceLocationError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for DeviceLocationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DeviceLocationError::Io(e) => Some(e),
            DeviceLocationError::Serial(e) => Some(e),
            DeviceLocationError::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for DeviceLocationError {
    fn from(error: std::io::Error) -> Self {
        DeviceLocationError::Io(error)
    }
}

impl From<tokio_serial::Error> for DeviceLocationError {
    fn from(error: tokio_serial::Error) -> Self {
        DeviceLocationError::Serial(error)
    }
}

impl From<serde_json::Error> for DeviceLocationError {
    fn from(error: serde_json::Error) -> Self {
        DeviceLocationError::Json(error)
    }
}

impl From<anyhow::Error> for DeviceLocationError {
    fn from(error: anyhow::Error) -> Self {
        DeviceLocationError::Other(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(DeviceLocationError::AlreadyOpen.kind(), ErrorKind::AlreadyOpen);
        assert_eq!(
            DeviceLocationError::Validation("negative".into()).kind(),
            ErrorKind::Validation
        );
        let io = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        assert_eq!(DeviceLocationError::from(io).kind(), ErrorKind::Io);
    }

    #[test]
    fn test_display() {
        let err = DeviceLocationError::InvalidState("tracking disabled".into());
        assert_eq!(err.to_string(), "Invalid state: tracking disabled");
    }
}
