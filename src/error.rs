use std::path::PathBuf;

use thiserror::Error;

use crate::domain::Protocol;

/// Failures opening or reading a capture device.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Permission denied opening '{0}' (capture usually requires elevated privileges)")]
    PermissionDenied(String),

    #[error("No such interface: {0}")]
    NoSuchInterface(String),

    #[error("Device busy: {0}")]
    DeviceBusy(String),

    #[error("Unsupported channel type on '{0}'")]
    UnsupportedChannel(String),

    #[error("Capture I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CaptureError {
    /// Classify an OS error raised while opening `interface`.
    pub fn from_open_error(interface: &str, err: std::io::Error) -> Self {
        let msg = err.to_string();
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(interface.to_string()),
            std::io::ErrorKind::NotFound => Self::NoSuchInterface(interface.to_string()),
            _ if msg.contains("Operation not permitted") || msg.contains("permission") => {
                Self::PermissionDenied(interface.to_string())
            }
            _ if msg.contains("busy") => Self::DeviceBusy(interface.to_string()),
            _ => Self::Io(err),
        }
    }
}

/// Why a layer could not be decoded. Never leaves the decoder: it is folded
/// into a `Malformed` or `Unknown` layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("{layer} truncated: expected {expected} bytes, have {actual}")]
    Truncated {
        layer: Protocol,
        expected: usize,
        actual: usize,
    },

    #[error("{layer}: {message}")]
    Invalid { layer: Protocol, message: String },

    #[error("payload is not {0}")]
    Unrecognized(Protocol),
}

impl DecodeError {
    pub fn invalid(layer: Protocol, message: impl Into<String>) -> Self {
        Self::Invalid {
            layer,
            message: message.into(),
        }
    }
}

/// Rejected query predicates. Raised before the store is touched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    #[error("Unknown protocol filter: {0}")]
    UnknownProtocol(String),

    #[error("Unknown filter field: {0}")]
    UnknownField(String),

    #[error("Invalid value '{value}' for {field}")]
    InvalidValue { field: String, value: String },
}

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Report I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error on {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Report interval must be at least one second")]
    InvalidInterval,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

/// Errors surfaced through the command boundary.
#[derive(Error, Debug)]
pub enum CommandError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error(transparent)]
    Report(#[from] ReportError),
}
