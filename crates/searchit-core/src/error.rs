//! Unified error types for the Search It core library.
//!
//! This module provides a unified error type [`SearchItError`] that covers all failure
//! modes of the pairing engine and its collaborators. Modules with their own
//! failure vocabulary ([`TransportError`](crate::transport::TransportError),
//! [`ConfigError`](crate::config::ConfigError)) convert into it via `From`.
//!
//! # Design Principles
//!
//! - **Specific variants**: Each error variant captures exactly one failure mode
//! - **Actionable messages**: Error messages guide users toward resolution
//! - **Context preservation**: Wrapped errors maintain their original context
//! - **HTTP-ready**: Error types include HTTP status codes and error codes
//!
//! # Example
//!
//! ```rust
//! use searchit_core::error::{ErrorKind, Result, SearchItError};
//!
//! fn require_selection(selected: Option<&str>) -> Result<&str> {
//!     selected.ok_or_else(|| SearchItError::Precondition("no object selected".into()))
//! }
//!
//! let err = require_selection(None).unwrap_err();
//! assert_eq!(err.kind(), ErrorKind::Precondition);
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// The unified error type for all Search It operations.
#[derive(Debug, Error)]
pub enum SearchItError {
    // =========================================================================
    // PAIRING ERRORS
    // =========================================================================
    /// One or more radio permissions were refused. Partial denial counts as denial.
    #[error("Bluetooth permission denied ({0}). Grant location, scan and connect access and retry.")]
    PermissionDenied(String),

    /// The operation's preconditions are not met (no object selected, pairing active).
    #[error("Cannot start pairing: {0}")]
    Precondition(String),

    /// The shared radio or the scan slot is already in use.
    #[error("Bluetooth radio is busy: {0}")]
    Conflict(String),

    /// No matching beacon advertised before the scan timeout elapsed.
    #[error(
        "No beacon found within {timeout_secs} seconds. Make sure it is powered on and within range."
    )]
    ScanTimeout {
        /// The scan timeout that elapsed.
        timeout_secs: u64,
    },

    /// Device discovery could not be started or broke off.
    #[error("Bluetooth scan failed: {0}")]
    ScanFailed(String),

    /// Transport-level connect or service discovery failure.
    #[error("Failed to connect to beacon: {0}")]
    Connection(String),

    /// A transient signal-strength read failure.
    #[error("Signal strength read failed: {0}")]
    Read(String),

    /// The operation is not legal in the current state.
    #[error("Cannot {operation} while {state}")]
    InvalidState {
        /// The rejected operation.
        operation: &'static str,
        /// The state it was rejected in.
        state: String,
    },

    /// The Bluetooth adapter is missing or cannot be used.
    #[error("Bluetooth is unavailable: {0}")]
    BluetoothUnavailable(String),

    // =========================================================================
    // OBJECT REGISTRY ERRORS
    // =========================================================================
    /// The registry already holds the maximum number of tracked objects.
    #[error("Maximum number of objects reached ({max})")]
    MaxObjectsReached {
        /// Configured maximum.
        max: usize,
    },

    /// No tracked object with the given id exists.
    #[error("Object not found: '{0}'")]
    ObjectNotFound(String),

    /// The object name was empty after trimming.
    #[error("Object name cannot be empty")]
    EmptyObjectName,

    /// The object description was empty after trimming.
    #[error("Object description cannot be empty")]
    EmptyObjectDescription,

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
    // PERSISTENCE & I/O ERRORS
    // =========================================================================
    /// An error occurred while persisting or reading data.
    #[error("Persistence error: {0}")]
    PersistenceError(String),

    /// A low-level I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// A specialized [`Result`] type for Search It operations.
pub type Result<T> = std::result::Result<T, SearchItError>;

/// Coarse error categories used by callers that only care about the failure class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Radio permissions refused.
    PermissionDenied,
    /// Preconditions not met.
    Precondition,
    /// Resource busy.
    Conflict,
    /// Scan finished without a match.
    ScanTimeout,
    /// Connect, discovery, scan or adapter failure.
    Connection,
    /// Transient signal read failure.
    Read,
    /// Operation illegal in the current state.
    InvalidState,
    /// Object registry failure.
    Registry,
    /// Configuration failure.
    Config,
    /// Storage or I/O failure.
    Persistence,
}

impl SearchItError {
    /// Returns the coarse category of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Self::Precondition(_) => ErrorKind::Precondition,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::ScanTimeout { .. } => ErrorKind::ScanTimeout,
            Self::ScanFailed(_) | Self::Connection(_) | Self::BluetoothUnavailable(_) => {
                ErrorKind::Connection
            }
            Self::Read(_) => ErrorKind::Read,
            Self::InvalidState { .. } => ErrorKind::InvalidState,
            Self::MaxObjectsReached { .. }
            | Self::ObjectNotFound(_)
            | Self::EmptyObjectName
            | Self::EmptyObjectDescription => ErrorKind::Registry,
            Self::ConfigNotFound(_) | Self::ConfigParseError(_) | Self::ConfigValidationError(_) => {
                ErrorKind::Config
            }
            Self::PersistenceError(_) | Self::IoError(_) => ErrorKind::Persistence,
        }
    }

    /// Returns `true` if this error is related to the pairing flow.
    #[inline]
    #[must_use]
    pub const fn is_pairing_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::PermissionDenied
                | ErrorKind::Precondition
                | ErrorKind::Conflict
                | ErrorKind::ScanTimeout
                | ErrorKind::Connection
                | ErrorKind::Read
                | ErrorKind::InvalidState
        )
    }

    /// Returns `true` if this error is related to configuration.
    #[inline]
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(self.kind(), ErrorKind::Config)
    }

    /// Returns `true` if this error represents an expected operational outcome
    /// rather than a fault (a scan that simply found nothing, a full registry).
    #[inline]
    #[must_use]
    pub const fn is_expected_state(&self) -> bool {
        matches!(
            self,
            Self::ScanTimeout { .. } | Self::MaxObjectsReached { .. }
        )
    }

    /// Returns `true` if the user can retry without changing anything but position or timing.
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ScanTimeout { .. }
                | Self::Connection(_)
                | Self::Read(_)
                | Self::Conflict(_)
                | Self::ScanFailed(_)
        )
    }

    /// Returns an HTTP-appropriate status code for this error.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - malformed input
            Self::EmptyObjectName | Self::EmptyObjectDescription => 400,

            // 403 Forbidden - the platform refused access
            Self::PermissionDenied(_) => 403,

            // 404 Not Found
            Self::ObjectNotFound(_) | Self::ConfigNotFound(_) => 404,

            // 409 Conflict - the current state does not allow the operation
            Self::Conflict(_) | Self::InvalidState { .. } | Self::MaxObjectsReached { .. } => 409,

            // 412 Precondition Failed
            Self::Precondition(_) => 412,

            // 422 Unprocessable Entity - semantic errors
            Self::ConfigParseError(_) | Self::ConfigValidationError(_) => 422,

            // 500 Internal Server Error - server-side issues
            Self::PersistenceError(_) | Self::IoError(_) => 500,

            // 502 Bad Gateway - the beacon misbehaved
            Self::Connection(_) => 502,

            // 503 Service Unavailable - Bluetooth hardware issues
            Self::BluetoothUnavailable(_) | Self::ScanFailed(_) | Self::Read(_) => 503,

            // 504 Gateway Timeout - nothing answered in time
            Self::ScanTimeout { .. } => 504,
        }
    }

    /// Returns a machine-readable error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::PermissionDenied(_) => "PERMISSION_DENIED",
            Self::Precondition(_) => "PRECONDITION_FAILED",
            Self::Conflict(_) => "RADIO_BUSY",
            Self::ScanTimeout { .. } => "SCAN_TIMEOUT",
            Self::ScanFailed(_) => "SCAN_FAILED",
            Self::Connection(_) => "CONNECTION_FAILED",
            Self::Read(_) => "SIGNAL_READ_FAILED",
            Self::InvalidState { .. } => "INVALID_STATE",
            Self::BluetoothUnavailable(_) => "BLUETOOTH_UNAVAILABLE",
            Self::MaxObjectsReached { .. } => "MAX_OBJECTS_REACHED",
            Self::ObjectNotFound(_) => "OBJECT_NOT_FOUND",
            Self::EmptyObjectName => "EMPTY_OBJECT_NAME",
            Self::EmptyObjectDescription => "EMPTY_OBJECT_DESCRIPTION",
            Self::ConfigNotFound(_) => "CONFIG_NOT_FOUND",
            Self::ConfigParseError(_) => "CONFIG_PARSE_ERROR",
            Self::ConfigValidationError(_) => "CONFIG_VALIDATION_ERROR",
            Self::PersistenceError(_) => "PERSISTENCE_ERROR",
            Self::IoError(_) => "IO_ERROR",
        }
    }
}

// =============================================================================
// CONVERSIONS FROM MODULE-SPECIFIC ERRORS
// =============================================================================

impl From<crate::config::ConfigError> for SearchItError {
    fn from(err: crate::config::ConfigError) -> Self {
        use crate::config::ConfigError;
        match err {
            ConfigError::NotFound(path) => Self::ConfigNotFound(path),
            ConfigError::WriteError { path, source } => {
                Self::PersistenceError(format!("Failed to write {}: {}", path.display(), source))
            }
            ConfigError::LoadError(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::SerializeError(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::ValidationError { field, message } => {
                Self::ConfigValidationError(format!("{field}: {message}"))
            }
            ConfigError::MultipleValidationErrors(errors) => {
                let messages: Vec<String> = errors.into_iter().map(|e| e.to_string()).collect();
                Self::ConfigValidationError(messages.join("; "))
            }
        }
    }
}

impl From<crate::transport::TransportError> for SearchItError {
    fn from(err: crate::transport::TransportError) -> Self {
        use crate::transport::TransportError;
        match err {
            TransportError::AdapterUnavailable { message } => Self::BluetoothUnavailable(message),
            TransportError::ScanFailed { message } => Self::ScanFailed(message),
            TransportError::ConnectFailed { device, message } => {
                Self::Connection(format!("{device}: {message}"))
            }
            TransportError::DiscoveryFailed { device, message } => {
                Self::Connection(format!("service discovery on {device} failed: {message}"))
            }
            TransportError::DisconnectFailed { message } => Self::Connection(message),
            TransportError::ReadFailed { message } => Self::Read(message),
            TransportError::NotConnected => Self::Read("no open connection".into()),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
