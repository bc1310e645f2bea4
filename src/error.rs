//! Error types and handling for the inverter monitor
//!
//! This module defines the error types used throughout the application,
//! providing consistent error handling and reporting.

use thiserror::Error;

/// Result type alias for monitor operations
pub type Result<T> = std::result::Result<T, MonitorError>;

/// Main error type for the inverter monitor
#[derive(Debug, Error)]
pub enum MonitorError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Validation errors
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// File I/O and socket errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// Connection to inverterd lost or protocol framing broken
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// inverterd or the inverter itself rejected a command
    #[error("Device error: {command}: {message}")]
    Device { command: String, message: String },

    /// Telemetry could not be decoded into a sample
    #[error("Decode error: {message}")]
    Decode { message: String },

    /// Timeout errors
    #[error("Timeout error: {message}")]
    Timeout { message: String },
}

impl MonitorError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        MonitorError::Config {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(field: S, message: S) -> Self {
        MonitorError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        MonitorError::Io {
            message: message.into(),
        }
    }

    /// Create a new transport error
    pub fn transport<S: Into<String>>(message: S) -> Self {
        MonitorError::Transport {
            message: message.into(),
        }
    }

    /// Create a new device error for the named command
    pub fn device<C: Into<String>, S: Into<String>>(command: C, message: S) -> Self {
        MonitorError::Device {
            command: command.into(),
            message: message.into(),
        }
    }

    /// Create a new decode error
    pub fn decode<S: Into<String>>(message: S) -> Self {
        MonitorError::Decode {
            message: message.into(),
        }
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(message: S) -> Self {
        MonitorError::Timeout {
            message: message.into(),
        }
    }

    /// Whether the failure happened below the command layer, i.e. the
    /// connection itself is suspect and worth re-establishing.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            MonitorError::Io { .. } | MonitorError::Transport { .. } | MonitorError::Timeout { .. }
        )
    }
}

impl From<std::io::Error> for MonitorError {
    fn from(err: std::io::Error) -> Self {
        MonitorError::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for MonitorError {
    fn from(err: serde_yaml::Error) -> Self {
        MonitorError::Serialization {
            message: err.to_string(),
        }
    }
}
