//! Error types for redis-inventory
//!
//! This module defines the error hierarchy that covers:
//! - Store connection and protocol errors
//! - Configuration and CLI errors
//! - Report output errors
//!
//! Store errors that hit the scanning path end the scan; they are surfaced
//! to the caller as a [`ScanCompletion`](crate::scanner::ScanCompletion)
//! rather than as an `Err`, so a partial inventory is still returned.

use thiserror::Error;

/// Top-level error type for the redis-inventory application
#[derive(Error, Debug)]
pub enum InventoryError {
    /// Store-related errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O errors (report output, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON report serialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors talking to the key-value store
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// Could not open a connection
    #[error("Failed to connect to '{url}': {reason}")]
    ConnectionFailed { url: String, reason: String },

    /// Transport or server-side failure of a round trip
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Reply had the wrong shape for the command that produced it
    #[error("Malformed reply to {command}: {reason}")]
    MalformedReply { command: String, reason: String },

    /// Round trip abandoned because the scan was cancelled
    #[error("Operation cancelled")]
    Cancelled,
}

impl StoreError {
    /// Build a malformed-reply error for `command`
    pub fn malformed(command: &str, reason: impl Into<String>) -> Self {
        StoreError::MalformedReply {
            command: command.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::Protocol(err.to_string())
    }
}

/// Configuration and CLI errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Sample percentage outside 1..=100
    #[error("Invalid sample percentage {0}: must be between 1 and 100")]
    InvalidSamplePercent(u32),

    /// Scan page size of zero
    #[error("Invalid scan count {0}: must be at least 1")]
    InvalidScanCount(usize),

    /// Unparseable store address
    #[error("Invalid Redis address '{addr}': {reason}")]
    InvalidRedisUrl { addr: String, reason: String },

    /// Empty separator set
    #[error("Invalid separators '{0}': at least one character is required")]
    InvalidSeparator(String),
}

/// Result type alias for InventoryError
pub type Result<T> = std::result::Result<T, InventoryError>;

/// Result type alias for StoreError
pub type StoreResult<T> = std::result::Result<T, StoreError>;
