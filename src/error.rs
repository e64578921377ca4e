//! Error types for edgefetch.
//!
//! This module provides a unified error type [`FetchError`] for all retrieval
//! operations, along with a convenient [`Result`] type alias.
//!
//! # Error Categories
//!
//! - **Resolution**: the locator could not be reached, or no edge caches the content
//! - **Signing**: the client identity could not produce a signature
//! - **Edge**: an edge node refused or failed the request (not-found vs. transient)
//! - **Gateway**: the fallback gateway failed; terminal for the request
//! - **Selection**: the candidate pool cannot be sampled
//! - **Configuration / Network / Serialization**: infrastructure failures
//!
//! Failures are classified structurally through [`FetchError::kind`], never by
//! inspecting message text.
//!
//! # Example
//!
//! ```rust
//! use edgefetch::error::{ErrorKind, FetchError};
//!
//! let err = FetchError::EdgeNotFound("edge returned 404 Not Found".into());
//! assert_eq!(err.kind(), ErrorKind::NotFound);
//! assert!(err.is_not_found());
//! ```

use std::io;
use thiserror::Error;

/// Main error type for edgefetch operations.
///
/// The type is `Clone` so that a failed pool resolution can be cached by a
/// session and handed back verbatim on later calls.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    // Locator errors
    #[error("Edge resolution failed for {cid}: {reason}")]
    Resolution { cid: String, reason: String },

    #[error("No edge node caches content {0}")]
    NotCached(String),

    #[error("Locator RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    // Identity errors
    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    // Edge errors
    #[error("Edge content not found: {0}")]
    EdgeNotFound(String),

    #[error("Edge returned status {status}: {url}")]
    EdgeStatus { status: u16, url: String },

    #[error("Edge transport error: {0}")]
    EdgeTransport(String),

    #[error("Edge descriptor carries no capability signature (sn {0})")]
    MissingCapability(i64),

    // Gateway errors
    #[error("Gateway fetch failed: {0}")]
    Gateway(String),

    // Selection errors
    #[error("No candidate with a positive weight")]
    NoValidChoices,

    #[error("Sum of candidate weights exceeds the representable range")]
    WeightOverflow,

    #[error("Invalid content id: {0}")]
    InvalidContentId(String),

    #[error("Operation cancelled")]
    Cancelled,

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration: {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    // Network errors
    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error("Network error: {0}")]
    Network(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Structural classification of a [`FetchError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Pool resolution failed; sticky per session.
    Resolution,
    /// The client identity could not sign.
    Signing,
    /// The edge does not hold the content; eligible for gateway fallback, never reported.
    NotFound,
    /// Any other edge failure; reported to the locator as a failed download.
    TransientEdge,
    /// The gateway failed; terminal.
    Gateway,
    /// The pool could not be sampled.
    Selection,
    /// The caller cancelled the operation.
    Cancelled,
    /// Configuration, serialization or internal failures.
    Other,
}

impl FetchError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::Resolution { .. } | FetchError::NotCached(_) | FetchError::Rpc { .. } => {
                ErrorKind::Resolution
            }
            FetchError::Signing(_) | FetchError::KeyGeneration(_) => ErrorKind::Signing,
            FetchError::EdgeNotFound(_) => ErrorKind::NotFound,
            FetchError::EdgeStatus { .. }
            | FetchError::EdgeTransport(_)
            | FetchError::MissingCapability(_)
            | FetchError::Timeout(_)
            | FetchError::Network(_) => ErrorKind::TransientEdge,
            FetchError::Gateway(_) => ErrorKind::Gateway,
            FetchError::NoValidChoices | FetchError::WeightOverflow => ErrorKind::Selection,
            FetchError::Cancelled => ErrorKind::Cancelled,
            _ => ErrorKind::Other,
        }
    }

    /// Whether the edge reported that it does not hold the content.
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Check if error is retryable.
    ///
    /// A fresh call may re-select a different edge, so transient edge
    /// failures are retryable; sticky resolution failures are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FetchError::EdgeStatus { .. }
                | FetchError::EdgeTransport(_)
                | FetchError::Timeout(_)
                | FetchError::Network(_)
        )
    }
}

impl From<io::Error> for FetchError {
    fn from(e: io::Error) -> Self {
        FetchError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(e: serde_json::Error) -> Self {
        FetchError::Serialization(e.to_string())
    }
}

/// Result type alias for edgefetch operations.
pub type Result<T> = std::result::Result<T, FetchError>;
