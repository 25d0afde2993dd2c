//! Error types for the license registry.

use thiserror::Error;

/// License registry errors.
#[derive(Debug, Error)]
pub enum LicenseError {
    /// A plugin with this id is already registered.
    #[error("{0} is already registered")]
    AlreadyRegistered(String),

    /// No plugin with this id is registered.
    #[error("plugin {0} is not registered")]
    NotFound(String),

    /// The validation endpoint could not be parsed as a URL.
    #[error("invalid validation endpoint for {id}: {reason}")]
    InvalidEndpoint { id: String, reason: String },

    /// The license server rejected the key or could not be reached.
    #[error("license validation failed for {id}: {message}")]
    Validation {
        id: String,
        status: Option<u16>,
        message: String,
    },

    /// The license server could not be reached while unlinking.
    #[error("license unlink failed for {id}: {message}")]
    Unlink {
        id: String,
        status: Option<u16>,
        message: String,
    },

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LicenseError {
    /// Returns the HTTP status an administrative surface should answer with.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::AlreadyRegistered(_) => 409,
            Self::InvalidEndpoint { .. } | Self::Validation { .. } | Self::Unlink { .. } => 400,
            Self::Storage(_) | Self::Config(_) | Self::Serialization(_) => 500,
        }
    }

    /// Returns true for errors reported by (or on the way to) the license server.
    #[must_use]
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Validation { .. } | Self::Unlink { .. })
    }
}

/// Result type for license operations.
pub type LicenseResult<T> = Result<T, LicenseError>;
