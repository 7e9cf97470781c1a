//! Error types for the device integration layer

use acs_core::{ErrorDiagnostic, RepositoryError};
use thiserror::Error;

use crate::codes;

/// Result type for SDK layer operations
pub type SdkResult<T> = Result<T, SdkError>;

/// Errors raised by the native gateway, discovery, sessions and ingestion
#[derive(Debug, Error)]
pub enum SdkError {
    /// Native library failed to load or initialise
    #[error("SDK initialization failed: {0}")]
    Initialization(ErrorDiagnostic),

    /// Device login failed
    #[error("Login to {endpoint} failed: {diagnostic}")]
    Login {
        endpoint: String,
        diagnostic: ErrorDiagnostic,
    },

    /// A single discovery probe failed
    #[error("Discovery probe {endpoint} failed: {reason}")]
    DiscoveryProbe { endpoint: String, reason: String },

    /// Event stream for one device failed
    #[error("Event stream for {device_id} failed: {diagnostic}")]
    Stream {
        device_id: String,
        diagnostic: ErrorDiagnostic,
    },

    /// Missing or invalid settings
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Feature unavailable (no session, backend missing, ...)
    #[error("Unavailable: {0}")]
    Unavailable(String),

    /// Operation cancelled by the caller
    #[error("Operation cancelled")]
    Cancelled,

    /// Persistence collaborator failed
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

impl SdkError {
    /// Initialization failure for a native error code
    pub fn initialization(code: u32) -> Self {
        Self::Initialization(codes::diagnose(code))
    }

    /// Initialization failure with a custom message
    pub fn initialization_with(code: u32, message: impl Into<String>) -> Self {
        let mut diagnostic = codes::diagnose(code);
        diagnostic.message = message.into();
        Self::Initialization(diagnostic)
    }

    /// Native diagnostic carried by this error, if any
    pub fn diagnostic(&self) -> Option<&ErrorDiagnostic> {
        match self {
            Self::Initialization(d) => Some(d),
            Self::Login { diagnostic, .. } | Self::Stream { diagnostic, .. } => Some(diagnostic),
            _ => None,
        }
    }

    /// Whether this error is local to one device
    pub fn is_device_local(&self) -> bool {
        matches!(
            self,
            Self::Login { .. } | Self::DiscoveryProbe { .. } | Self::Stream { .. }
        )
    }
}
