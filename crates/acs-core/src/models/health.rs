//! Native SDK health models

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A native error code translated into something an operator can act on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDiagnostic {
    /// Native error code
    pub code: u32,
    /// Human-readable message
    pub message: String,
    /// Remediation hint
    pub hint: String,
}

impl fmt::Display for ErrorDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

/// Snapshot of the native gateway state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SdkHealth {
    /// Native library loaded and initialised
    pub initialized: bool,
    /// `<os>-<arch>` of the running process
    pub platform: String,
    /// Live device sessions
    pub active_sessions: usize,
    /// Most recent native error, `None` when there is none
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<ErrorDiagnostic>,
    /// Directories searched for the native library, in order
    pub library_search_paths: Vec<PathBuf>,
    /// Where the native library was loaded from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub library_location: Option<PathBuf>,
}
