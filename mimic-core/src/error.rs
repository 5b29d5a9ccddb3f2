//! Error types for mimic.
//!
//! All errors use `thiserror` for ergonomic error handling and proper error chains.

use thiserror::Error;

/// Result type alias for mimic operations.
pub type Result<T> = std::result::Result<T, MimicError>;

/// Main error type for mimic.
#[derive(Error, Debug)]
pub enum MimicError {
    // VM lifecycle errors
    #[error("Failed to start VM {vm}: {reason}")]
    VmStartFailed { vm: String, reason: String },

    #[error("Failed to stop VM {vm}: {reason}")]
    VmStopFailed { vm: String, reason: String },

    #[error("VM not found: {vm}")]
    VmNotFound { vm: String },

    // Plan errors
    #[error("Circular dependency detected among VMs: {vms}")]
    CircularDependency { vms: String },

    #[error("Missing dependency: VM '{vm}' depends on '{dependency}' which does not exist")]
    MissingDependency { vm: String, dependency: String },

    // Fleet file errors
    #[error("Fleet file parse error: {reason}")]
    FleetParseError { reason: String },

    #[error("Unsupported fleet file version: {version}")]
    UnsupportedFleetVersion { version: String },

    #[error("File read error: {path}: {source}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    // Configuration errors
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    // Driver errors
    #[error("Driver command {program:?} failed: {reason}")]
    DriverCommand { program: String, reason: String },

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl MimicError {
    /// Create an Internal error from any error type.
    pub fn internal(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Internal(err.to_string())
    }
}
