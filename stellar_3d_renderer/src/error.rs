//! Error types for the Stellar3D renderer
//!
//! Recoverable presentation conditions (out-of-date or suboptimal swapchain)
//! are never errors: they are reported as acquire/present outcomes and
//! absorbed by the frame synchronizer. Everything in this enum is fatal for
//! the render system that produced it.

use std::fmt;

/// Result type for Stellar3D renderer operations
pub type Result<T> = std::result::Result<T, Error>;

/// Engine-qualified name of `Error`
pub type Stellar3dError = Error;

/// Engine-qualified name of `Result`
pub type Stellar3dResult<T> = Result<T>;

/// Stellar3D renderer errors
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Backend-specific error (Vulkan, mock device, etc.)
    BackendError(String),

    /// Out of GPU memory
    OutOfMemory,

    /// Invalid resource (texture, buffer, shader, descriptor set, etc.)
    InvalidResource(String),

    /// Initialization failed (device, swapchain, pass)
    InitializationFailed(String),

    /// Render graph declaration bug (missing attachment, missing dependency edge)
    GraphDeclaration(String),

    /// Operation issued in a state that does not allow it
    InvalidState(String),

    /// Feature not supported by the device (ray tracing, format, ...)
    Unsupported(String),

    /// A fence wait exceeded the configured timeout
    Timeout(String),

    /// The logical device was lost
    DeviceLost(String),
}

impl Error {
    /// Short category name, used as log prefix
    pub fn kind(&self) -> &'static str {
        match self {
            Error::BackendError(_) => "backend",
            Error::OutOfMemory => "out-of-memory",
            Error::InvalidResource(_) => "invalid-resource",
            Error::InitializationFailed(_) => "initialization",
            Error::GraphDeclaration(_) => "graph-declaration",
            Error::InvalidState(_) => "invalid-state",
            Error::Unsupported(_) => "unsupported",
            Error::Timeout(_) => "timeout",
            Error::DeviceLost(_) => "device-lost",
        }
    }

    /// Always false: stale-surface conditions are reported as acquire and
    /// present outcomes, so every `Error` that reaches the caller is fatal.
    pub fn is_recoverable(&self) -> bool {
        false
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::OutOfMemory => write!(f, "Out of GPU memory"),
            Error::InvalidResource(msg) => write!(f, "Invalid resource: {}", msg),
            Error::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
            Error::GraphDeclaration(msg) => write!(f, "Render graph declaration error: {}", msg),
            Error::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            Error::Unsupported(msg) => write!(f, "Unsupported: {}", msg),
            Error::Timeout(msg) => write!(f, "Timeout: {}", msg),
            Error::DeviceLost(msg) => write!(f, "Device lost: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
