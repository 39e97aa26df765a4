//! Error types for the Galaxy3D scene flow
//!
//! This module defines the error types used throughout the scene flow,
//! including registration conflicts, stale handles and graphics device
//! failures, plus the `engine_err!` / `engine_bail!` family of macros
//! that log an error before handing it back to the caller.

use std::fmt;

/// Result type for Galaxy3D scene flow operations
pub type Result<T> = std::result::Result<T, Error>;

/// Galaxy3D scene flow errors
#[derive(Debug, Clone)]
pub enum Error {
    /// Graphics device or other backend failure
    BackendError(String),

    /// Initialization failed (effects, loader, subsystems)
    InitializationFailed(String),

    /// Invalid resource (bad parameter block, bad framebuffer, etc.)
    InvalidResource(String),

    /// An entry with the same name is already registered
    AlreadyExists(String),

    /// Unknown name or stale handle
    NotFound(String),

    /// A fixed-capacity pool is full
    CapacityExceeded(String),

    /// Operation not allowed in the current state
    InvalidOperation(String),

    /// A blocking drain did not reach its target state in time
    Timeout(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
            Error::InvalidResource(msg) => write!(f, "Invalid resource: {}", msg),
            Error::AlreadyExists(msg) => write!(f, "Already exists: {}", msg),
            Error::NotFound(msg) => write!(f, "Not found: {}", msg),
            Error::CapacityExceeded(msg) => write!(f, "Capacity exceeded: {}", msg),
            Error::InvalidOperation(msg) => write!(f, "Invalid operation: {}", msg),
            Error::Timeout(msg) => write!(f, "Timeout: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

// ===== ERROR MACROS =====

/// Log an ERROR and build an [`Error`]
///
/// The variant defaults to `BackendError`. Prefix the message with
/// `Variant:` to pick another one.
///
/// # Example
///
/// ```ignore
/// let err = engine_err!("galaxy3d::SceneManager", NotFound: "Scene '{}' not found", name);
/// ```
#[macro_export]
macro_rules! engine_err {
    ($source:expr, $variant:ident : $($arg:tt)*) => {{
        let message = format!($($arg)*);
        $crate::engine_error!($source, "{}", message);
        $crate::galaxy3d::Error::$variant(message)
    }};
    ($source:expr, $($arg:tt)*) => {
        $crate::engine_err!($source, BackendError: $($arg)*)
    };
}

/// Log an ERROR and return it from the current function
#[macro_export]
macro_rules! engine_bail {
    ($($arg:tt)*) => {
        return Err($crate::engine_err!($($arg)*))
    };
}

/// Log a WARN and build an [`Error`]
///
/// Used for errors the caller is expected to recover from
/// (duplicate registrations, stale handles).
#[macro_export]
macro_rules! engine_warn_err {
    ($source:expr, $variant:ident : $($arg:tt)*) => {{
        let message = format!($($arg)*);
        $crate::engine_warn!($source, "{}", message);
        $crate::galaxy3d::Error::$variant(message)
    }};
    ($source:expr, $($arg:tt)*) => {
        $crate::engine_warn_err!($source, BackendError: $($arg)*)
    };
}

/// Log a WARN and return the error from the current function
#[macro_export]
macro_rules! engine_bail_warn {
    ($($arg:tt)*) => {
        return Err($crate::engine_warn_err!($($arg)*))
    };
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
