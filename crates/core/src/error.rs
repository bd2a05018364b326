//! Error types for kerfnest.
//!
//! Only configuration problems are fatal. Geometry problems are repaired or
//! reported per part, NFP backend failures are absorbed by the conservative
//! fallback, and placement failures are an expected outcome recorded on the
//! solution.

use thiserror::Error;

/// Result type alias for kerfnest operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while configuring or running a nesting job.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed input polygon or an unrepairable boolean-op result.
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    /// Rejected configuration (sheet, spacing, rotation or scoring weights).
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// NFP backend failure. Recovered internally via the conservative fallback.
    #[error("NFP computation failed: {0}")]
    NfpError(String),

    /// Internal error (poisoned lock and similar).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns true if this error must abort a run before any geometry work.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::ConfigError(_) | Error::Internal(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::ConfigError("weights sum to 0.5".into());
        assert_eq!(err.to_string(), "Configuration error: weights sum to 0.5");
    }

    #[test]
    fn test_fatal_classification() {
        assert!(Error::ConfigError("x".into()).is_fatal());
        assert!(!Error::NfpError("x".into()).is_fatal());
        assert!(!Error::InvalidGeometry("self-intersection".into()).is_fatal());
    }
}
