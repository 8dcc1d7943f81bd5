//! # Error Types
//!
//! The closed failure taxonomy a fetch function reports back to the
//! coordinator.
//!
//! ## Classification Order
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    FetchError → FailureKind                             │
//! │                                                                         │
//! │  Order   Variant          Kind            Policy                       │
//! │  ─────   ───────────────  ──────────────  ───────────────────────────   │
//! │  1       Timeout          Timeout         transient                    │
//! │  2       Transport        Transport       transient                    │
//! │  3       UpdateFailed     UpdateFailed    transient                    │
//! │  4       ConfigEntry      ConfigEntry     transient / raise on request │
//! │  5       AuthFailed       AuthFailed      transient, reauth, no notify │
//! │  6       NotImplemented   NotImplemented  FATAL, always propagates     │
//! │  7       Unexpected       Unknown         transient, always logged     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. The set is closed; `Unexpected` is the single fallthrough
//! 3. Errors are `Clone` so the last one can be stored and handed out

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Shared, type-erased source error carried by [`FetchError::Unexpected`].
pub type SharedSource = Arc<dyn std::error::Error + Send + Sync + 'static>;

// =============================================================================
// Fetch Error
// =============================================================================

/// A failure reported by a fetch function.
///
/// Fetch functions return `Result<T, FetchError>`; the refresh engine matches
/// on the variant in the order listed here.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// The fetch exceeded its own deadline.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Network or transport-layer failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The data source reported a domain-level failure.
    #[error("Update failed: {0}")]
    UpdateFailed(String),

    /// The owning configuration is broken.
    ///
    /// ## When This Occurs
    /// - A device was removed but its configuration was not
    /// - The configured endpoint answers with a permanent "unknown account"
    #[error("Config entry error: {0}")]
    ConfigEntry(String),

    /// Credentials were rejected.
    ///
    /// ## User Workflow
    /// ```text
    /// fetch() → AuthFailed
    ///      │
    ///      ▼
    /// coordinator records the failure (no listener notification)
    ///      │
    ///      ▼
    /// ConfigEntry::start_reauth() → collaborator asks for new credentials
    /// ```
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    /// The fetch function is missing or misconfigured. Never retried silently.
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// Anything else.
    #[error("Unexpected error: {message}")]
    Unexpected {
        message: String,
        #[source]
        source: Option<SharedSource>,
    },
}

impl FetchError {
    /// Wraps an arbitrary error as the catch-all variant, keeping it as source.
    pub fn unexpected<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        FetchError::Unexpected {
            message: err.to_string(),
            source: Some(Arc::new(err)),
        }
    }

    /// Catch-all variant with only a message.
    pub fn unexpected_msg(message: impl Into<String>) -> Self {
        FetchError::Unexpected {
            message: message.into(),
            source: None,
        }
    }

    /// Returns the classification tag of this error.
    pub fn kind(&self) -> FailureKind {
        match self {
            FetchError::Timeout(_) => FailureKind::Timeout,
            FetchError::Transport(_) => FailureKind::Transport,
            FetchError::UpdateFailed(_) => FailureKind::UpdateFailed,
            FetchError::ConfigEntry(_) => FailureKind::ConfigEntry,
            FetchError::AuthFailed(_) => FailureKind::AuthFailed,
            FetchError::NotImplemented(_) => FailureKind::NotImplemented,
            FetchError::Unexpected { .. } => FailureKind::Unknown,
        }
    }

    /// Returns true if this error must always propagate to the caller.
    pub fn is_fatal(&self) -> bool {
        self.kind().is_fatal()
    }

    /// Returns true if the next scheduled cycle may simply retry.
    pub fn is_transient(&self) -> bool {
        !self.is_fatal()
    }
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<std::io::Error> for FetchError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::TimedOut | ErrorKind::WouldBlock => FetchError::Timeout(err.to_string()),
            ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected
            | ErrorKind::AddrNotAvailable
            | ErrorKind::BrokenPipe
            | ErrorKind::UnexpectedEof => FetchError::Transport(err.to_string()),
            _ => FetchError::unexpected(err),
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        FetchError::unexpected(err)
    }
}

// =============================================================================
// Failure Kind
// =============================================================================

/// Classification tag of a [`FetchError`], safe to serialize and compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    Transport,
    UpdateFailed,
    ConfigEntry,
    AuthFailed,
    NotImplemented,
    Unknown,
}

impl FailureKind {
    /// Only a programmer error is fatal.
    pub fn is_fatal(&self) -> bool {
        matches!(self, FailureKind::NotImplemented)
    }

    /// Auth failures never notify listeners.
    pub fn suppresses_notification(&self) -> bool {
        matches!(self, FailureKind::AuthFailed)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::Transport => write!(f, "transport"),
            FailureKind::UpdateFailed => write!(f, "update_failed"),
            FailureKind::ConfigEntry => write!(f, "config_entry"),
            FailureKind::AuthFailed => write!(f, "auth_failed"),
            FailureKind::NotImplemented => write!(f, "not_implemented"),
            FailureKind::Unknown => write!(f, "unknown"),
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for fetch results.
pub type FetchResult<T> = Result<T, FetchError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_messages() {
        let err = FetchError::Transport("connection refused".to_string());
        assert_eq!(err.to_string(), "Transport error: connection refused");

        let err = FetchError::unexpected_msg("boom");
        assert_eq!(err.to_string(), "Unexpected error: boom");
    }

    #[test]
    fn test_kind_mapping() {
        assert_eq!(FetchError::Timeout("t".into()).kind(), FailureKind::Timeout);
        assert_eq!(FetchError::AuthFailed("a".into()).kind(), FailureKind::AuthFailed);
        assert_eq!(FetchError::unexpected_msg("x").kind(), FailureKind::Unknown);
    }

    #[test]
    fn test_only_not_implemented_is_fatal() {
        assert!(FetchError::NotImplemented("no update method".into()).is_fatal());
        assert!(FetchError::ConfigEntry("broken".into()).is_transient());
        assert!(FetchError::AuthFailed("expired".into()).is_transient());
        assert!(FetchError::unexpected_msg("x").is_transient());
    }

    #[test]
    fn test_io_error_classification() {
        let timed_out = std::io::Error::new(std::io::ErrorKind::TimedOut, "slow");
        assert_eq!(FetchError::from(timed_out).kind(), FailureKind::Timeout);

        let refused = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "nope");
        assert_eq!(FetchError::from(refused).kind(), FailureKind::Transport);

        let other = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = FetchError::from(other);
        assert_eq!(err.kind(), FailureKind::Unknown);
        assert!(err.source().is_some());
    }

    #[test]
    fn test_json_error_is_unexpected() {
        let parse = serde_json::from_str::<u32>("not json").unwrap_err();
        assert_eq!(FetchError::from(parse).kind(), FailureKind::Unknown);
    }

    #[test]
    fn test_failure_kind_display() {
        assert_eq!(FailureKind::UpdateFailed.to_string(), "update_failed");
        assert_eq!(FailureKind::NotImplemented.to_string(), "not_implemented");
    }
}
