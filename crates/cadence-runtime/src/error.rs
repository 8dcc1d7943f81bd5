//! # Coordinator Error Types
//!
//! Errors that leave the runtime. Fetch failures that are recovered locally
//! never appear here; only escalated ones do.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Coordinator Error Categories                         │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Escalated      │  │   Lifecycle     │  │     Configuration       │ │
//! │  │  fetch errors   │  │                 │  │                         │ │
//! │  │                 │  │  NotReady       │  │  InvalidConfig          │ │
//! │  │  Fatal          │  │  EntryBound     │  │  ConfigLoadFailed       │ │
//! │  │  AuthFailed     │  │                 │  │  ConfigSaveFailed       │ │
//! │  │  ConfigEntry    │  │                 │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use cadence_core::{Escalation, FetchError};
use thiserror::Error;

/// Result type alias for coordinator operations.
pub type CoordinatorResult<T> = Result<T, CoordinatorError>;

/// Error type covering everything a coordinator can hand back to its caller.
///
/// ## Design Principles
/// - Escalated fetch errors keep the original [`FetchError`]
/// - All errors are `Send + Sync` for async compatibility
#[derive(Debug, Error)]
pub enum CoordinatorError {
    // =========================================================================
    // Escalated Fetch Errors
    // =========================================================================
    /// The fetch function is missing or misconfigured.
    #[error("Fatal error refreshing data: {0}")]
    Fatal(#[source] FetchError),

    /// Credentials were rejected and the caller asked to see it.
    #[error("Authentication failed: {0}")]
    AuthFailed(#[source] FetchError),

    /// The owning configuration is broken and the caller asked to see it.
    #[error("Config entry failed: {0}")]
    ConfigEntry(#[source] FetchError),

    // =========================================================================
    // Lifecycle Errors
    // =========================================================================
    /// The first refresh did not succeed.
    #[error("Coordinator {name} is not ready")]
    NotReady {
        name: String,
        #[source]
        cause: Option<FetchError>,
    },

    /// Stop hooks are only for coordinators not bound to a config entry.
    #[error("Coordinator {0} is bound to a config entry; it shuts down on unload")]
    EntryBound(String),

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid coordinator configuration.
    #[error("Invalid coordinator configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),
}

impl CoordinatorError {
    /// Builds the caller-facing error for an escalated fetch failure.
    pub fn escalated(escalation: Escalation, err: FetchError) -> Self {
        match escalation {
            Escalation::Fatal => CoordinatorError::Fatal(err),
            Escalation::AuthFailed => CoordinatorError::AuthFailed(err),
            Escalation::ConfigEntry => CoordinatorError::ConfigEntry(err),
        }
    }

    /// Returns the underlying fetch error, if this error carries one.
    pub fn fetch_error(&self) -> Option<&FetchError> {
        match self {
            CoordinatorError::Fatal(err)
            | CoordinatorError::AuthFailed(err)
            | CoordinatorError::ConfigEntry(err) => Some(err),
            CoordinatorError::NotReady { cause, .. } => cause.as_ref(),
            _ => None,
        }
    }

    /// Returns true if this error signals a caller-side defect.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CoordinatorError::Fatal(_))
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            CoordinatorError::InvalidConfig(_)
                | CoordinatorError::ConfigLoadFailed(_)
                | CoordinatorError::ConfigSaveFailed(_)
        )
    }
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<std::io::Error> for CoordinatorError {
    fn from(err: std::io::Error) -> Self {
        CoordinatorError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for CoordinatorError {
    fn from(err: toml::de::Error) -> Self {
        CoordinatorError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for CoordinatorError {
    fn from(err: toml::ser::Error) -> Self {
        CoordinatorError::ConfigSaveFailed(err.to_string())
    }
}
