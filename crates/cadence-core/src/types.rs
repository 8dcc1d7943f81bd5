//! # Core Types
//!
//! Shared value types used by both the pure state machine and the runtime.
//!
//! ## Type Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Core Types                                      │
//! │                                                                         │
//! │  RefreshTrigger      who started a cycle (timer, request, first, ...)  │
//! │  RefreshOptions      per-cycle flags derived from the trigger          │
//! │  ListenerId          opaque subscription identifier                    │
//! │  CoordinatorStatus   serializable diagnostics snapshot                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::FailureKind;

// =============================================================================
// Refresh Trigger
// =============================================================================

/// What started a refresh cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshTrigger {
    /// The scheduler's timer fired.
    Scheduled,
    /// An explicit refresh (direct, or settled by the debouncer).
    Requested,
    /// The initialization flow's first refresh.
    FirstRefresh,
}

impl fmt::Display for RefreshTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefreshTrigger::Scheduled => write!(f, "scheduled"),
            RefreshTrigger::Requested => write!(f, "requested"),
            RefreshTrigger::FirstRefresh => write!(f, "first_refresh"),
        }
    }
}

// =============================================================================
// Refresh Options
// =============================================================================

/// Flags controlling a single refresh cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshOptions {
    /// Which entry point started the cycle.
    pub trigger: RefreshTrigger,
    /// Log failures on the success → failure transition.
    pub log_failures: bool,
    /// Re-raise auth failures instead of absorbing them.
    pub raise_on_auth_failed: bool,
    /// Re-raise config entry failures instead of absorbing them.
    pub raise_on_entry_error: bool,
}

impl RefreshOptions {
    /// Options for a timer-driven cycle.
    pub fn scheduled() -> Self {
        RefreshOptions {
            trigger: RefreshTrigger::Scheduled,
            log_failures: true,
            raise_on_auth_failed: false,
            raise_on_entry_error: false,
        }
    }

    /// Options for an explicit refresh.
    pub fn requested() -> Self {
        RefreshOptions {
            trigger: RefreshTrigger::Requested,
            ..Self::scheduled()
        }
    }

    /// Options for the first refresh: quiet logging, re-raise entry problems.
    pub fn first_refresh() -> Self {
        RefreshOptions {
            trigger: RefreshTrigger::FirstRefresh,
            log_failures: false,
            raise_on_auth_failed: true,
            raise_on_entry_error: true,
        }
    }

    /// Returns true for timer-driven cycles.
    pub fn is_scheduled(&self) -> bool {
        self.trigger == RefreshTrigger::Scheduled
    }
}

impl Default for RefreshOptions {
    fn default() -> Self {
        Self::requested()
    }
}

// =============================================================================
// Listener Id
// =============================================================================

/// Opaque identifier of a listener subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ListenerId(Uuid);

impl ListenerId {
    /// Generates a fresh, unique id.
    pub fn new() -> Self {
        ListenerId(Uuid::new_v4())
    }
}

impl Default for ListenerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Coordinator Status
// =============================================================================

/// Point-in-time diagnostics for one coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorStatus {
    /// Coordinator name.
    pub name: String,
    /// Whether the last cycle succeeded.
    pub last_update_success: bool,
    /// Wall-clock time of the last successful update.
    pub last_update_success_time: Option<DateTime<Utc>>,
    /// Kind of the last recorded error.
    pub last_error_kind: Option<FailureKind>,
    /// Message of the last recorded error.
    pub last_error: Option<String>,
    /// Whether any data has been fetched yet.
    pub has_data: bool,
    /// Number of registered listeners.
    pub listener_count: usize,
    /// Configured interval in milliseconds, `None` when polling is off.
    pub update_interval_ms: Option<u64>,
    /// Whether a refresh timer is currently armed.
    pub refresh_armed: bool,
    /// Whether shutdown was requested.
    pub shutdown_requested: bool,
}

impl CoordinatorStatus {
    /// Renders the status as JSON for diagnostics dumps.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_refresh_options() {
        let opts = RefreshOptions::first_refresh();
        assert!(!opts.log_failures);
        assert!(opts.raise_on_auth_failed);
        assert!(opts.raise_on_entry_error);
        assert!(!opts.is_scheduled());
    }

    #[test]
    fn test_scheduled_options() {
        let opts = RefreshOptions::scheduled();
        assert!(opts.is_scheduled());
        assert!(opts.log_failures);
        assert!(!opts.raise_on_auth_failed);
        assert_eq!(RefreshOptions::default().trigger, RefreshTrigger::Requested);
    }

    #[test]
    fn test_listener_ids_are_unique() {
        assert_ne!(ListenerId::new(), ListenerId::new());
    }

    #[test]
    fn test_status_json() {
        let status = CoordinatorStatus {
            name: "weather".into(),
            last_update_success: false,
            last_update_success_time: None,
            last_error_kind: Some(FailureKind::Transport),
            last_error: Some("Transport error: reset".into()),
            has_data: true,
            listener_count: 2,
            update_interval_ms: Some(30_000),
            refresh_armed: true,
            shutdown_requested: false,
        };
        let json = status.to_json().unwrap();
        assert!(json.contains("\"last_error_kind\": \"transport\""));
        assert!(json.contains("\"listener_count\": 2"));
    }
}
