//! # Refresh State
//!
//! The data a coordinator owns and the pure transitions applied to it at the
//! end of every cycle.
//!
//! ## State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │            ┌──────┐   fetch()   ┌──────────┐                           │
//! │            │ Idle │────────────▶│ Fetching │                           │
//! │            └──────┘             └────┬─────┘                           │
//! │               ▲                      │                                  │
//! │               │        ┌─────────────┴──────────────┐                   │
//! │               │        ▼                            ▼                   │
//! │               │   ┌─────────┐              ┌─────────────────┐          │
//! │               ├───│ Success │              │ Failed<Kind>    │          │
//! │               │   └─────────┘              └────────┬────────┘          │
//! │               └─────────────────────────────────────┘                   │
//! │                                                                         │
//! │  last_update_success:                                                  │
//! │    true  ──(first failure)──▶ false   (logged + notified once)        │
//! │    false ──(any failure)────▶ false   (silent)                        │
//! │    false ──(success)────────▶ true    ("recovered" logged once)       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};

use crate::error::{FailureKind, FetchError};

// =============================================================================
// Cycle Report
// =============================================================================

/// What a single cycle changed. Input to the notify/reschedule policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    /// `last_update_success` before the cycle.
    pub previous_success: bool,
    /// `last_update_success` after the cycle.
    pub success: bool,
    /// A successful fetch returned a value different from the stored one.
    pub data_changed: bool,
    /// Classification of the failure, if the cycle failed.
    pub failure: Option<FailureKind>,
}

impl CycleReport {
    /// The cycle flipped `last_update_success` from true to false.
    pub fn first_failure(&self) -> bool {
        self.previous_success && !self.success
    }

    /// The cycle flipped `last_update_success` from false to true.
    pub fn recovered(&self) -> bool {
        !self.previous_success && self.success
    }

    /// Both the previous and this cycle ended in failure.
    pub fn repeated_failure(&self) -> bool {
        !self.previous_success && !self.success
    }

    /// Whether listeners should hear about this cycle.
    ///
    /// Auth failures never notify; two failures in a row never notify.
    pub fn should_notify(&self, always_update: bool) -> bool {
        if self
            .failure
            .is_some_and(|kind| kind.suppresses_notification())
        {
            return false;
        }
        if self.repeated_failure() {
            return false;
        }
        always_update || self.success != self.previous_success || self.data_changed
    }

    /// Whether the failure should be written to the log.
    ///
    /// Unknown errors are always logged; every other kind only on the
    /// transition into failure, and only when the caller wants failure logs.
    pub fn should_log_failure(&self, log_failures: bool) -> bool {
        match self.failure {
            Some(FailureKind::Unknown) => true,
            Some(FailureKind::NotImplemented) | None => false,
            Some(_) => log_failures && self.first_failure(),
        }
    }
}

// =============================================================================
// Refresh State
// =============================================================================

/// Data and health of one coordinator.
#[derive(Debug, Clone)]
pub struct RefreshState<T> {
    data: Option<T>,
    last_update_success: bool,
    last_error: Option<FetchError>,
    last_update_success_time: Option<DateTime<Utc>>,
}

impl<T> Default for RefreshState<T> {
    fn default() -> Self {
        RefreshState {
            data: None,
            last_update_success: true,
            last_error: None,
            last_update_success_time: None,
        }
    }
}

impl<T> RefreshState<T> {
    /// Creates a state that has never fetched and is considered healthy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Last successfully fetched value; `None` until the first success.
    pub fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }

    pub fn last_update_success(&self) -> bool {
        self.last_update_success
    }

    pub fn last_error(&self) -> Option<&FetchError> {
        self.last_error.as_ref()
    }

    pub fn last_update_success_time(&self) -> Option<DateTime<Utc>> {
        self.last_update_success_time
    }

    /// Applies a fetch failure.
    ///
    /// A programmer error is stored but leaves the health flag untouched: it
    /// propagates to the caller instead of describing the data source.
    pub fn record_failure(&mut self, err: FetchError) -> CycleReport {
        let previous_success = self.last_update_success;
        let kind = err.kind();
        if kind != FailureKind::NotImplemented {
            self.last_update_success = false;
        }
        self.last_error = Some(err);

        CycleReport {
            previous_success,
            success: self.last_update_success,
            data_changed: false,
            failure: Some(kind),
        }
    }

    /// Records an error injected by the collaborator without a fetch.
    ///
    /// Returns true if this flipped the coordinator into failure, which is
    /// the only case that should log and notify.
    pub fn record_manual_error(&mut self, err: FetchError) -> bool {
        self.last_error = Some(err);
        if self.last_update_success {
            self.last_update_success = false;
            return true;
        }
        false
    }
}

impl<T: PartialEq> RefreshState<T> {
    /// Applies a successful fetch.
    pub fn record_success(&mut self, data: T, now: DateTime<Utc>) -> CycleReport {
        let previous_success = self.last_update_success;
        let data_changed = self.data.as_ref() != Some(&data);

        self.data = Some(data);
        self.last_update_success = true;
        self.last_error = None;
        self.last_update_success_time = Some(now);

        CycleReport {
            previous_success,
            success: true,
            data_changed,
            failure: None,
        }
    }

    /// Applies the result of a fetch.
    pub fn apply(&mut self, result: Result<T, FetchError>, now: DateTime<Utc>) -> CycleReport {
        match result {
            Ok(data) => self.record_success(data, now),
            Err(err) => self.record_failure(err),
        }
    }
}

impl<T> RefreshState<T> {
    /// Stores data pushed by the collaborator without a fetch.
    pub fn record_manual_data(&mut self, data: T, now: DateTime<Utc>) {
        self.data = Some(data);
        self.last_update_success = true;
        self.last_error = None;
        self.last_update_success_time = Some(now);
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn transport() -> FetchError {
        FetchError::Transport("reset by peer".into())
    }

    #[test]
    fn test_initial_state() {
        let state: RefreshState<u32> = RefreshState::new();
        assert!(state.data().is_none());
        assert!(state.last_update_success());
        assert!(state.last_error().is_none());
    }

    #[test]
    fn test_first_success_changes_data() {
        let mut state = RefreshState::new();
        let report = state.record_success(0u32, Utc::now());
        // "Fetched zero" is distinguishable from "never fetched".
        assert!(report.data_changed);
        assert_eq!(state.data(), Some(&0));
        assert!(state.last_update_success_time().is_some());
    }

    #[test]
    fn test_identical_value_is_not_a_change() {
        let mut state = RefreshState::new();
        state.record_success(7u32, Utc::now());
        let report = state.record_success(7u32, Utc::now());
        assert!(!report.data_changed);
        assert!(!report.should_notify(false));
        assert!(report.should_notify(true));
    }

    #[test]
    fn test_changed_value_notifies_without_always_update() {
        let mut state = RefreshState::new();
        state.record_success(7u32, Utc::now());
        let report = state.record_success(8u32, Utc::now());
        assert!(report.should_notify(false));
    }

    #[test]
    fn test_failure_keeps_data() {
        let mut state = RefreshState::new();
        state.record_success(7u32, Utc::now());
        let report = state.record_failure(transport());
        assert!(report.first_failure());
        assert_eq!(state.data(), Some(&7));
        assert!(!state.last_update_success());
        assert_eq!(state.last_error().map(|e| e.kind()), Some(FailureKind::Transport));
    }

    #[test]
    fn test_consecutive_failures_notify_once() {
        let mut state: RefreshState<u32> = RefreshState::new();
        let first = state.record_failure(transport());
        let second = state.record_failure(FetchError::Timeout("slow".into()));

        assert!(first.should_notify(true));
        assert!(first.should_notify(false));
        assert!(!second.should_notify(true));
        assert!(!second.should_notify(false));
    }

    #[test]
    fn test_recovery() {
        let mut state = RefreshState::new();
        state.record_failure(transport());
        let report = state.record_success(1u32, Utc::now());
        assert!(report.recovered());
        assert!(report.should_notify(false));
        assert!(state.last_error().is_none());
    }

    #[test]
    fn test_auth_failure_never_notifies() {
        let mut state: RefreshState<u32> = RefreshState::new();
        let report = state.record_failure(FetchError::AuthFailed("expired".into()));
        assert!(report.first_failure());
        assert!(!report.should_notify(true));
    }

    #[test]
    fn test_not_implemented_leaves_health_flag() {
        let mut state: RefreshState<u32> = RefreshState::new();
        let report = state.record_failure(FetchError::NotImplemented("no method".into()));
        assert!(state.last_update_success());
        assert!(!report.first_failure());
        assert!(state.last_error().is_some());
    }

    #[test]
    fn test_failure_logging_once_per_transition() {
        let mut state: RefreshState<u32> = RefreshState::new();
        let first = state.record_failure(transport());
        let second = state.record_failure(transport());
        assert!(first.should_log_failure(true));
        assert!(!first.should_log_failure(false));
        assert!(!second.should_log_failure(true));
    }

    #[test]
    fn test_unknown_errors_always_logged() {
        let mut state: RefreshState<u32> = RefreshState::new();
        state.record_failure(transport());
        let report = state.record_failure(FetchError::unexpected_msg("boom"));
        assert!(report.should_log_failure(false));
    }

    #[test]
    fn test_manual_error_flips_once() {
        let mut state: RefreshState<u32> = RefreshState::new();
        assert!(state.record_manual_error(transport()));
        assert!(!state.record_manual_error(transport()));
        assert!(!state.last_update_success());
    }

    #[test]
    fn test_manual_data_restores_health() {
        let mut state = RefreshState::new();
        state.record_failure(transport());
        state.record_manual_data(3u32, Utc::now());
        assert!(state.last_update_success());
        assert!(state.last_error().is_none());
        assert_eq!(state.data(), Some(&3));
    }
}
