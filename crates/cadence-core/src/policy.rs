//! # Cycle Policy
//!
//! Turns a [`CycleReport`] into the side effects the runtime must perform:
//! notify, re-arm, start reauthentication, or escalate to the caller.
//!
//! ## Decision Table
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Outcome            Escalate           Reauth   Notify       Re-arm     │
//! │  ─────────────────  ─────────────────  ───────  ───────────  ────────── │
//! │  Success            -                  -        policy       listeners │
//! │  Timeout/Transport  -                  -        policy       listeners │
//! │  UpdateFailed       -                  -        policy       listeners │
//! │  ConfigEntry        if raise_on_entry  -        unless esc.  listeners │
//! │  AuthFailed         if raise_on_auth   unless   never        config    │
//! │  NotImplemented     always (Fatal)     -        never        listeners │
//! │  Unknown            -                  -        policy       listeners │
//! │                                                                         │
//! │  "listeners" = listener set non-empty AND host not stopping            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::FailureKind;
use crate::state::CycleReport;
use crate::types::RefreshOptions;

// =============================================================================
// Escalation
// =============================================================================

/// Why a cycle must hand its error back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escalation {
    /// Programmer error; always propagates.
    Fatal,
    /// Auth failure the caller asked to see.
    AuthFailed,
    /// Config entry failure the caller asked to see.
    ConfigEntry,
}

// =============================================================================
// Cycle Decision
// =============================================================================

/// Side effects to perform once a cycle has settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleDecision {
    pub notify: bool,
    pub reschedule: bool,
    pub start_reauth: bool,
    pub escalate: Option<Escalation>,
}

// =============================================================================
// Refresh Policy
// =============================================================================

/// Per-coordinator knobs that shape cycle decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshPolicy {
    /// Notify on every successful fetch, even if the value is unchanged.
    pub always_update: bool,
    /// Keep polling while reauthentication is pending.
    pub reschedule_on_auth_failure: bool,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        RefreshPolicy {
            always_update: true,
            reschedule_on_auth_failure: true,
        }
    }
}

impl RefreshPolicy {
    /// Decides the side effects of a settled cycle.
    pub fn decide(
        &self,
        report: &CycleReport,
        options: &RefreshOptions,
        has_listeners: bool,
        host_stopping: bool,
    ) -> CycleDecision {
        let auth_failed = report.failure == Some(FailureKind::AuthFailed);

        let escalate = match report.failure {
            Some(FailureKind::NotImplemented) => Some(Escalation::Fatal),
            Some(FailureKind::ConfigEntry) if options.raise_on_entry_error => {
                Some(Escalation::ConfigEntry)
            }
            Some(FailureKind::AuthFailed) if options.raise_on_auth_failed => {
                Some(Escalation::AuthFailed)
            }
            _ => None,
        };

        let start_reauth = auth_failed && escalate.is_none();

        let reschedule = has_listeners
            && !host_stopping
            && (!auth_failed || self.reschedule_on_auth_failure);

        let notify = escalate.is_none() && report.should_notify(self.always_update);

        CycleDecision {
            notify,
            reschedule,
            start_reauth,
            escalate,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
