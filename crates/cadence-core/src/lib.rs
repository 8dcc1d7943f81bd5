//! # cadence-core: Pure Refresh Policy
//!
//! This crate is the decision-making **heart** of Cadence. It contains the
//! failure taxonomy, the refresh state machine and the listener registry as
//! plain data and functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Cadence Architecture                             │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              Collaborators (entities, dashboards)               │   │
//! │  │      subscribe ──► read data ──► request refresh                │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                cadence-runtime (Coordinator)                    │   │
//! │  │    Scheduler, Debouncer, RefreshEngine on tokio timers          │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ cadence-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   error   │  │   state   │  │  policy   │  │ listener  │  │   │
//! │  │   │FetchError │  │RefreshSt. │  │ decide()  │  │ Registry  │  │   │
//! │  │   │FailureKind│  │CycleReport│  │ Escalation│  │ Snapshot  │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO TIMERS • NO RUNTIME • PURE FUNCTIONS              │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Fetch failure taxonomy
//! - [`types`] - Triggers, options, ids, status snapshot
//! - [`state`] - Refresh state and per-cycle transitions
//! - [`policy`] - Notify / reschedule / escalate decisions
//! - [`listener`] - Listener registry and snapshots
//!
//! ## Example Usage
//!
//! ```rust
//! use cadence_core::{FetchError, RefreshOptions, RefreshPolicy, RefreshState};
//!
//! let mut state = RefreshState::new();
//! let policy = RefreshPolicy { always_update: false, ..Default::default() };
//!
//! let report = state.apply(Ok(21u32), chrono::Utc::now());
//! assert!(policy.decide(&report, &RefreshOptions::scheduled(), true, false).notify);
//!
//! // Same value again: nothing to tell listeners.
//! let report = state.apply(Ok(21u32), chrono::Utc::now());
//! assert!(!policy.decide(&report, &RefreshOptions::scheduled(), true, false).notify);
//!
//! let report = state.apply(Err(FetchError::Transport("reset".into())), chrono::Utc::now());
//! assert!(report.first_failure());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod listener;
pub mod policy;
pub mod state;
pub mod types;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{FailureKind, FetchError, FetchResult, SharedSource};
pub use listener::{ListenerCallback, ListenerRegistry, ListenerSnapshot};
pub use policy::{CycleDecision, Escalation, RefreshPolicy};
pub use state::{CycleReport, RefreshState};
pub use types::{CoordinatorStatus, ListenerId, RefreshOptions, RefreshTrigger};

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Lower bound of the default startup jitter range, in milliseconds.
pub const DEFAULT_JITTER_MIN_MS: u64 = 50;

/// Upper bound of the default startup jitter range, in milliseconds.
pub const DEFAULT_JITTER_MAX_MS: u64 = 500;

/// Default debouncer cooldown for refresh requests, in milliseconds.
pub const DEFAULT_REQUEST_REFRESH_COOLDOWN_MS: u64 = 10_000;

/// Whether the first refresh request of a burst runs immediately by default.
pub const DEFAULT_REQUEST_REFRESH_IMMEDIATE: bool = true;
