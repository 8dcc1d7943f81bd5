//! # cadence-runtime: Refresh Coordinator Runtime
//!
//! This crate runs cadence-core's refresh policy on tokio timers: it polls a
//! data source on an interval, keeps at most one fetch in flight, debounces
//! refresh requests, and tells listeners when the data (or its health)
//! changes in a way that matters.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Coordinator Architecture                         │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                  Coordinator (cloneable handle)                  │  │
//! │  │                                                                  │  │
//! │  │  add_listener • refresh • request_refresh • set_updated_data    │  │
//! │  │  config_entry_first_refresh • shutdown                          │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │   Scheduler    │  │  RefreshEngine │  │     Debouncer          │    │
//! │  │                │  │                │  │                        │    │
//! │  │ interval +     │  │ single-flight  │  │ immediate + trailing   │    │
//! │  │ fixed jitter,  │◄─│ fetch,classify │◄─│ execution per cooldown │    │
//! │  │ one armed timer│  │ notify,re-arm  │  │ window                 │    │
//! │  └────────────────┘  └───────┬────────┘  └────────────────────────┘    │
//! │                              │                                          │
//! │                              ▼                                          │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │ Host capabilities: TimerHost • HostState • ShutdownHooks •      │   │
//! │  │                    ConfigEntry • DataSource                     │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`coordinator`] - `Coordinator` handle, builder, subscriptions
//! - [`engine`] - refresh cycle and manual injection (crate-internal)
//! - [`scheduler`] - interval timer with jitter
//! - [`debounce`] - refresh request debouncer
//! - [`source`] - `DataSource` trait, closure adapter, deadlines
//! - [`host`] - host capability traits and tokio implementations
//! - [`config`] - TOML + environment configuration
//! - [`error`] - coordinator error types
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use cadence_core::FetchError;
//! use cadence_runtime::Coordinator;
//!
//! # async fn run() -> Result<(), cadence_runtime::CoordinatorError> {
//! let coordinator: Coordinator<f64> = Coordinator::builder("outdoor_temperature")
//!     .with_fetch_fn(|| async { Ok::<_, FetchError>(21.5) })
//!     .with_update_interval(Some(Duration::from_secs(30)))
//!     .build()?;
//!
//! coordinator.config_entry_first_refresh().await?;
//!
//! let reader = coordinator.clone();
//! let subscription = coordinator.add_listener(move || {
//!     println!("temperature is now {:?}", reader.data());
//! });
//!
//! // ... later
//! subscription.unsubscribe();
//! coordinator.shutdown();
//! # Ok(())
//! # }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod coordinator;
pub mod debounce;
mod engine;
pub mod error;
pub mod host;
pub mod scheduler;
pub mod source;

#[cfg(test)]
mod testing;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{CadenceConfig, CoordinatorSettings, DebounceSettings, JitterSettings};
pub use coordinator::{Coordinator, CoordinatorBuilder, Subscription};
pub use debounce::{DebounceConfig, Debouncer};
pub use error::{CoordinatorError, CoordinatorResult};
pub use host::{
    ConfigEntry, HookId, HostLifecycle, HostState, ShutdownHooks, StopCallback, TimerHandle,
    TimerHost, TimerJob, TokioTimer,
};
pub use scheduler::{draw_jitter, Scheduler};
pub use source::{fetch_fn, with_deadline, DataSource, FnSource};
