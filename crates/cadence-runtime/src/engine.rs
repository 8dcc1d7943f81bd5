//! # Refresh Engine
//!
//! Executes refresh cycles and the manual injection paths. Owns the shared
//! state behind a [`Coordinator`](crate::Coordinator) handle.
//!
//! ## One Cycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  acquire single-flight lock                                            │
//! │    │                                                                    │
//! │    ├─► disarm timer, cancel pending debounced call                     │
//! │    ├─► shutdown requested?  (or scheduled + host stopping) ─► return   │
//! │    ├─► fetch() once                                                    │
//! │    ├─► RefreshState::apply ─► CycleReport                              │
//! │    ├─► log transition (failure once, recovery once, timing always)     │
//! │    ├─► RefreshPolicy::decide                                           │
//! │    │      start_reauth ─► ConfigEntry::start_reauth                    │
//! │    │      reschedule   ─► Scheduler::arm                               │
//! │    │      escalate     ─► return Err                                   │
//! │    └─► notify listeners from a snapshot                                │
//! │  release lock                                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Synchronous state sits behind a `std::sync::Mutex` that is never held
//! across an `.await` or while listener callbacks run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use cadence_core::{
    CoordinatorStatus, FailureKind, FetchError, ListenerCallback, ListenerId, ListenerRegistry,
    RefreshOptions, RefreshPolicy, RefreshState,
};
use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::debounce::Debouncer;
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::host::{ConfigEntry, HookId, HostState, ShutdownHooks, TimerHost};
use crate::scheduler::Scheduler;
use crate::source::DataSource;

// =============================================================================
// Shared State
// =============================================================================

pub(crate) struct SharedState<T, C> {
    pub(crate) refresh: RefreshState<T>,
    pub(crate) listeners: ListenerRegistry<C>,
}

/// Health as one cycle left it.
pub(crate) struct CycleHealth {
    success: bool,
    error: Option<FetchError>,
}

impl CycleHealth {
    fn of<T>(refresh: &RefreshState<T>) -> Self {
        CycleHealth {
            success: refresh.last_update_success(),
            error: refresh.last_error().cloned(),
        }
    }
}

/// Removes listeners on behalf of a [`Subscription`](crate::Subscription)
/// without naming the coordinator's data type.
pub(crate) trait ListenerOwner: Send + Sync {
    fn remove_listener(&self, id: ListenerId);
}

/// Everything one coordinator owns.
pub(crate) struct CoordinatorInner<T, C> {
    pub(crate) name: String,
    pub(crate) source: Option<Arc<dyn DataSource<T>>>,
    pub(crate) policy: RefreshPolicy,
    pub(crate) timer: Arc<dyn TimerHost>,
    pub(crate) host: Arc<dyn HostState>,
    pub(crate) entry: Option<Arc<dyn ConfigEntry>>,
    pub(crate) shutdown_requested: Arc<AtomicBool>,
    pub(crate) scheduler: Scheduler,
    pub(crate) debouncer: Debouncer,
    pub(crate) state: Mutex<SharedState<T, C>>,
    pub(crate) stop_hook: Mutex<Option<(Arc<dyn ShutdownHooks>, HookId)>>,
    /// Single-flight: held for the whole of one cycle.
    pub(crate) cycle_lock: tokio::sync::Mutex<()>,
    pub(crate) weak_self: Weak<CoordinatorInner<T, C>>,
}

impl<T, C> CoordinatorInner<T, C> {
    pub(crate) fn lock_state(&self) -> MutexGuard<'_, SharedState<T, C>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }

    /// Runs every listener registered right now.
    pub(crate) fn notify_listeners(&self) {
        let snapshot = self.lock_state().listeners.snapshot();
        snapshot.notify_all();
    }

    /// One-way and idempotent.
    pub(crate) fn shutdown(&self) {
        let already = self.shutdown_requested.swap(true, Ordering::SeqCst);

        self.scheduler.disarm();
        let hook = self
            .stop_hook
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some((hooks, id)) = hook {
            hooks.remove_on_stop(id);
        }
        self.debouncer.shutdown();

        if !already {
            info!(coordinator = %self.name, "Coordinator shut down");
        }
    }

    pub(crate) fn status(&self) -> CoordinatorStatus {
        let state = self.lock_state();
        let last_error = state.refresh.last_error();

        CoordinatorStatus {
            name: self.name.clone(),
            last_update_success: state.refresh.last_update_success(),
            last_update_success_time: state.refresh.last_update_success_time(),
            last_error_kind: last_error.map(FetchError::kind),
            last_error: last_error.map(ToString::to_string),
            has_data: state.refresh.data().is_some(),
            listener_count: state.listeners.len(),
            update_interval_ms: self
                .scheduler
                .interval()
                .map(|interval| u64::try_from(interval.as_millis()).unwrap_or(u64::MAX)),
            refresh_armed: self.scheduler.is_armed(),
            shutdown_requested: self.is_shutdown(),
        }
    }

    fn health(&self) -> CycleHealth {
        CycleHealth::of(&self.lock_state().refresh)
    }

    fn log_failure(&self, err: &FetchError) {
        let name = &self.name;
        match err.kind() {
            FailureKind::Timeout => {
                error!(coordinator = %name, error = %err, "Timeout fetching data")
            }
            FailureKind::Transport => {
                error!(coordinator = %name, error = %err, "Error requesting data")
            }
            FailureKind::UpdateFailed => {
                error!(coordinator = %name, error = %err, "Error fetching data")
            }
            FailureKind::ConfigEntry => {
                error!(coordinator = %name, error = %err, "Config entry setup failed while fetching data")
            }
            FailureKind::AuthFailed => {
                error!(coordinator = %name, error = %err, "Authentication failed while fetching data")
            }
            FailureKind::Unknown => {
                error!(coordinator = %name, error = ?err, "Unexpected error fetching data")
            }
            FailureKind::NotImplemented => {}
        }
    }
}

// =============================================================================
// Refresh Cycle
// =============================================================================

impl<T, C> CoordinatorInner<T, C>
where
    T: Clone + PartialEq + Send + 'static,
    C: Clone + Send + 'static,
{
    /// Runs one refresh cycle.
    ///
    /// Recovered failures are stored and `Ok(())` is returned; only escalated
    /// failures come back as errors.
    pub(crate) async fn refresh_cycle(&self, options: RefreshOptions) -> CoordinatorResult<()> {
        self.run_cycle(options).await.map(|_| ())
    }

    /// The cycle itself. Listeners are notified before the single-flight
    /// lock is released, and the returned health is read under it.
    async fn run_cycle(&self, options: RefreshOptions) -> CoordinatorResult<CycleHealth> {
        let _in_flight = self.cycle_lock.lock().await;

        self.scheduler.disarm();
        self.debouncer.cancel();

        if self.is_shutdown() {
            debug!(coordinator = %self.name, trigger = %options.trigger, "Shutdown requested, refresh skipped");
            return Ok(self.health());
        }
        if options.is_scheduled() && self.host.is_stopping() {
            debug!(coordinator = %self.name, "Host stopping, scheduled refresh skipped");
            return Ok(self.health());
        }

        let started = self.timer.now();
        let result = match &self.source {
            Some(source) => source.fetch().await,
            None => Err(FetchError::NotImplemented("update method not implemented".into())),
        };

        let (report, error, has_listeners, health) = {
            let mut state = self.lock_state();
            let report = state.refresh.apply(result, Utc::now());
            let error = report
                .failure
                .and_then(|_| state.refresh.last_error().cloned());
            let health = CycleHealth::of(&state.refresh);
            (report, error, !state.listeners.is_empty(), health)
        };

        if let Some(err) = &error {
            if report.should_log_failure(options.log_failures) {
                self.log_failure(err);
            }
        }
        if report.recovered() {
            info!(coordinator = %self.name, "Fetching data recovered");
        }

        let decision = self
            .policy
            .decide(&report, &options, has_listeners, self.host.is_stopping());

        if decision.start_reauth {
            match &self.entry {
                Some(entry) => {
                    info!(coordinator = %self.name, entry = %entry.entry_id(), "Starting reauthentication");
                    entry.start_reauth();
                }
                None => warn!(coordinator = %self.name, "Authentication failed with no config entry to reauthenticate"),
            }
        }

        let elapsed = self.timer.now().saturating_duration_since(started);
        debug!(
            coordinator = %self.name,
            trigger = %options.trigger,
            elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            success = report.success,
            "Finished fetching data"
        );

        if decision.reschedule {
            self.schedule_refresh();
        }

        if let (Some(escalation), Some(err)) = (decision.escalate, error) {
            return Err(CoordinatorError::escalated(escalation, err));
        }

        if decision.notify {
            self.notify_listeners();
        }
        Ok(health)
    }

    /// First refresh of the initialization flow.
    ///
    /// Logs nothing on failure (the caller owns that messaging) and reports
    /// an unsuccessful cycle as [`CoordinatorError::NotReady`].
    pub(crate) async fn first_refresh(&self) -> CoordinatorResult<()> {
        let health = self.run_cycle(RefreshOptions::first_refresh()).await?;
        if health.success {
            return Ok(());
        }
        Err(CoordinatorError::NotReady {
            name: self.name.clone(),
            cause: health.error,
        })
    }

    /// Arms the refresh timer if scheduling is possible.
    pub(crate) fn schedule_refresh(&self) {
        let weak = self.weak_self.clone();
        self.scheduler.arm(move |generation| {
            Box::pin(async move {
                if let Some(inner) = weak.upgrade() {
                    inner.on_refresh_timer(generation).await;
                }
            })
        });
    }

    async fn on_refresh_timer(self: Arc<Self>, generation: u64) {
        if !self.scheduler.take_fired(generation) {
            return;
        }
        if let Err(err) = self.refresh_cycle(RefreshOptions::scheduled()).await {
            error!(
                coordinator = %self.name,
                error = %err,
                kind = ?err.fetch_error().map(FetchError::kind),
                "Scheduled refresh failed"
            );
        }
    }

    // =========================================================================
    // Manual Injection
    // =========================================================================

    /// Records an error without fetching. Notifies only on the flip into
    /// failure.
    pub(crate) fn set_update_error(&self, err: FetchError) {
        let flipped = self.lock_state().refresh.record_manual_error(err.clone());
        if flipped {
            error!(coordinator = %self.name, error = %err, "Error requesting data");
            self.notify_listeners();
        }
    }

    /// Stores data without fetching and always notifies.
    pub(crate) fn set_updated_data(&self, data: T) {
        self.scheduler.disarm();
        self.debouncer.cancel();

        let has_listeners = {
            let mut state = self.lock_state();
            state.refresh.record_manual_data(data, Utc::now());
            !state.listeners.is_empty()
        };
        debug!(coordinator = %self.name, "Manually updated data");

        if has_listeners {
            self.schedule_refresh();
        }
        self.notify_listeners();
    }

    // =========================================================================
    // Listeners
    // =========================================================================

    /// Registers a listener; the first one arms the scheduler.
    pub(crate) fn add_listener(&self, callback: ListenerCallback, context: Option<C>) -> ListenerId {
        let (id, first) = {
            let mut state = self.lock_state();
            let first = state.listeners.is_empty();
            (state.listeners.add(callback, context), first)
        };
        if first {
            self.schedule_refresh();
        }
        id
    }

    /// Registers the coordinator's shutdown with host stop hooks.
    pub(crate) fn register_shutdown(&self, hooks: Arc<dyn ShutdownHooks>) -> CoordinatorResult<()> {
        if self.entry.is_some() {
            return Err(CoordinatorError::EntryBound(self.name.clone()));
        }

        let weak = self.weak_self.clone();
        let id = hooks.register_on_stop(Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.shutdown();
            }
        }));

        let previous = self
            .stop_hook
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .replace((hooks, id));
        if let Some((hooks, id)) = previous {
            hooks.remove_on_stop(id);
        }
        Ok(())
    }
}

impl<T, C> ListenerOwner for CoordinatorInner<T, C>
where
    T: Send,
    C: Send,
{
    /// The last removal disarms the scheduler and drops any pending
    /// debounced refresh.
    fn remove_listener(&self, id: ListenerId) {
        let emptied = self.lock_state().listeners.remove(id);
        if emptied {
            self.scheduler.disarm();
            self.debouncer.cancel();
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
