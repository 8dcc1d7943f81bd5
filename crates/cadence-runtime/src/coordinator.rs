//! # Coordinator
//!
//! The handle collaborators hold. Cheap to clone; every clone drives the
//! same schedule, data and listener set.
//!
//! ## Trigger Routing
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  timer fires ──────────────► handle_refresh_interval ──┐               │
//! │  refresh() ────────────────────────────────────────────┤               │
//! │  config_entry_first_refresh() ─────────────────────────┼─► cycle       │
//! │  request_refresh() ──► Debouncer (cooldown) ───────────┘               │
//! │                                                                         │
//! │  add_listener (first) ──► Scheduler::arm                              │
//! │  unsubscribe (last) ────► Scheduler::disarm + Debouncer::cancel       │
//! │  set_updated_data / set_update_error ──► state + notify (no fetch)    │
//! │  shutdown() ─────────────► disarm, debouncer inert, unhook; terminal  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use cadence_core::{
    CoordinatorStatus, FetchError, ListenerId, ListenerRegistry, RefreshOptions, RefreshPolicy,
    RefreshState, DEFAULT_JITTER_MAX_MS, DEFAULT_JITTER_MIN_MS,
};
use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use tokio::time::Instant;
use tracing::debug;

use crate::config::CadenceConfig;
use crate::debounce::{DebounceConfig, DebouncedAction, Debouncer};
use crate::engine::{CoordinatorInner, ListenerOwner, SharedState};
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::host::{ConfigEntry, HostLifecycle, HostState, ShutdownHooks, TimerHost, TokioTimer};
use crate::scheduler::{draw_jitter, Scheduler};
use crate::source::{fetch_fn, DataSource};

// =============================================================================
// Subscription
// =============================================================================

/// Handle returned by [`Coordinator::add_listener`].
///
/// Dropping it leaves the listener registered; call
/// [`Subscription::unsubscribe`] to remove it.
#[derive(Clone)]
pub struct Subscription {
    id: ListenerId,
    owner: Weak<dyn ListenerOwner>,
}

impl Subscription {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Removes the listener. Safe to call more than once, and a no-op once
    /// the coordinator is gone.
    pub fn unsubscribe(&self) {
        if let Some(owner) = self.owner.upgrade() {
            owner.remove_listener(self.id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

// =============================================================================
// Coordinator
// =============================================================================

/// Periodic refresh coordinator for one data source.
///
/// `T` is the fetched value; `C` is an optional per-listener context the
/// coordinator stores for collaborators but never inspects.
pub struct Coordinator<T, C = ()> {
    inner: Arc<CoordinatorInner<T, C>>,
}

impl<T, C> Clone for Coordinator<T, C> {
    fn clone(&self) -> Self {
        Coordinator {
            inner: self.inner.clone(),
        }
    }
}

impl<T, C> fmt::Debug for Coordinator<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coordinator")
            .field("name", &self.inner.name)
            .field("scheduler", &self.inner.scheduler)
            .field("shutdown_requested", &self.inner.is_shutdown())
            .finish()
    }
}

impl<T, C> Coordinator<T, C>
where
    T: Clone + PartialEq + Send + 'static,
    C: Clone + Send + 'static,
{
    /// Starts building a coordinator.
    pub fn builder(name: impl Into<String>) -> CoordinatorBuilder<T, C> {
        CoordinatorBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    // =========================================================================
    // Listeners
    // =========================================================================

    /// Registers a listener. The first listener arms the refresh timer.
    pub fn add_listener(&self, callback: impl Fn() + Send + Sync + 'static) -> Subscription {
        self.subscribe(Arc::new(callback), None)
    }

    /// Registers a listener carrying an opaque context.
    pub fn add_listener_with_context(
        &self,
        callback: impl Fn() + Send + Sync + 'static,
        context: C,
    ) -> Subscription {
        self.subscribe(Arc::new(callback), Some(context))
    }

    fn subscribe(&self, callback: cadence_core::ListenerCallback, context: Option<C>) -> Subscription {
        let id = self.inner.add_listener(callback, context);
        let owner: Weak<CoordinatorInner<T, C>> = Arc::downgrade(&self.inner);
        Subscription { id, owner }
    }

    /// Contexts of all listeners that registered one.
    pub fn contexts(&self) -> Vec<C> {
        self.inner.lock_state().listeners.contexts().cloned().collect()
    }

    pub fn listener_count(&self) -> usize {
        self.inner.lock_state().listeners.len()
    }

    // =========================================================================
    // State Accessors
    // =========================================================================

    /// Last successfully fetched (or injected) value.
    pub fn data(&self) -> Option<T> {
        self.inner.lock_state().refresh.data().cloned()
    }

    pub fn last_update_success(&self) -> bool {
        self.inner.lock_state().refresh.last_update_success()
    }

    pub fn last_error(&self) -> Option<FetchError> {
        self.inner.lock_state().refresh.last_error().cloned()
    }

    pub fn last_update_success_time(&self) -> Option<DateTime<Utc>> {
        self.inner.lock_state().refresh.last_update_success_time()
    }

    pub fn update_interval(&self) -> Option<Duration> {
        self.inner.scheduler.interval()
    }

    /// Changes the polling interval; applies from the next arm.
    pub fn set_update_interval(&self, interval: Option<Duration>) {
        self.inner.scheduler.set_interval(interval);
    }

    /// Fixed offset added to every scheduled fire time.
    pub fn jitter(&self) -> Duration {
        self.inner.scheduler.jitter()
    }

    /// When the armed refresh timer will fire.
    pub fn next_refresh(&self) -> Option<Instant> {
        self.inner.scheduler.next_refresh()
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.is_shutdown()
    }

    pub fn status(&self) -> CoordinatorStatus {
        self.inner.status()
    }

    // =========================================================================
    // Refresh Entry Points
    // =========================================================================

    /// Refreshes now, bypassing the debouncer.
    pub async fn refresh(&self) -> CoordinatorResult<()> {
        self.inner.refresh_cycle(RefreshOptions::requested()).await
    }

    /// Requests a refresh through the debouncer.
    pub async fn request_refresh(&self) -> CoordinatorResult<()> {
        self.inner.debouncer.call().await
    }

    /// First refresh during setup. Fails with [`CoordinatorError::NotReady`]
    /// when the data could not be fetched.
    pub async fn config_entry_first_refresh(&self) -> CoordinatorResult<()> {
        self.inner.first_refresh().await
    }

    /// Runs the cycle a timer fire would run. Programmer errors propagate.
    pub async fn handle_refresh_interval(&self) -> CoordinatorResult<()> {
        self.inner.refresh_cycle(RefreshOptions::scheduled()).await
    }

    // =========================================================================
    // Manual Injection
    // =========================================================================

    /// Records an error without fetching.
    pub fn set_update_error(&self, err: FetchError) {
        self.inner.set_update_error(err);
    }

    /// Stores data without fetching.
    pub fn set_updated_data(&self, data: T) {
        self.inner.set_updated_data(data);
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Shuts the coordinator down when the host stops. Only for
    /// coordinators not bound to a config entry.
    pub fn register_shutdown(&self, hooks: Arc<dyn ShutdownHooks>) -> CoordinatorResult<()> {
        self.inner.register_shutdown(hooks)
    }

    /// Stops all scheduling for good.
    pub fn shutdown(&self) {
        self.inner.shutdown();
    }
}

// =============================================================================
// Builder Pattern
// =============================================================================

/// Builder for [`Coordinator`].
pub struct CoordinatorBuilder<T, C = ()> {
    name: String,
    source: Option<Arc<dyn DataSource<T>>>,
    update_interval: Option<Duration>,
    jitter: Option<Duration>,
    jitter_range: (u64, u64),
    policy: RefreshPolicy,
    debounce: DebounceConfig,
    timer: Option<Arc<dyn TimerHost>>,
    host: Option<Arc<dyn HostState>>,
    entry: Option<Arc<dyn ConfigEntry>>,
    _context: PhantomData<fn() -> C>,
}

impl<T, C> CoordinatorBuilder<T, C>
where
    T: Clone + PartialEq + Send + 'static,
    C: Clone + Send + 'static,
{
    pub fn new(name: impl Into<String>) -> Self {
        CoordinatorBuilder {
            name: name.into(),
            source: None,
            update_interval: None,
            jitter: None,
            jitter_range: (DEFAULT_JITTER_MIN_MS, DEFAULT_JITTER_MAX_MS),
            policy: RefreshPolicy::default(),
            debounce: DebounceConfig::default(),
            timer: None,
            host: None,
            entry: None,
            _context: PhantomData,
        }
    }

    /// Applies every setting from a loaded configuration.
    pub fn from_config(config: &CadenceConfig) -> Self {
        Self::new(config.coordinator.name.clone())
            .with_update_interval(config.update_interval())
            .with_jitter_range(config.jitter.min_ms, config.jitter.max_ms)
            .with_always_update(config.coordinator.always_update)
            .with_reschedule_on_auth_failure(config.coordinator.reschedule_on_auth_failure)
            .with_request_refresh_cooldown(config.cooldown())
            .with_request_refresh_immediate(config.debounce.immediate)
    }

    /// Sets the data source.
    pub fn with_source(mut self, source: impl DataSource<T> + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Sets the data source from an async closure.
    pub fn with_fetch_fn<F, Fut>(self, fetch: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = cadence_core::FetchResult<T>> + Send + 'static,
    {
        self.with_source(fetch_fn(fetch))
    }

    /// Sets the polling interval. `None` disables scheduling.
    pub fn with_update_interval(mut self, interval: Option<Duration>) -> Self {
        self.update_interval = interval;
        self
    }

    /// Uses a fixed jitter instead of drawing one.
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = Some(jitter);
        self
    }

    /// Range the jitter is drawn from, in milliseconds.
    pub fn with_jitter_range(mut self, min_ms: u64, max_ms: u64) -> Self {
        self.jitter_range = (min_ms, max_ms);
        self
    }

    pub fn with_always_update(mut self, always_update: bool) -> Self {
        self.policy.always_update = always_update;
        self
    }

    pub fn with_reschedule_on_auth_failure(mut self, reschedule: bool) -> Self {
        self.policy.reschedule_on_auth_failure = reschedule;
        self
    }

    pub fn with_request_refresh_cooldown(mut self, cooldown: Duration) -> Self {
        self.debounce.cooldown = cooldown;
        self
    }

    pub fn with_request_refresh_immediate(mut self, immediate: bool) -> Self {
        self.debounce.immediate = immediate;
        self
    }

    /// Sets the timer capability. Defaults to [`TokioTimer`].
    pub fn with_timer(mut self, timer: Arc<dyn TimerHost>) -> Self {
        self.timer = Some(timer);
        self
    }

    /// Sets the host state. Defaults to a host that never stops.
    pub fn with_host(mut self, host: Arc<dyn HostState>) -> Self {
        self.host = Some(host);
        self
    }

    /// Binds the coordinator to a config entry. The coordinator shuts down
    /// when the entry unloads.
    pub fn with_config_entry(mut self, entry: Arc<dyn ConfigEntry>) -> Self {
        self.entry = Some(entry);
        self
    }

    /// Builds the coordinator.
    pub fn build(self) -> CoordinatorResult<Coordinator<T, C>> {
        if self.name.trim().is_empty() {
            return Err(CoordinatorError::InvalidConfig(
                "coordinator name must not be empty".into(),
            ));
        }
        if self.update_interval == Some(Duration::ZERO) {
            return Err(CoordinatorError::InvalidConfig(
                "update interval must be greater than zero".into(),
            ));
        }
        let (min_ms, max_ms) = self.jitter_range;
        if min_ms > max_ms {
            return Err(CoordinatorError::InvalidConfig(format!(
                "jitter range {}..{}ms is empty",
                min_ms, max_ms
            )));
        }

        let jitter = self.jitter.unwrap_or_else(|| draw_jitter(min_ms, max_ms));
        let timer = self.timer.unwrap_or_else(|| Arc::new(TokioTimer));
        let host = self.host.unwrap_or_else(|| Arc::new(HostLifecycle::new()));
        let shutdown_requested = Arc::new(AtomicBool::new(false));

        let CoordinatorBuilder {
            name,
            source,
            update_interval,
            policy,
            debounce,
            entry,
            ..
        } = self;

        let inner = Arc::new_cyclic(|weak: &Weak<CoordinatorInner<T, C>>| {
            let target = weak.clone();
            let action: DebouncedAction = Arc::new(move || {
                let target = target.clone();
                async move {
                    match target.upgrade() {
                        Some(inner) => inner.refresh_cycle(RefreshOptions::requested()).await,
                        None => Ok(()),
                    }
                }
                .boxed()
            });

            CoordinatorInner {
                scheduler: Scheduler::new(
                    name.clone(),
                    timer.clone(),
                    update_interval,
                    jitter,
                    shutdown_requested.clone(),
                    entry.clone(),
                ),
                debouncer: Debouncer::new(name.clone(), debounce, timer.clone(), action),
                name,
                source,
                policy,
                timer,
                host,
                entry,
                shutdown_requested,
                state: Mutex::new(SharedState {
                    refresh: RefreshState::new(),
                    listeners: ListenerRegistry::new(),
                }),
                stop_hook: Mutex::new(None),
                cycle_lock: tokio::sync::Mutex::new(()),
                weak_self: weak.clone(),
            }
        });

        if let Some(entry) = &inner.entry {
            let weak = Arc::downgrade(&inner);
            entry.on_unload(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.shutdown();
                }
            }));
        }

        debug!(
            coordinator = %inner.name,
            interval = ?inner.scheduler.interval(),
            jitter_ms = u64::try_from(inner.scheduler.jitter().as_millis()).unwrap_or(u64::MAX),
            "Coordinator created"
        );

        Ok(Coordinator { inner })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
