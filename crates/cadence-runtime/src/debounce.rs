//! # Refresh Request Debouncer
//!
//! Collapses bursts of refresh requests into at most two executions: one
//! immediate (optional) and one trailing execution at the end of the cooldown.
//!
//! ## Timeline (immediate = true, cooldown = 10s)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  calls:     ▼  ▼ ▼   ▼                                                  │
//! │  time:   ───0──1─2───4────────────10────────────────20──────▶           │
//! │             │                     │                  │                  │
//! │           run now            trailing run         cooldown ends,       │
//! │           arm cooldown       (calls 1,2,4)        nothing pending      │
//! │                              arm cooldown                              │
//! │                                                                         │
//! │  A call while an execution is running is dropped: that execution is    │
//! │  already fetching fresh data.                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use cadence_core::{DEFAULT_REQUEST_REFRESH_COOLDOWN_MS, DEFAULT_REQUEST_REFRESH_IMMEDIATE};
use futures_util::future::BoxFuture;
use tracing::{debug, error, warn};

use crate::error::CoordinatorResult;
use crate::host::{TimerHandle, TimerHost};

/// The debounced action. Always "run a refresh cycle" for coordinators.
pub type DebouncedAction = Arc<dyn Fn() -> BoxFuture<'static, CoordinatorResult<()>> + Send + Sync>;

// =============================================================================
// Debounce Configuration
// =============================================================================

/// Cooldown window and leading-edge behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceConfig {
    pub cooldown: Duration,
    pub immediate: bool,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        DebounceConfig {
            cooldown: Duration::from_millis(DEFAULT_REQUEST_REFRESH_COOLDOWN_MS),
            immediate: DEFAULT_REQUEST_REFRESH_IMMEDIATE,
        }
    }
}

// =============================================================================
// Debouncer
// =============================================================================

/// Coalesces calls to a single async action.
#[derive(Clone)]
pub struct Debouncer {
    shared: Arc<Shared>,
}

struct Shared {
    name: String,
    config: DebounceConfig,
    timer: Arc<dyn TimerHost>,
    action: DebouncedAction,
    state: Mutex<DebounceState>,
    /// Held for the duration of one execution.
    execute_lock: tokio::sync::Mutex<()>,
}

#[derive(Default)]
struct DebounceState {
    armed: Option<ArmedTimer>,
    generation: u64,
    execute_at_end: bool,
    shutdown: bool,
}

struct ArmedTimer {
    generation: u64,
    handle: TimerHandle,
}

impl Debouncer {
    pub fn new(
        name: impl Into<String>,
        config: DebounceConfig,
        timer: Arc<dyn TimerHost>,
        action: DebouncedAction,
    ) -> Self {
        Debouncer {
            shared: Arc::new(Shared {
                name: name.into(),
                config,
                timer,
                action,
                state: Mutex::new(DebounceState::default()),
                execute_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn config(&self) -> DebounceConfig {
        self.shared.config
    }

    /// Requests an execution.
    ///
    /// Returns the result of the action only when it ran immediately as part
    /// of this call; trailing executions log their own errors.
    pub async fn call(&self) -> CoordinatorResult<()> {
        {
            let mut state = self.shared.lock_state();

            if state.shutdown {
                warn!(debouncer = %self.shared.name, "Debouncer call ignored after shutdown");
                return Ok(());
            }

            // Cooldown active: fold this call into the trailing execution.
            if state.armed.is_some() {
                state.execute_at_end = true;
                return Ok(());
            }

            if self.shared.execute_lock.try_lock().is_err() {
                debug!(debouncer = %self.shared.name, "Execution in progress, call dropped");
                return Ok(());
            }

            if !self.shared.config.immediate {
                state.execute_at_end = true;
                self.shared.schedule_timer(&mut state);
                return Ok(());
            }
        }

        let Ok(_running) = self.shared.execute_lock.try_lock() else {
            return Ok(());
        };

        // A timer armed while we were acquiring the lock wins.
        let armed = self.shared.lock_state().armed.is_some();
        if armed {
            return Ok(());
        }

        let result = (self.shared.action)().await;

        let mut state = self.shared.lock_state();
        self.shared.schedule_timer(&mut state);

        result
    }

    /// Drops any pending trailing execution. A running execution continues.
    pub fn cancel(&self) {
        self.shared.lock_state().cancel();
    }

    /// Cancels pending work and makes the debouncer permanently inert.
    pub fn shutdown(&self) {
        let mut state = self.shared.lock_state();
        state.shutdown = true;
        state.cancel();
    }

    /// True while a cooldown timer is armed.
    pub fn is_armed(&self) -> bool {
        self.shared.lock_state().armed.is_some()
    }

    /// True if a trailing execution will run when the cooldown ends.
    pub fn has_pending_call(&self) -> bool {
        self.shared.lock_state().execute_at_end
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.lock_state().shutdown
    }
}

impl fmt::Debug for Debouncer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Debouncer")
            .field("name", &self.shared.name)
            .field("config", &self.shared.config)
            .field("armed", &self.is_armed())
            .finish()
    }
}

impl DebounceState {
    fn cancel(&mut self) {
        self.execute_at_end = false;
        if let Some(armed) = self.armed.take() {
            armed.handle.cancel();
        }
    }
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, DebounceState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn schedule_timer(self: &Arc<Self>, state: &mut DebounceState) {
        if state.shutdown {
            return;
        }

        state.generation += 1;
        let generation = state.generation;
        let weak: Weak<Shared> = Arc::downgrade(self);
        let deadline = self.timer.now() + self.config.cooldown;

        let handle = self.timer.schedule_at(
            deadline,
            Box::pin(async move {
                if let Some(shared) = weak.upgrade() {
                    shared.on_cooldown_end(generation).await;
                }
            }),
        );

        if let Some(previous) = state.armed.replace(ArmedTimer { generation, handle }) {
            previous.handle.cancel();
        }
    }

    async fn on_cooldown_end(self: Arc<Self>, generation: u64) {
        {
            let mut state = self.lock_state();
            match &state.armed {
                Some(armed) if armed.generation == generation => {}
                _ => return,
            }
            // Detach ourselves; the action may cancel the debouncer.
            state.armed = None;

            if !state.execute_at_end {
                return;
            }
            state.execute_at_end = false;
        }

        let Ok(_running) = self.execute_lock.try_lock() else {
            return;
        };

        let armed = self.lock_state().armed.is_some();
        if armed {
            return;
        }

        if let Err(err) = (self.action)().await {
            error!(debouncer = %self.name, error = %err, "Unexpected error from debounced refresh");
        }

        let mut state = self.lock_state();
        self.schedule_timer(&mut state);
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoordinatorError;
    use futures_util::FutureExt;
    use crate::host::TokioTimer;
    use cadence_core::FetchError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_action(count: Arc<AtomicUsize>) -> DebouncedAction {
        Arc::new(move || {
            let count = count.clone();
            async move {
                count.fetch_add(1, Ordering::SeqCst);
                Ok::<_, CoordinatorError>(())
            }
            .boxed()
        })
    }

    fn debouncer(immediate: bool, action: DebouncedAction) -> Debouncer {
        Debouncer::new(
            "test",
            DebounceConfig {
                cooldown: Duration::from_secs(10),
                immediate,
            },
            Arc::new(TokioTimer),
            action,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_runs_at_most_twice() {
        let count = Arc::new(AtomicUsize::new(0));
        let debouncer = debouncer(true, counting_action(count.clone()));

        for _ in 0..5 {
            debouncer.call().await.unwrap();
        }
        assert_eq!(count.load(Ordering::SeqCst), 1, "leading edge runs once");
        assert!(debouncer.has_pending_call());

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2, "trailing edge runs once");

        // The trailing run re-armed the cooldown, but nothing is pending.
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert!(!debouncer.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_call_has_no_trailing_run() {
        let count = Arc::new(AtomicUsize::new(0));
        let debouncer = debouncer(true, counting_action(count.clone()));

        debouncer.call().await.unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_immediate_waits_for_cooldown() {
        let count = Arc::new(AtomicUsize::new(0));
        let debouncer = debouncer(false, counting_action(count.clone()));

        debouncer.call().await.unwrap();
        debouncer.call().await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_drops_trailing_run() {
        let count = Arc::new(AtomicUsize::new(0));
        let debouncer = debouncer(true, counting_action(count.clone()));

        debouncer.call().await.unwrap();
        debouncer.call().await.unwrap();
        debouncer.cancel();

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!debouncer.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_is_terminal() {
        let count = Arc::new(AtomicUsize::new(0));
        let debouncer = debouncer(true, counting_action(count.clone()));

        debouncer.shutdown();
        debouncer.call().await.unwrap();
        tokio::time::sleep(Duration::from_secs(11)).await;

        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(debouncer.is_shut_down());
        assert!(!debouncer.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_during_execution_is_dropped() {
        let count = Arc::new(AtomicUsize::new(0));
        let action_count = count.clone();
        let action: DebouncedAction = Arc::new(move || {
            let count = action_count.clone();
            async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                count.fetch_add(1, Ordering::SeqCst);
                Ok::<_, CoordinatorError>(())
            }
            .boxed()
        });
        let debouncer = debouncer(true, action);

        let first = tokio::spawn({
            let debouncer = debouncer.clone();
            async move { debouncer.call().await }
        });
        tokio::task::yield_now().await;

        debouncer.call().await.unwrap();
        first.await.unwrap().unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!debouncer.has_pending_call());
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_error_propagates_trailing_error_is_logged() {
        let count = Arc::new(AtomicUsize::new(0));
        let action_count = count.clone();
        let action: DebouncedAction = Arc::new(move || {
            let count = action_count.clone();
            async move {
                count.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(CoordinatorError::Fatal(FetchError::NotImplemented("no update method".into())))
            }
            .boxed()
        });
        let debouncer = debouncer(true, action);

        assert!(debouncer.call().await.unwrap_err().is_fatal());
        // Cooldown still armed after a failed execution.
        assert!(debouncer.is_armed());

        debouncer.call().await.unwrap();
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
