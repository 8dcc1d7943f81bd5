//! # Host Capabilities
//!
//! Narrow interfaces through which a coordinator talks to whatever hosts it:
//! timers, the global stopping flag, shutdown hooks and the owning config
//! entry. Default tokio-backed implementations live here too.
//!
//! ## Capability Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   Coordinator ──► TimerHost        now(), schedule_at(deadline, job)   │
//! │       │           └─ TokioTimer    spawned sleep, cancel = abort        │
//! │       │                                                                 │
//! │       ├─────────► HostState        is_stopping()                       │
//! │       ├─────────► ShutdownHooks    register_on_stop / remove_on_stop   │
//! │       │           └─ HostLifecycle implements both                     │
//! │       │                                                                 │
//! │       └─────────► ConfigEntry      polling_disabled(), start_reauth(), │
//! │                                    on_unload(callback)                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use futures_util::future::BoxFuture;
use tokio::runtime::Handle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Work to run when a timer fires.
pub type TimerJob = BoxFuture<'static, ()>;

/// Callback run once when the host (or an entry) stops.
pub type StopCallback = Box<dyn FnOnce() + Send>;

// =============================================================================
// Timer Handle
// =============================================================================

/// Cancellable handle to a scheduled timer job.
///
/// Dropping the handle detaches the job without cancelling it; only
/// [`TimerHandle::cancel`] stops it.
pub struct TimerHandle {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl TimerHandle {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        TimerHandle {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A handle with nothing behind it.
    pub fn detached() -> Self {
        TimerHandle { cancel: None }
    }

    /// Cancels the job if it has not started running yet.
    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerHandle")
            .field("cancellable", &self.cancel.is_some())
            .finish()
    }
}

// =============================================================================
// Capability Traits
// =============================================================================

/// Monotonic clock plus one-shot scheduling.
pub trait TimerHost: Send + Sync {
    /// Current monotonic time.
    fn now(&self) -> Instant;

    /// Runs `job` at `deadline`.
    fn schedule_at(&self, deadline: Instant, job: TimerJob) -> TimerHandle;
}

/// Global state of the host process.
pub trait HostState: Send + Sync {
    /// True once the host has started shutting down.
    fn is_stopping(&self) -> bool;
}

/// Identifier of a registered stop hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HookId(u64);

/// Registry of callbacks to run when the host stops.
pub trait ShutdownHooks: Send + Sync {
    fn register_on_stop(&self, callback: StopCallback) -> HookId;

    /// Removes a hook that has not fired yet. Unknown ids are ignored.
    fn remove_on_stop(&self, id: HookId);
}

/// The collaborator-owned configuration a coordinator may be bound to.
pub trait ConfigEntry: Send + Sync {
    /// Identifier used in logs.
    fn entry_id(&self) -> &str;

    /// Scheduling is suppressed while this returns true. Manual refreshes
    /// still run.
    fn polling_disabled(&self) -> bool {
        false
    }

    /// Starts the reauthentication flow after credentials were rejected.
    fn start_reauth(&self);

    /// Registers a callback to run when the entry is unloaded.
    fn on_unload(&self, callback: StopCallback) {
        let _ = callback;
    }
}

// =============================================================================
// Tokio Timer
// =============================================================================

/// [`TimerHost`] backed by the ambient tokio runtime.
///
/// Each job is a spawned task sleeping until its deadline; cancelling aborts
/// the task.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioTimer;

impl TimerHost for TokioTimer {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn schedule_at(&self, deadline: Instant, job: TimerJob) -> TimerHandle {
        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                warn!("No tokio runtime available, timer not scheduled");
                return TimerHandle::detached();
            }
        };

        let task = runtime.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            job.await;
        });

        TimerHandle::new(move || task.abort())
    }
}

// =============================================================================
// Host Lifecycle
// =============================================================================

/// In-process host lifecycle: a stopping flag plus stop hooks.
#[derive(Default)]
pub struct HostLifecycle {
    stopping: AtomicBool,
    next_id: AtomicU64,
    hooks: Mutex<BTreeMap<HookId, StopCallback>>,
}

impl HostLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the host as stopping and runs every registered hook once, in
    /// registration order.
    pub fn stop(&self) {
        if self.stopping.swap(true, Ordering::SeqCst) {
            debug!("Host already stopping");
            return;
        }

        let hooks = std::mem::take(&mut *self.lock_hooks());
        info!(hooks = hooks.len(), "Host stopping, running stop hooks");

        for (_, hook) in hooks {
            hook();
        }
    }

    /// Number of hooks still waiting to run.
    pub fn pending_hooks(&self) -> usize {
        self.lock_hooks().len()
    }

    fn lock_hooks(&self) -> std::sync::MutexGuard<'_, BTreeMap<HookId, StopCallback>> {
        self.hooks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for HostLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostLifecycle")
            .field("stopping", &self.is_stopping())
            .field("pending_hooks", &self.pending_hooks())
            .finish()
    }
}

impl HostState for HostLifecycle {
    fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }
}

impl ShutdownHooks for HostLifecycle {
    fn register_on_stop(&self, callback: StopCallback) -> HookId {
        let id = HookId(self.next_id.fetch_add(1, Ordering::SeqCst));

        if self.is_stopping() {
            // Already stopped: run now instead of leaking the hook.
            callback();
            return id;
        }

        self.lock_hooks().insert(id, callback);
        id
    }

    fn remove_on_stop(&self, id: HookId) {
        self.lock_hooks().remove(&id);
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_lifecycle_runs_hooks_once() {
        let host = HostLifecycle::new();
        let fired = Arc::new(AtomicUsize::new(0));

        let counter = fired.clone();
        host.register_on_stop(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        assert!(!host.is_stopping());
        host.stop();
        host.stop();

        assert!(host.is_stopping());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(host.pending_hooks(), 0);
    }

    #[test]
    fn test_removed_hook_does_not_fire() {
        let host = HostLifecycle::new();
        let fired = Arc::new(AtomicUsize::new(0));

        let counter = fired.clone();
        let id = host.register_on_stop(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        host.remove_on_stop(id);
        host.stop();

        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_timer_fires_at_deadline() {
        let timer = TokioTimer;
        let fired = Arc::new(AtomicUsize::new(0));

        let counter = fired.clone();
        let _handle = timer.schedule_at(
            timer.now() + Duration::from_secs(5),
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_timer_cancel() {
        let timer = TokioTimer;
        let fired = Arc::new(AtomicUsize::new(0));

        let counter = fired.clone();
        let handle = timer.schedule_at(
            timer.now() + Duration::from_secs(1),
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        handle.cancel();

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
