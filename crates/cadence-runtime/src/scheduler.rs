//! # Refresh Scheduler
//!
//! Arms the next timer-driven refresh.
//!
//! ## Arming Rule
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   deadline = floor_secs(now) + jitter + update_interval                │
//! │                                                                         │
//! │   • "now" is the end of the previous cycle, so a slow fetch pushes     │
//! │     every later fire back (no fixed grid)                              │
//! │   • "now" is floored to whole seconds since the scheduler's origin,    │
//! │     so the jitter stays a fixed sub-second offset and never builds up  │
//! │   • jitter is drawn once per coordinator and never changes             │
//! │   • no interval, polling disabled, or shutdown => nothing is armed     │
//! │                                                                         │
//! │   arm()  ──► cancel previous ──► schedule job(generation N)            │
//! │   fire   ──► take_fired(N) detaches the handle, then runs the cycle    │
//! │   stale fire (generation != N) is ignored                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::host::{ConfigEntry, TimerHandle, TimerHost, TimerJob};

/// Draws a jitter offset uniformly from `[min_ms, max_ms]` with microsecond
/// resolution.
pub fn draw_jitter(min_ms: u64, max_ms: u64) -> Duration {
    let (low, high) = if min_ms <= max_ms {
        (min_ms, max_ms)
    } else {
        (max_ms, min_ms)
    };
    let micros = rand::thread_rng().gen_range(low * 1_000..=high * 1_000);
    Duration::from_micros(micros)
}

// =============================================================================
// Scheduler
// =============================================================================

/// Owns the single armed refresh timer of a coordinator.
pub struct Scheduler {
    name: String,
    timer: Arc<dyn TimerHost>,
    jitter: Duration,
    /// Whole-second grid the arming "now" is floored onto.
    origin: Instant,
    shutdown: Arc<AtomicBool>,
    entry: Option<Arc<dyn ConfigEntry>>,
    state: Mutex<SchedulerState>,
}

struct SchedulerState {
    interval: Option<Duration>,
    generation: u64,
    armed: Option<ArmedRefresh>,
}

struct ArmedRefresh {
    generation: u64,
    deadline: Instant,
    handle: TimerHandle,
}

impl Scheduler {
    pub fn new(
        name: impl Into<String>,
        timer: Arc<dyn TimerHost>,
        interval: Option<Duration>,
        jitter: Duration,
        shutdown: Arc<AtomicBool>,
        entry: Option<Arc<dyn ConfigEntry>>,
    ) -> Self {
        let origin = timer.now();
        Scheduler {
            name: name.into(),
            timer,
            jitter,
            origin,
            shutdown,
            entry,
            state: Mutex::new(SchedulerState {
                interval,
                generation: 0,
                armed: None,
            }),
        }
    }

    pub fn jitter(&self) -> Duration {
        self.jitter
    }

    pub fn interval(&self) -> Option<Duration> {
        self.lock_state().interval
    }

    /// Changes the interval. Takes effect the next time the timer is armed.
    pub fn set_interval(&self, interval: Option<Duration>) {
        self.lock_state().interval = interval;
    }

    /// Arms the refresh timer, replacing any armed one.
    ///
    /// `job` receives the generation of the new timer, which it must pass
    /// to [`Scheduler::take_fired`] when it runs. Returns false when nothing
    /// was armed.
    pub fn arm(&self, job: impl FnOnce(u64) -> TimerJob) -> bool {
        if self.shutdown.load(Ordering::SeqCst) {
            return false;
        }
        if self.entry.as_ref().is_some_and(|entry| entry.polling_disabled()) {
            debug!(coordinator = %self.name, "Polling disabled, refresh not scheduled");
            return false;
        }

        let mut state = self.lock_state();
        let Some(interval) = state.interval else {
            return false;
        };

        if let Some(previous) = state.armed.take() {
            previous.handle.cancel();
        }

        state.generation += 1;
        let generation = state.generation;
        let base = self.floor_to_second(self.timer.now());
        let Some(deadline) = self
            .jitter
            .checked_add(interval)
            .and_then(|offset| base.checked_add(offset))
        else {
            warn!(coordinator = %self.name, ?interval, "Update interval out of range, refresh not scheduled");
            return false;
        };
        let handle = self.timer.schedule_at(deadline, job(generation));

        state.armed = Some(ArmedRefresh {
            generation,
            deadline,
            handle,
        });
        true
    }

    /// Cancels the armed timer, if any.
    pub fn disarm(&self) {
        if let Some(armed) = self.lock_state().armed.take() {
            armed.handle.cancel();
        }
    }

    /// Called by a firing timer. Detaches it without cancelling and returns
    /// true if it is still the current one.
    pub fn take_fired(&self, generation: u64) -> bool {
        let mut state = self.lock_state();
        let current = state
            .armed
            .as_ref()
            .is_some_and(|armed| armed.generation == generation);
        if current {
            state.armed = None;
        }
        current
    }

    /// Deadline of the armed timer.
    pub fn next_refresh(&self) -> Option<Instant> {
        self.lock_state().armed.as_ref().map(|armed| armed.deadline)
    }

    pub fn is_armed(&self) -> bool {
        self.lock_state().armed.is_some()
    }

    /// Drops the sub-second part of `now`, measured from the origin.
    fn floor_to_second(&self, now: Instant) -> Instant {
        let elapsed = now.saturating_duration_since(self.origin);
        self.origin + Duration::from_secs(elapsed.as_secs())
    }

    fn lock_state(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("name", &self.name)
            .field("jitter", &self.jitter)
            .field("interval", &self.interval())
            .field("next_refresh", &self.next_refresh())
            .finish()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
