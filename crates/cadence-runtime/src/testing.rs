//! Shared fixtures for the runtime's unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cadence_core::{FetchError, FetchResult};

use crate::host::{ConfigEntry, StopCallback};
use crate::source::DataSource;

/// Listener that counts its invocations.
pub(crate) fn counter() -> (Arc<AtomicUsize>, impl Fn() + Send + Sync + 'static) {
    let count = Arc::new(AtomicUsize::new(0));
    let cb_count = count.clone();
    (count, move || {
        cb_count.fetch_add(1, Ordering::SeqCst);
    })
}

// =============================================================================
// Scripted Source
// =============================================================================

/// Source replaying a fixed list of results; the last one repeats forever.
pub(crate) struct ScriptedSource<T> {
    script: Mutex<VecDeque<FetchResult<T>>>,
    last: Mutex<Option<FetchResult<T>>>,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    in_flight_peak: Arc<AtomicUsize>,
}

impl<T> ScriptedSource<T> {
    pub(crate) fn new(script: Vec<FetchResult<T>>) -> Self {
        ScriptedSource {
            script: Mutex::new(script.into()),
            last: Mutex::new(None),
            delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            in_flight_peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Makes every fetch take `delay` of (virtual) time.
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }

    /// Highest number of fetches observed running at once.
    pub(crate) fn in_flight_peak(&self) -> Arc<AtomicUsize> {
        self.in_flight_peak.clone()
    }
}

#[async_trait]
impl<T: Clone + Send + 'static> DataSource<T> for ScriptedSource<T> {
    async fn fetch(&self) -> FetchResult<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.in_flight_peak.fetch_max(running, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.script.lock().unwrap().pop_front();
        let result = match next {
            Some(result) => {
                *self.last.lock().unwrap() = Some(result.clone());
                result
            }
            None => self
                .last
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| Err(FetchError::UpdateFailed("empty script".into()))),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

// =============================================================================
// Recording Config Entry
// =============================================================================

/// Config entry that records reauth requests and keeps unload callbacks.
#[derive(Default)]
pub(crate) struct RecordingEntry {
    reauth: AtomicUsize,
    polling_disabled: bool,
    unload: Mutex<Vec<StopCallback>>,
}

impl RecordingEntry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_polling_disabled() -> Self {
        RecordingEntry {
            polling_disabled: true,
            ..Self::default()
        }
    }

    pub(crate) fn reauth_count(&self) -> usize {
        self.reauth.load(Ordering::SeqCst)
    }

    /// Runs the registered unload callbacks.
    pub(crate) fn unload(&self) {
        let callbacks = std::mem::take(&mut *self.unload.lock().unwrap());
        for callback in callbacks {
            callback();
        }
    }
}

impl ConfigEntry for RecordingEntry {
    fn entry_id(&self) -> &str {
        "test-entry"
    }

    fn polling_disabled(&self) -> bool {
        self.polling_disabled
    }

    fn start_reauth(&self) {
        self.reauth.fetch_add(1, Ordering::SeqCst);
    }

    fn on_unload(&self, callback: StopCallback) {
        self.unload.lock().unwrap().push(callback);
    }
}
