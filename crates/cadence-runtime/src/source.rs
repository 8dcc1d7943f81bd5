//! # Data Sources
//!
//! The fetch side of a coordinator. A source is invoked at most once per
//! cycle and reports failures through the [`FetchError`] taxonomy.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use cadence_core::{FetchError, FetchResult};

/// Something a coordinator can fetch `T` from.
#[async_trait]
pub trait DataSource<T>: Send + Sync {
    /// Fetches the current value.
    async fn fetch(&self) -> FetchResult<T>;
}

// =============================================================================
// Closure Adapter
// =============================================================================

/// [`DataSource`] built from an async closure. See [`fetch_fn`].
pub struct FnSource<F> {
    fetch: F,
}

/// Wraps an async closure as a [`DataSource`].
///
/// ```rust
/// use cadence_core::FetchError;
/// use cadence_runtime::fetch_fn;
///
/// let source = fetch_fn(|| async { Ok::<u32, FetchError>(21) });
/// # let _ = source;
/// ```
pub fn fetch_fn<T, F, Fut>(fetch: F) -> FnSource<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = FetchResult<T>> + Send + 'static,
{
    FnSource { fetch }
}

#[async_trait]
impl<T, F, Fut> DataSource<T> for FnSource<F>
where
    T: Send + 'static,
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = FetchResult<T>> + Send + 'static,
{
    async fn fetch(&self) -> FetchResult<T> {
        (self.fetch)().await
    }
}

// =============================================================================
// Deadlines
// =============================================================================

/// Runs a fetch with a deadline, reporting expiry as [`FetchError::Timeout`].
///
/// The coordinator never imposes a deadline itself; sources opt in.
pub async fn with_deadline<T, Fut>(deadline: Duration, fetch: Fut) -> FetchResult<T>
where
    Fut: Future<Output = FetchResult<T>>,
{
    match tokio::time::timeout(deadline, fetch).await {
        Ok(result) => result,
        Err(_) => Err(FetchError::Timeout(format!(
            "no response within {}ms",
            deadline.as_millis()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::FailureKind;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_fetch_fn_invokes_closure() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let source = fetch_fn(move || {
            let counter = counter.clone();
            async move { Ok::<u32, FetchError>(counter.fetch_add(1, Ordering::SeqCst) + 1) }
        });

        assert_eq!(source.fetch().await.unwrap(), 1);
        assert_eq!(source.fetch().await.unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_deadline_times_out() {
        let result: FetchResult<u32> = with_deadline(Duration::from_secs(10), async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(1)
        })
        .await;

        assert_eq!(result.unwrap_err().kind(), FailureKind::Timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_deadline_passes_through() {
        let result = with_deadline(Duration::from_secs(10), async {
            Err::<u32, _>(FetchError::UpdateFailed("maintenance".into()))
        })
        .await;

        assert_eq!(result.unwrap_err().kind(), FailureKind::UpdateFailed);
    }
}
