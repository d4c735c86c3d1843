//! Async resources.
//!
//! A resource wraps a fetcher returning a future and exposes the result as
//! reactive state: `value`, `loading`, and `error` are ordinary signals, so
//! effects and memos reading a resource react to fetch completion like any
//! other dependency change.
//!
//! Already-completed futures commit synchronously. Pending futures are
//! spawned on the ambient tokio runtime; each fetch carries a generation
//! number and only the most recent in-flight fetch may commit, so an older
//! fetch resolving late is discarded rather than clobbering newer data.

use std::fmt::Debug;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::future::BoxFuture;
use futures_util::task::noop_waker;
use thiserror::Error;
use tracing::{debug, trace};

use super::equality::ReactiveEq;
use super::runtime::batch;
use super::signal::Signal;

/// Failure of a resource fetch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceError {
    /// The fetcher itself failed; carries its message.
    #[error("fetch failed: {0}")]
    Fetch(String),
    /// The fetcher returned a pending future but no tokio runtime is
    /// available to drive it.
    #[error("no async runtime available to drive the fetch")]
    NoRuntime,
}

impl ReactiveEq for ResourceError {
    fn reactive_eq(&self, other: &Self) -> bool {
        self == other
    }
}

type Fetcher<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T, ResourceError>> + Send + Sync>;

/// An async-aware signal wrapping a promise-returning fetcher.
///
/// # Example
///
/// ```rust,ignore
/// let user = Resource::new(|| Box::pin(async { fetch_user(1).await }));
///
/// let user_clone = user.clone();
/// Effect::new(move || {
///     if user_clone.loading() {
///         return;
///     }
///     match user_clone.get() {
///         Ok(value) => render(value),
///         Err(err) => render_error(err),
///     }
/// });
/// ```
pub struct Resource<T>
where
    T: Clone + Send + Sync + 'static,
{
    inner: Arc<ResourceInner<T>>,
}

struct ResourceInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    fetcher: Fetcher<T>,
    value: Signal<Option<T>>,
    error: Signal<Option<ResourceError>>,
    loading: Signal<bool>,
    /// Monotonically increasing fetch generation; only the latest commits.
    generation: AtomicU64,
}

impl<T> Resource<T>
where
    T: Clone + Send + Sync + ReactiveEq + 'static,
{
    /// Create a resource and start its first fetch immediately.
    pub fn new<F, Fut>(fetcher: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ResourceError>> + Send + 'static,
    {
        let inner = Arc::new(ResourceInner {
            fetcher: Arc::new(move || Box::pin(fetcher()) as BoxFuture<'static, _>),
            value: Signal::new(None),
            error: Signal::new(None),
            loading: Signal::new(false),
            generation: AtomicU64::new(0),
        });
        let resource = Self { inner };
        resource.refresh();
        resource
    }

    /// The last successful value, or the captured error if the most recent
    /// fetch failed. Tracked like any signal read.
    pub fn get(&self) -> Result<Option<T>, ResourceError> {
        if let Some(error) = self.inner.error.get() {
            return Err(error);
        }
        Ok(self.inner.value.get())
    }

    /// Whether a fetch is currently in flight. Tracked.
    pub fn loading(&self) -> bool {
        self.inner.loading.get()
    }

    /// The captured error of the most recent fetch, if any. Tracked.
    pub fn error(&self) -> Option<ResourceError> {
        self.inner.error.get()
    }

    /// Start a new fetch, superseding any fetch still in flight.
    pub fn refresh(&self) {
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        batch(|| {
            self.inner.loading.set(true);
            self.inner.error.set(None);
        });

        let mut future = (self.inner.fetcher)();

        // Fast path: a fetcher producing an already-ready future commits
        // synchronously, no runtime needed.
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        match future.as_mut().poll(&mut cx) {
            Poll::Ready(result) => {
                self.inner.commit(generation, result);
            }
            Poll::Pending => match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let inner = self.inner.clone();
                    handle.spawn(async move {
                        let result = future.await;
                        inner.commit(generation, result);
                    });
                }
                Err(_) => {
                    self.inner.commit(generation, Err(ResourceError::NoRuntime));
                }
            },
        }
    }
}

impl<T> ResourceInner<T>
where
    T: Clone + Send + Sync + ReactiveEq + 'static,
{
    fn commit(&self, generation: u64, result: Result<T, ResourceError>) {
        if self.generation.load(Ordering::SeqCst) != generation {
            trace!(generation, "discarding out-of-date fetch result");
            return;
        }
        debug!(generation, ok = result.is_ok(), "resource commit");
        batch(|| {
            match result {
                Ok(value) => {
                    self.value.set(Some(value));
                    self.error.set(None);
                }
                Err(error) => {
                    self.error.set(Some(error));
                }
            }
            self.loading.set(false);
        });
    }
}

impl<T> Clone for Resource<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Debug for Resource<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resource")
            .field("loading", &self.inner.loading.get_untracked())
            .field("value", &self.inner.value.get_untracked())
            .field("error", &self.inner.error.get_untracked())
            .finish()
    }
}

/// Create a resource and start its first fetch.
pub fn create_resource<T, F, Fut>(fetcher: F) -> Resource<T>
where
    T: Clone + Send + Sync + ReactiveEq + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, ResourceError>> + Send + 'static,
{
    Resource::new(fetcher)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_future_commits_synchronously() {
        let resource = Resource::new(|| async { Ok(42) });

        assert!(!resource.loading());
        assert_eq!(resource.get(), Ok(Some(42)));
        assert_eq!(resource.error(), None);
    }

    #[test]
    fn failed_fetch_surfaces_on_read() {
        let resource: Resource<i32> =
            Resource::new(|| async { Err(ResourceError::Fetch("boom".into())) });

        assert!(!resource.loading());
        assert_eq!(resource.get(), Err(ResourceError::Fetch("boom".into())));
    }

    #[test]
    fn pending_future_without_runtime_reports_no_runtime() {
        let resource: Resource<i32> = Resource::new(|| async {
            futures_util::future::pending::<()>().await;
            Ok(1)
        });

        assert_eq!(resource.get(), Err(ResourceError::NoRuntime));
    }

    #[tokio::test]
    async fn pending_future_commits_on_runtime() {
        let resource = Resource::new(|| async {
            tokio::task::yield_now().await;
            Ok(7)
        });

        assert!(resource.loading());
        // Let the spawned fetch task run.
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(!resource.loading());
        assert_eq!(resource.get(), Ok(Some(7)));
    }

    #[tokio::test]
    async fn stale_fetch_is_discarded() {
        use tokio::sync::Semaphore;

        // First fetch blocks until released; second resolves immediately.
        let gate = Arc::new(Semaphore::new(0));
        let generation = Arc::new(AtomicU64::new(0));

        let gate_clone = gate.clone();
        let generation_clone = generation.clone();
        let resource = Resource::new(move || {
            let round = generation_clone.fetch_add(1, Ordering::SeqCst);
            let gate = gate_clone.clone();
            async move {
                if round == 0 {
                    let _permit = gate.acquire().await;
                    Ok(1)
                } else {
                    Ok(2)
                }
            }
        });

        resource.refresh();
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(resource.get(), Ok(Some(2)));

        // Release the first fetch; its late result must not clobber.
        gate.add_permits(1);
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(resource.get(), Ok(Some(2)));
    }

    #[test]
    fn refresh_clears_previous_error() {
        let attempts = Arc::new(AtomicU64::new(0));

        let attempts_clone = attempts.clone();
        let resource = Resource::new(move || {
            let attempt = attempts_clone.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 0 {
                    Err(ResourceError::Fetch("first".into()))
                } else {
                    Ok(9)
                }
            }
        });

        assert!(resource.get().is_err());

        resource.refresh();
        assert_eq!(resource.get(), Ok(Some(9)));
        assert_eq!(resource.error(), None);
    }
}
