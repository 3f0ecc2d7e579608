use crate::error::ApiError;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Notify;
use tracing::debug;

#[derive(Default)]
struct TokenInner {
    cancelled: AtomicBool,
    notify: Notify,
}

/// A cancellation token for cooperative cancellation.
#[derive(Clone, Default)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation and wake every waiter.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Tracks outstanding requests so they can all be cancelled on teardown.
///
/// A request that resolves after [`cancel_all`](Self::cancel_all) yields
/// [`ApiError::Canceled`] instead of its result.
#[derive(Clone, Default)]
pub struct RequestRegistry {
    token: CancellationToken,
    outstanding: Arc<AtomicUsize>,
}

impl RequestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn track<T, F>(&self, request: F) -> Result<T, ApiError>
    where
        F: Future<Output = Result<T, ApiError>>,
    {
        if self.token.is_cancelled() {
            return Err(ApiError::Canceled);
        }
        let _guard = InFlight::enter(&self.outstanding);
        tokio::select! {
            biased;
            _ = self.token.cancelled() => {
                debug!("Request canceled while outstanding");
                Err(ApiError::Canceled)
            }
            result = request => result,
        }
    }

    pub fn cancel_all(&self) {
        let outstanding = self.outstanding();
        self.token.cancel();
        debug!(outstanding, "Cancelled request registry");
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }
}
