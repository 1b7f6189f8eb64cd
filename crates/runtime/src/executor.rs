use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use futures_util::future::{select, Either};

/// Boxed future for single-threaded execution (no `Send` bound).
pub type LocalBoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

/// Cooperative, single-threaded task host.
///
/// The browser build spawns onto the page's microtask queue; native builds use
/// a tokio `LocalSet`.
pub trait Executor {
    fn spawn(&self, task: LocalBoxFuture<'static, ()>);

    /// Resolve after `duration`. A zero duration still yields once.
    fn pause(&self, duration: Duration) -> LocalBoxFuture<'static, ()>;
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Elapsed(pub Duration);

impl std::fmt::Display for Elapsed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "timed out after {} ms", self.0.as_millis())
    }
}

impl std::error::Error for Elapsed {}

/// Await `fut`, giving up after `limit` when one is set.
pub async fn with_timeout<T>(
    executor: &dyn Executor,
    limit: Option<Duration>,
    fut: impl Future<Output = T>,
) -> Result<T, Elapsed> {
    let Some(limit) = limit else {
        return Ok(fut.await);
    };
    let fut = std::pin::pin!(fut);
    match select(fut, executor.pause(limit)).await {
        Either::Left((value, _)) => Ok(value),
        Either::Right(((), _)) => Err(Elapsed(limit)),
    }
}

/// Executor backed by the current tokio `LocalSet`.
///
/// `spawn` panics outside a `LocalSet`, as `tokio::task::spawn_local` does.
#[cfg(not(target_arch = "wasm32"))]
#[derive(Debug, Default, Copy, Clone)]
pub struct TokioExecutor;

#[cfg(not(target_arch = "wasm32"))]
impl Executor for TokioExecutor {
    fn spawn(&self, task: LocalBoxFuture<'static, ()>) {
        tokio::task::spawn_local(task);
    }

    fn pause(&self, duration: Duration) -> LocalBoxFuture<'static, ()> {
        Box::pin(async move {
            if duration.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(duration).await;
            }
        })
    }
}
