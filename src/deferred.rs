//! Deferred values: a result computed on the tokio runtime and read once.
//!
//! Composition (`map`, `then`, `combine`, `all`) spawns a new task that
//! awaits its inputs, so a chain keeps running even if nobody is waiting on
//! the intermediate handles.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::DeferredConfig;
use crate::error::{PrimerError, Result};

pub struct Deferred<T> {
    handle: JoinHandle<Result<T>>,
}

impl<T: Send + 'static> Deferred<T> {
    /// Runs `future` as a task on the current runtime.
    pub fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        Self {
            handle: tokio::spawn(async move { Ok(future.await) }),
        }
    }

    /// Runs a blocking closure on the runtime's blocking pool.
    pub fn supply<F>(supplier: F) -> Self
    where
        F: FnOnce() -> T + Send + 'static,
    {
        let blocking = tokio::task::spawn_blocking(supplier);
        Self {
            handle: tokio::spawn(async move { Ok::<_, PrimerError>(blocking.await?) }),
        }
    }

    pub fn completed(value: T) -> Self {
        Self {
            handle: tokio::spawn(async move { Ok(value) }),
        }
    }

    pub fn map<U, F>(self, f: F) -> Deferred<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        Deferred {
            handle: tokio::spawn(async move { self.get().await.map(f) }),
        }
    }

    /// Sequential composition: once this value is ready, feed it to `f` and
    /// wait for the future it returns.
    pub fn then<U, F, Fut>(self, f: F) -> Deferred<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> Fut + Send + 'static,
        Fut: Future<Output = U> + Send + 'static,
    {
        Deferred {
            handle: tokio::spawn(async move {
                let value = self.get().await?;
                Ok::<_, PrimerError>(f(value).await)
            }),
        }
    }

    pub fn combine<U, R, F>(self, other: Deferred<U>, f: F) -> Deferred<R>
    where
        U: Send + 'static,
        R: Send + 'static,
        F: FnOnce(T, U) -> R + Send + 'static,
    {
        Deferred {
            handle: tokio::spawn(async move {
                let (left, right) = futures::future::try_join(self.get(), other.get()).await?;
                Ok::<_, PrimerError>(f(left, right))
            }),
        }
    }

    /// Waits for every value; the output keeps the input order.
    pub fn all(deferreds: Vec<Deferred<T>>) -> Deferred<Vec<T>> {
        Deferred {
            handle: tokio::spawn(async move {
                futures::future::try_join_all(deferreds.into_iter().map(Deferred::get)).await
            }),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Consumes the handle and waits for the value.
    pub async fn get(self) -> Result<T> {
        self.handle.await?
    }
}

async fn produce(part: String, delay: Duration) -> String {
    tokio::time::sleep(delay).await;
    debug!(%part, "produced greeting part");
    part
}

/// Produces both halves of the greeting concurrently and joins them.
pub fn compose_greeting(config: &DeferredConfig) -> Deferred<String> {
    let delay = Duration::from_millis(config.delay_ms);
    let head = Deferred::spawn(produce(config.head.clone(), delay));
    let tail = Deferred::spawn(produce(config.tail.clone(), delay));

    head.combine(tail, |head, tail| head + &tail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn quick_config() -> DeferredConfig {
        DeferredConfig {
            delay_ms: 5,
            ..DeferredConfig::default()
        }
    }

    #[tokio::test]
    async fn test_compose_greeting() {
        let greeting = compose_greeting(&quick_config()).get().await.unwrap();
        assert_eq!(greeting, "Hello master thesis.");
    }

    #[tokio::test]
    async fn test_compose_greeting_runs_each_part_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = |part: &'static str| {
            let calls = Arc::clone(&calls);
            Deferred::supply(move || {
                calls.fetch_add(1, Ordering::SeqCst);
                part.to_string()
            })
        };

        let greeting = counted("Hello ")
            .combine(counted("master thesis."), |a, b| a + &b)
            .get()
            .await
            .unwrap();

        assert_eq!(greeting, "Hello master thesis.");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_map_and_then() {
        let length = Deferred::completed("master".to_string())
            .map(|s| s.to_uppercase())
            .then(|s| async move { format!("{s} thesis") })
            .map(|s| s.len())
            .get()
            .await
            .unwrap();
        assert_eq!(length, "MASTER thesis".len());
    }

    #[tokio::test]
    async fn test_all_keeps_order() {
        let parts = (0..5u64)
            .map(|i| {
                Deferred::spawn(async move {
                    // later items finish first
                    tokio::time::sleep(Duration::from_millis(25 - i * 5)).await;
                    i
                })
            })
            .collect();

        assert_eq!(Deferred::all(parts).get().await.unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_panic_surfaces_as_task_failed() {
        let failing: Deferred<String> = Deferred::supply(|| panic!("supplier exploded"));
        let combined = failing.combine(Deferred::completed(1), |s, n| format!("{s}{n}"));

        let err = combined.get().await.unwrap_err();
        assert!(matches!(err, PrimerError::TaskFailed(_)));
    }

    #[tokio::test]
    async fn test_is_finished() {
        let (tx, rx) = tokio::sync::oneshot::channel::<u8>();
        let pending = Deferred::spawn(async move { rx.await.unwrap_or(0) });
        assert!(!pending.is_finished());

        tx.send(7).unwrap();
        assert_eq!(pending.get().await.unwrap(), 7);
    }
}
