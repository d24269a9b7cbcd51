//! Deduplication of concurrent producers sharing one cache key.
//!
//! The first caller for a key installs a shared future; later callers for
//! the same key attach to it and receive the same result, so at most one
//! upstream fetch is in flight per fingerprint. The shared future is only
//! driven while some caller awaits it: if the original leader is cancelled,
//! a surviving follower's poll continues the computation. On completion
//! the entry is removed.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;

type SharedWork<T, E> = Shared<BoxFuture<'static, Result<T, Arc<E>>>>;

pub struct SingleFlight<T, E> {
    inflight: Mutex<HashMap<String, SharedWork<T, E>>>,
}

impl<T, E> std::fmt::Debug for SingleFlight<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleFlight")
            .field("inflight", &self.inflight.lock().len())
            .finish()
    }
}

impl<T, E> Default for SingleFlight<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> SingleFlight<T, E> {
    pub fn new() -> Self {
        Self {
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Number of keys currently in flight.
    pub fn len(&self) -> usize {
        self.inflight.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inflight.lock().is_empty()
    }
}

impl<T, E> SingleFlight<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    /// Runs `work` for `key`, or attaches to an identical computation
    /// already in flight. Errors are shared with every attached caller.
    pub async fn run<F>(&self, key: &str, work: F) -> Result<T, Arc<E>>
    where
        F: FnOnce() -> BoxFuture<'static, Result<T, E>>,
    {
        let shared = {
            let mut inflight = self.inflight.lock();
            match inflight.get(key) {
                Some(existing) => existing.clone(),
                None => {
                    let shared = work().map(|r| r.map_err(Arc::new)).boxed().shared();
                    inflight.insert(key.to_owned(), shared.clone());
                    shared
                }
            }
        };

        let result = shared.clone().await;

        // First completer clears the slot; the pointer check keeps a
        // computation started after that removal intact.
        let mut inflight = self.inflight.lock();
        if let Some(current) = inflight.get(key) {
            if current.ptr_eq(&shared) {
                inflight.remove(key);
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callers_share_one_run() {
        let flight = Arc::new(SingleFlight::<u64, std::io::Error>::new());
        let runs = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..50 {
            let flight = Arc::clone(&flight);
            let runs = Arc::clone(&runs);
            handles.push(tokio::spawn(async move {
                flight
                    .run("Scaffold", move || {
                        async move {
                            runs.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            Ok(7)
                        }
                        .boxed()
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 7);
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(flight.is_empty());
    }

    #[tokio::test]
    async fn errors_are_shared_and_not_sticky() {
        let flight = SingleFlight::<u64, std::io::Error>::new();

        let err = flight
            .run("key", || {
                async { Err(std::io::Error::other("boom")) }.boxed()
            })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "boom");

        // entry was removed, a later run starts fresh
        let ok = flight.run("key", || async { Ok(3) }.boxed()).await;
        assert_eq!(ok.unwrap(), 3);
    }

    #[tokio::test]
    async fn distinct_keys_run_independently() {
        let flight = SingleFlight::<&'static str, std::io::Error>::new();

        let a = flight.run("a", || async { Ok("a") }.boxed()).await.unwrap();
        let b = flight.run("b", || async { Ok("b") }.boxed()).await.unwrap();
        assert_eq!((a, b), ("a", "b"));
    }
}
