//! A single consumer's view of "the query it currently wants".
//!
//! Every call to [`QueryObserver::observe`] supersedes the previous one. Results
//! for superseded keys still land in the cache under their own key, but they
//! are never published to this observer's subscribers.

use crate::query::cache::{CacheStatus, QueryCache, QueryResult, Retryable};
use crate::query::key::CacheKey;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;
use tracing::{debug, trace};

/// The key an observer is looking at and what the cache has for it.
#[derive(Debug)]
pub struct Observation<T, E> {
    pub key: CacheKey,
    pub result: QueryResult<T, E>,
}

impl<T, E> Clone for Observation<T, E> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            result: self.result.clone(),
        }
    }
}

pub struct QueryObserver<T, E> {
    cache: QueryCache<T, E>,
    generation: Arc<AtomicU64>,
    tx: Arc<watch::Sender<Option<Observation<T, E>>>>,
}

impl<T, E> Clone for QueryObserver<T, E> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            generation: self.generation.clone(),
            tx: self.tx.clone(),
        }
    }
}

impl<T, E> QueryObserver<T, E>
where
    T: Send + Sync + 'static,
    E: std::error::Error + Retryable + Send + Sync + 'static,
{
    pub fn new(cache: QueryCache<T, E>) -> Self {
        let (tx, _rx) = watch::channel(None);
        Self {
            cache,
            generation: Arc::new(AtomicU64::new(0)),
            tx: Arc::new(tx),
        }
    }

    /// Switch to `key`.
    ///
    /// Subscribers immediately see whatever the cache holds for the key (a
    /// loading state if nothing). Unless that is fresh, a fetch is started and
    /// its result published when it lands, provided no later `observe` call
    /// has switched away in the meantime.
    pub fn observe<F, Fut>(&self, key: CacheKey, fetch: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let mut snapshot = self.cache.peek(&key).unwrap_or_else(QueryResult::loading);
        let fresh = snapshot.status == CacheStatus::Fresh;
        if !fresh {
            snapshot.is_fetching = true;
        }

        let mut generation = 0;
        self.tx.send_modify(|slot| {
            generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
            *slot = Some(Observation {
                key: key.clone(),
                result: snapshot,
            });
        });
        debug!(key = %key, generation, fresh, "observing query");

        if fresh {
            return;
        }

        let cache = self.cache.clone();
        let current = self.generation.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = cache.resolve(&key, fetch).await;
            let published = tx.send_if_modified(|slot| {
                if current.load(Ordering::Acquire) != generation {
                    return false;
                }
                *slot = Some(Observation { key: key.clone(), result });
                true
            });
            if !published {
                trace!(key = %key, generation, "dropping result for superseded query");
            }
        });
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Observation<T, E>>> {
        self.tx.subscribe()
    }

    pub fn latest(&self) -> Option<Observation<T, E>> {
        self.tx.borrow().clone()
    }

    pub fn current_key(&self) -> Option<CacheKey> {
        self.tx.borrow().as_ref().map(|o| o.key.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::cache::CachePolicy;
    use crate::query::key::{LogicalQuery, Resource};
    use futures::FutureExt;
    use futures::future::BoxFuture;
    use std::time::Duration;

    #[derive(Debug, thiserror::Error)]
    #[error("unavailable")]
    struct Unavailable;

    impl Retryable for Unavailable {
        fn is_retryable(&self) -> bool {
            false
        }
    }

    fn delayed(
        value: &'static str,
        delay: Duration,
    ) -> impl Fn() -> BoxFuture<'static, Result<&'static str, Unavailable>> + Send + Sync + 'static {
        move || {
            async move {
                tokio::time::sleep(delay).await;
                Ok(value)
            }
            .boxed()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn superseded_results_are_not_published() {
        let cache = QueryCache::new(CachePolicy::default());
        let observer = QueryObserver::new(cache.clone());
        let mut rx = observer.subscribe();

        let a = LogicalQuery::new(Resource::Movie(1)).key();
        let b = LogicalQuery::new(Resource::Movie(2)).key();

        observer.observe(a.clone(), delayed("slow", Duration::from_millis(500)));
        observer.observe(b.clone(), delayed("quick", Duration::from_millis(50)));

        let settled = rx
            .wait_for(|o| o.as_ref().is_some_and(|o| o.result.data.is_some()))
            .await
            .unwrap()
            .clone()
            .unwrap();
        assert_eq!(settled.key, b);
        assert_eq!(settled.result.data.as_deref(), Some(&"quick"));

        tokio::time::sleep(Duration::from_secs(1)).await;

        // A landed in its own entry but never reached the observer.
        let latest = observer.latest().unwrap();
        assert_eq!(latest.key, b);
        assert_eq!(latest.result.data.as_deref(), Some(&"quick"));
        assert_eq!(cache.peek(&a).unwrap().data.as_deref(), Some(&"slow"));
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_entries_publish_without_fetching() {
        let cache = QueryCache::new(CachePolicy::default());
        let key = LogicalQuery::new(Resource::Genres).key();
        cache.get(&key, delayed("genres", Duration::ZERO)).await;

        let observer = QueryObserver::new(cache.clone());
        observer.observe(key.clone(), || async { Err(Unavailable) }.boxed());

        let latest = observer.latest().unwrap();
        assert_eq!(latest.result.status, CacheStatus::Fresh);
        assert!(!latest.result.is_fetching);
        assert_eq!(cache.in_flight(), 0);
        assert_eq!(observer.current_key(), Some(key));
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_key_starts_in_loading_state() {
        let observer = QueryObserver::new(QueryCache::new(CachePolicy::default()));
        let key = LogicalQuery::new(Resource::Movie(7)).key();
        observer.observe(key, delayed("x", Duration::from_millis(10)));

        let latest = observer.latest().unwrap();
        assert!(latest.result.is_loading());
    }
}
