//! Keyed query cache with stale-while-revalidate reads and singleflight fetches.
//!
//! Entries live in a `DashMap` keyed by [`CacheKey`]. Each key has at most one
//! in-flight fetch: it is stored as a shared future, so every caller that asks
//! for the key while it runs awaits the same result. The future is also spawned
//! onto the runtime, so it completes and populates the cache even when every
//! caller has gone away.
//!
//! Results are always written under the key they were fetched for. A slow
//! response for an old key can only ever land in that old key's entry.

use crate::query::key::CacheKey;
use crate::utils::{fmt_duration, log_if_slow};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const SLOW_FETCH_THRESHOLD: Duration = Duration::from_secs(2);

/// Errors that can tell the cache whether another attempt is worthwhile.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Staleness and retry settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    /// Age after which a payload is served as a placeholder and refetched.
    pub stale_after: Duration,
    /// Extra attempts after a failed fetch.
    pub retry_count: u32,
    /// Delay before the first retry; doubles for each further attempt.
    pub retry_delay: Duration,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            stale_after: Duration::from_secs(5 * 60),
            retry_count: 1,
            retry_delay: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStatus {
    Fresh,
    Stale,
    Fetching,
    Error,
}

/// What a consumer sees for a key.
///
/// `error` next to a `Stale` payload is a transient signal: the last
/// background refetch failed but the old payload is still shown.
#[derive(Debug)]
pub struct QueryResult<T, E> {
    pub data: Option<Arc<T>>,
    pub error: Option<Arc<E>>,
    pub status: CacheStatus,
    pub is_fetching: bool,
}

impl<T, E> Clone for QueryResult<T, E> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            error: self.error.clone(),
            status: self.status,
            is_fetching: self.is_fetching,
        }
    }
}

impl<T, E> QueryResult<T, E> {
    pub fn loading() -> Self {
        Self {
            data: None,
            error: None,
            status: CacheStatus::Fetching,
            is_fetching: true,
        }
    }

    fn fresh(data: Arc<T>) -> Self {
        Self {
            data: Some(data),
            error: None,
            status: CacheStatus::Fresh,
            is_fetching: false,
        }
    }

    fn failed(error: Arc<E>) -> Self {
        Self {
            data: None,
            error: Some(error),
            status: CacheStatus::Error,
            is_fetching: false,
        }
    }

    /// No payload yet, but one is on its way.
    pub fn is_loading(&self) -> bool {
        self.data.is_none() && self.is_fetching
    }

    pub fn is_error(&self) -> bool {
        self.status == CacheStatus::Error
    }
}

type Outcome<T, E> = Result<Arc<T>, Arc<E>>;
type SharedFetch<T, E> = Shared<BoxFuture<'static, Outcome<T, E>>>;

/// The stored state for one key. Replaced wholesale on every fetch result.
struct CacheEntry<T, E> {
    payload: Option<Arc<T>>,
    fetched_at: Option<Instant>,
    error: Option<Arc<E>>,
    invalidated: bool,
}

impl<T, E> CacheEntry<T, E> {
    fn empty() -> Self {
        Self {
            payload: None,
            fetched_at: None,
            error: None,
            invalidated: false,
        }
    }

    fn is_fresh(&self, now: Instant, stale_after: Duration) -> bool {
        match (&self.payload, self.fetched_at) {
            (Some(_), Some(at)) => !self.invalidated && now.duration_since(at) < stale_after,
            _ => false,
        }
    }

    fn to_result(&self, now: Instant, stale_after: Duration, in_flight: bool) -> QueryResult<T, E> {
        match &self.payload {
            Some(data) => QueryResult {
                data: Some(data.clone()),
                error: self.error.clone(),
                status: if self.is_fresh(now, stale_after) {
                    CacheStatus::Fresh
                } else {
                    CacheStatus::Stale
                },
                is_fetching: in_flight,
            },
            None if in_flight => QueryResult::loading(),
            None => QueryResult {
                data: None,
                error: self.error.clone(),
                status: CacheStatus::Error,
                is_fetching: false,
            },
        }
    }
}

struct InFlight<T, E> {
    fetch: SharedFetch<T, E>,
    /// Set when the key is invalidated while this fetch runs; its payload is
    /// then stored already stale.
    invalidated: Arc<AtomicBool>,
}

struct Inner<T, E> {
    entries: DashMap<CacheKey, CacheEntry<T, E>>,
    inflight: DashMap<CacheKey, InFlight<T, E>>,
    policy: CachePolicy,
}

/// Process-wide query cache. Clones share the same entries.
pub struct QueryCache<T, E> {
    inner: Arc<Inner<T, E>>,
}

impl<T, E> Clone for QueryCache<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T, E> QueryCache<T, E>
where
    T: Send + Sync + 'static,
    E: std::error::Error + Retryable + Send + Sync + 'static,
{
    pub fn new(policy: CachePolicy) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: DashMap::new(),
                inflight: DashMap::new(),
                policy,
            }),
        }
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.inner.policy
    }

    /// [`get_with`](Self::get_with) using the configured staleness window.
    pub async fn get<F, Fut>(&self, key: &CacheKey, fetch: F) -> QueryResult<T, E>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        self.get_with(key, self.inner.policy.stale_after, fetch)
            .await
    }

    /// Read `key`, fetching only when needed.
    ///
    /// - fresh payload: returned as-is, `fetch` is not called;
    /// - stale payload: returned immediately as a placeholder while a
    ///   background refetch runs (`is_fetching` is set);
    /// - no payload: waits for the in-flight fetch, starting one if none runs.
    pub async fn get_with<F, Fut>(&self, key: &CacheKey, stale_after: Duration, fetch: F) -> QueryResult<T, E>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let now = Instant::now();
        if let Some(entry) = self.inner.entries.get(key)
            && entry.payload.is_some()
        {
            if entry.is_fresh(now, stale_after) {
                debug!(key = %key, "query cache hit");
                return entry.to_result(now, stale_after, false);
            }
            let placeholder = entry.to_result(now, stale_after, true);
            drop(entry);

            debug!(key = %key, "serving stale payload while revalidating");
            drop(self.start_or_attach(key, fetch));
            return placeholder;
        }

        match self.start_or_attach(key, fetch).await {
            Ok(data) => QueryResult::fresh(data),
            Err(error) => QueryResult::failed(error),
        }
    }

    /// Like [`get`](Self::get), but waits for the refetch of a stale payload
    /// instead of returning the placeholder.
    ///
    /// A failed refetch of a key that already has a payload yields that
    /// payload, `Stale`, with the error attached.
    pub async fn resolve<F, Fut>(&self, key: &CacheKey, fetch: F) -> QueryResult<T, E>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let stale_after = self.inner.policy.stale_after;
        if let Some(entry) = self.inner.entries.get(key)
            && entry.is_fresh(Instant::now(), stale_after)
        {
            debug!(key = %key, "query cache hit");
            return entry.to_result(Instant::now(), stale_after, false);
        }

        let outcome = self.start_or_attach(key, fetch).await;
        self.settled(key, outcome)
    }

    /// Snapshot of `key` without triggering a fetch. `None` for keys that
    /// were never requested.
    pub fn peek(&self, key: &CacheKey) -> Option<QueryResult<T, E>> {
        let in_flight = self.inner.inflight.contains_key(key);
        match self.inner.entries.get(key) {
            Some(entry) => Some(entry.to_result(
                Instant::now(),
                self.inner.policy.stale_after,
                in_flight,
            )),
            None if in_flight => Some(QueryResult::loading()),
            None => None,
        }
    }

    /// Mark `key` stale so the next read refetches it. Returns whether there
    /// was anything to invalidate.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        // Flag the in-flight fetch before the entry: a fetch that applies its
        // result in between will observe the flag.
        let mut touched = false;
        if let Some(flight) = self.inner.inflight.get(key) {
            flight.invalidated.store(true, Ordering::Release);
            touched = true;
        }
        if let Some(mut entry) = self.inner.entries.get_mut(key) {
            entry.invalidated = true;
            touched = true;
        }
        if touched {
            debug!(key = %key, "query invalidated");
        }
        touched
    }

    /// Invalidate every key matching `predicate`. Returns the number of keys
    /// touched.
    pub fn invalidate_where(&self, predicate: impl Fn(&CacheKey) -> bool) -> usize {
        for flight in self.inner.inflight.iter() {
            if predicate(flight.key()) {
                flight.invalidated.store(true, Ordering::Release);
            }
        }
        let mut count = 0;
        for mut entry in self.inner.entries.iter_mut() {
            if predicate(entry.key()) {
                entry.invalidated = true;
                count += 1;
            }
        }
        debug!(count, "queries invalidated");
        count
    }

    /// Invalidate `key` and wait for a fetch that started after the
    /// invalidation.
    pub async fn refetch<F, Fut>(&self, key: &CacheKey, fetch: F) -> QueryResult<T, E>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        self.invalidate(key);
        let pending = self
            .inner
            .inflight
            .get(key)
            .map(|flight| flight.fetch.clone());
        if let Some(pending) = pending {
            // That fetch predates the invalidation; let it land first.
            let _ = pending.await;
        }

        let outcome = self.start_or_attach(key, fetch).await;
        self.settled(key, outcome)
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Number of fetches currently running.
    pub fn in_flight(&self) -> usize {
        self.inner.inflight.len()
    }

    /// Turn a finished fetch into a result, falling back to the stored
    /// payload when the fetch failed.
    fn settled(&self, key: &CacheKey, outcome: Outcome<T, E>) -> QueryResult<T, E> {
        match outcome {
            Ok(data) => QueryResult::fresh(data),
            Err(error) => match self.inner.entries.get(key) {
                Some(entry) if entry.payload.is_some() => QueryResult {
                    data: entry.payload.clone(),
                    error: Some(error),
                    status: CacheStatus::Stale,
                    is_fetching: false,
                },
                _ => QueryResult::failed(error),
            },
        }
    }

    /// Claim the singleflight slot for `key`, or join the fetch holding it.
    fn start_or_attach<F, Fut>(&self, key: &CacheKey, fetch: F) -> SharedFetch<T, E>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let shared = match self.inner.inflight.entry(key.clone()) {
            Entry::Occupied(slot) => {
                debug!(key = %key, "attaching to in-flight fetch");
                return slot.get().fetch.clone();
            }
            Entry::Vacant(slot) => {
                let invalidated = Arc::new(AtomicBool::new(false));
                let shared = self
                    .clone()
                    .run_fetch(key.clone(), fetch, invalidated.clone())
                    .boxed()
                    .shared();
                slot.insert(InFlight {
                    fetch: shared.clone(),
                    invalidated,
                });
                shared
            }
        };

        // Drive the fetch to completion even if every caller drops out.
        tokio::spawn(shared.clone());
        shared
    }

    async fn run_fetch<F, Fut>(self, key: CacheKey, fetch: F, invalidated: Arc<AtomicBool>) -> Outcome<T, E>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let start = std::time::Instant::now();
        let policy = self.inner.policy;
        let mut attempt: u32 = 0;

        let outcome = loop {
            match fetch().await {
                Ok(value) => break Ok(Arc::new(value)),
                Err(e) if attempt < policy.retry_count && e.is_retryable() => {
                    let delay = policy.retry_delay.saturating_mul(1 << attempt.min(16));
                    attempt += 1;
                    warn!(
                        key = %key,
                        attempt,
                        delay = fmt_duration(delay),
                        error = %e,
                        "fetch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => break Err(Arc::new(e)),
            }
        };

        self.apply(&key, &outcome, &invalidated);
        self.inner.inflight.remove(&key);

        match &outcome {
            Ok(_) => info!(
                key = %key,
                attempts = attempt + 1,
                duration = fmt_duration(start.elapsed()),
                "fetch completed"
            ),
            Err(e) => warn!(
                key = %key,
                attempts = attempt + 1,
                error = %e,
                "fetch failed"
            ),
        }
        log_if_slow(start, SLOW_FETCH_THRESHOLD, key.as_str());

        outcome
    }

    /// Store a fetch outcome, superseding the previous entry.
    ///
    /// Success replaces payload and timestamp. Failure keeps the last good
    /// payload and records the error beside it.
    fn apply(&self, key: &CacheKey, outcome: &Outcome<T, E>, invalidated: &AtomicBool) {
        let mut slot = self
            .inner
            .entries
            .entry(key.clone())
            .or_insert_with(CacheEntry::empty);
        let invalidated = invalidated.load(Ordering::Acquire);

        let next = match outcome {
            Ok(data) => CacheEntry {
                payload: Some(data.clone()),
                fetched_at: Some(Instant::now()),
                error: None,
                invalidated,
            },
            Err(error) => CacheEntry {
                payload: slot.payload.clone(),
                fetched_at: slot.fetched_at,
                error: Some(error.clone()),
                invalidated: slot.invalidated || invalidated,
            },
        };
        *slot = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::key::{LogicalQuery, Resource};
    use std::sync::atomic::AtomicUsize;

    #[derive(Debug, thiserror::Error)]
    #[error("{message}")]
    struct TestError {
        message: &'static str,
        retryable: bool,
    }

    impl Retryable for TestError {
        fn is_retryable(&self) -> bool {
            self.retryable
        }
    }

    fn key(id: u64) -> CacheKey {
        LogicalQuery::new(Resource::Movie(id)).key()
    }

    fn cache() -> QueryCache<String, TestError> {
        QueryCache::new(CachePolicy::default())
    }

    /// A fetch closure that counts calls and always succeeds with `value`.
    fn counting(
        calls: &Arc<AtomicUsize>,
        value: &'static str,
    ) -> impl Fn() -> BoxFuture<'static, Result<String, TestError>> + Send + Sync + 'static {
        let calls = calls.clone();
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok(value.to_string()) }.boxed()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn first_read_fetches_and_stores() {
        let cache = cache();
        let calls = Arc::new(AtomicUsize::new(0));

        let result = cache.get(&key(1), counting(&calls, "heat")).await;
        assert_eq!(result.status, CacheStatus::Fresh);
        assert_eq!(result.data.as_deref().map(String::as_str), Some("heat"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reads_within_window_hit_cache() {
        let cache = cache();
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..5 {
            let result = cache.get(&key(1), counting(&calls, "heat")).await;
            assert_eq!(result.status, CacheStatus::Fresh);
            tokio::time::advance(Duration::from_secs(30)).await;
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_read_serves_placeholder_and_revalidates() {
        let cache = cache();
        let calls = Arc::new(AtomicUsize::new(0));
        cache.get(&key(1), counting(&calls, "v1")).await;

        tokio::time::advance(Duration::from_secs(5 * 60)).await;

        let placeholder = cache.get(&key(1), counting(&calls, "v2")).await;
        assert_eq!(placeholder.status, CacheStatus::Stale);
        assert!(placeholder.is_fetching);
        assert_eq!(placeholder.data.as_deref().map(String::as_str), Some("v1"));

        // Let the background refetch land.
        while cache.in_flight() > 0 {
            tokio::task::yield_now().await;
        }

        let fresh = cache.get(&key(1), counting(&calls, "v3")).await;
        assert_eq!(fresh.status, CacheStatus::Fresh);
        assert_eq!(fresh.data.as_deref().map(String::as_str), Some("v2"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn first_load_failure_is_retried_once() {
        let cache = cache();
        let calls = Arc::new(AtomicUsize::new(0));
        let fetch = {
            let calls = calls.clone();
            move || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err::<String, _>(TestError {
                        message: "connection reset",
                        retryable: true,
                    })
                }
                .boxed()
            }
        };

        let result = cache.get(&key(1), fetch).await;
        assert_eq!(result.status, CacheStatus::Error);
        assert!(result.data.is_none());
        assert_eq!(result.error.unwrap().to_string(), "connection reset");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_errors_are_not_retried() {
        let cache = cache();
        let calls = Arc::new(AtomicUsize::new(0));
        let fetch = {
            let calls = calls.clone();
            move || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err::<String, _>(TestError {
                        message: "not found",
                        retryable: false,
                    })
                }
                .boxed()
            }
        };

        let result = cache.get(&key(9), fetch).await;
        assert!(result.is_error());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_recovers_on_second_attempt() {
        let cache = cache();
        let calls = Arc::new(AtomicUsize::new(0));
        let fetch = {
            let calls = calls.clone();
            move || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(TestError {
                            message: "503",
                            retryable: true,
                        })
                    } else {
                        Ok("recovered".to_string())
                    }
                }
                .boxed()
            }
        };

        let started = Instant::now();
        let result = cache.get(&key(1), fetch).await;
        assert_eq!(result.status, CacheStatus::Fresh);
        assert_eq!(started.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn errors_are_not_cached() {
        let cache = cache();
        let fail = || {
            async {
                Err::<String, _>(TestError {
                    message: "boom",
                    retryable: false,
                })
            }
            .boxed()
        };
        assert!(cache.get(&key(1), fail).await.is_error());

        let calls = Arc::new(AtomicUsize::new(0));
        let result = cache.get(&key(1), counting(&calls, "ok")).await;
        assert_eq!(result.status, CacheStatus::Fresh);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn invalidate_forces_refetch() {
        let cache = cache();
        let calls = Arc::new(AtomicUsize::new(0));
        cache.get(&key(1), counting(&calls, "v1")).await;

        assert!(cache.invalidate(&key(1)));
        assert_eq!(cache.peek(&key(1)).unwrap().status, CacheStatus::Stale);

        let result = cache.resolve(&key(1), counting(&calls, "v2")).await;
        assert_eq!(result.data.as_deref().map(String::as_str), Some("v2"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        assert!(!cache.invalidate(&key(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn invalidate_where_matches_keys() {
        let cache = cache();
        let calls = Arc::new(AtomicUsize::new(0));
        cache.get(&key(1), counting(&calls, "a")).await;
        cache.get(&key(2), counting(&calls, "b")).await;
        let genres = LogicalQuery::new(Resource::Genres).key();
        cache.get(&genres, counting(&calls, "g")).await;

        let count = cache.invalidate_where(|k| matches!(k.resource(), Resource::Movie(_)));
        assert_eq!(count, 2);
        assert_eq!(cache.peek(&genres).unwrap().status, CacheStatus::Fresh);
        assert_eq!(cache.peek(&key(1)).unwrap().status, CacheStatus::Stale);
    }

    #[tokio::test(start_paused = true)]
    async fn peek_unknown_key_is_none() {
        let cache = cache();
        assert!(cache.peek(&key(1)).is_none());
        assert!(cache.is_empty());
    }
}
