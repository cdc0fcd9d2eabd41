#![allow(dead_code)]

use async_trait::async_trait;
use marquee::catalog::models::{Movie, MovieDetail, Paginated};
use marquee::catalog::{CatalogApiError, Fetcher, Payload};
use marquee::favorites::{
    FavoriteRecord, FavoritesStorage, FavoritesStore, MemoryStorage, StorageError,
};
use marquee::pagination::PageSizeOptions;
use marquee::query::{CachePolicy, LogicalQuery};
use marquee::state::Explorer;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One scripted answer for a key.
enum Reply {
    Ok(Payload),
    Status(u16),
    NotFound,
}

struct Step {
    delay: Duration,
    reply: Reply,
}

/// A [`Fetcher`] that answers from per-key scripts and counts calls.
///
/// Each call consumes the next step for its key; the last step repeats.
/// Unscripted keys answer 404.
#[derive(Default)]
pub struct FakeFetcher {
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl FakeFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn push(&self, query: &LogicalQuery, delay: Duration, reply: Reply) {
        self.scripts
            .lock()
            .unwrap()
            .entry(query.key().to_string())
            .or_default()
            .push_back(Step { delay, reply });
    }

    pub fn respond(&self, query: &LogicalQuery, delay: Duration, payload: Payload) {
        self.push(query, delay, Reply::Ok(payload));
    }

    pub fn fail(&self, query: &LogicalQuery, delay: Duration, status: u16) {
        self.push(query, delay, Reply::Status(status));
    }

    pub fn not_found(&self, query: &LogicalQuery) {
        self.push(query, Duration::ZERO, Reply::NotFound);
    }

    pub fn calls(&self, query: &LogicalQuery) -> usize {
        self.calls
            .lock()
            .unwrap()
            .get(query.key().as_str())
            .copied()
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    /// Delay and reply for the next call to `key`, without holding the lock
    /// across the delay.
    fn next(&self, key: &str) -> (Duration, Result<Payload, CatalogApiError>) {
        *self.calls.lock().unwrap().entry(key.to_string()).or_default() += 1;

        let mut scripts = self.scripts.lock().unwrap();
        let Some(steps) = scripts.get_mut(key) else {
            return (Duration::ZERO, Err(not_found(key)));
        };
        let step = if steps.len() > 1 {
            steps.pop_front()
        } else {
            steps.front().map(|step| Step {
                delay: step.delay,
                reply: match &step.reply {
                    Reply::Ok(payload) => Reply::Ok(payload.clone()),
                    Reply::Status(status) => Reply::Status(*status),
                    Reply::NotFound => Reply::NotFound,
                },
            })
        };
        let Some(step) = step else {
            return (Duration::ZERO, Err(not_found(key)));
        };

        let result = match step.reply {
            Reply::Ok(payload) => Ok(payload),
            Reply::Status(status) => Err(CatalogApiError::Status {
                status,
                url: key.to_string(),
            }),
            Reply::NotFound => Err(not_found(key)),
        };
        (step.delay, result)
    }
}

fn not_found(key: &str) -> CatalogApiError {
    CatalogApiError::NotFound {
        resource: key.to_string(),
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch(&self, query: &LogicalQuery) -> Result<Payload, CatalogApiError> {
        let (delay, result) = self.next(query.key().as_str());
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        result
    }
}

/// Memory storage whose writes can be made to fail.
#[derive(Default)]
pub struct FlakyStorage {
    inner: MemoryStorage,
    failing: AtomicBool,
}

impl FlakyStorage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn blob(&self) -> Option<String> {
        self.inner.blob().await
    }
}

#[async_trait]
impl FavoritesStorage for FlakyStorage {
    async fn read(&self) -> Result<Option<String>, StorageError> {
        self.inner.read().await
    }

    async fn write(&self, blob: &str) -> Result<(), StorageError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("disk full".into()));
        }
        self.inner.write(blob).await
    }
}

pub async fn explorer_with(fetcher: Arc<FakeFetcher>) -> Explorer {
    let favorites = FavoritesStore::load(Arc::new(MemoryStorage::new())).await;
    Explorer::new(
        fetcher,
        CachePolicy::default(),
        Arc::new(favorites),
        PageSizeOptions::new(vec![10, 20, 50, 100], 20).unwrap(),
        2,
    )
}

pub fn movie(id: u64, title: &str) -> Movie {
    serde_json::from_value(serde_json::json!({
        "id": id,
        "title": title,
        "release_year": 1990 + id,
        "rating": "7.5",
        "poster_url": format!("https://img.example/{id}.jpg"),
        "director_name": "Kathryn Bigelow",
        "genres": ["Action"],
        "review_count": 0
    }))
    .unwrap()
}

pub fn movie_page(count: u64, titles: &[(u64, &str)], next: bool, previous: bool) -> Payload {
    Payload::Movies(Paginated {
        count,
        next: next.then(|| "http://localhost/api/movies/?page=next".to_string()),
        previous: previous.then(|| "http://localhost/api/movies/?page=prev".to_string()),
        results: titles.iter().map(|(id, title)| movie(*id, title)).collect(),
    })
}

pub fn movie_detail(id: u64, title: &str) -> MovieDetail {
    serde_json::from_value(serde_json::json!({
        "id": id,
        "title": title,
        "release_year": 1991,
        "duration": 122,
        "plot": "Surfers rob banks.",
        "poster_url": null,
        "rating": "7.3",
        "director": {"id": 4, "name": "Kathryn Bigelow", "nationality": "American"},
        "actors": [{"id": 8, "name": "Keanu Reeves"}],
        "genres": [{"id": 1, "name": "Action"}],
        "reviews": [],
        "average_rating": null,
        "review_count": 0
    }))
    .unwrap()
}

pub fn record(id: u64, title: &str) -> FavoriteRecord {
    FavoriteRecord {
        id,
        title: title.to_string(),
        poster_url: None,
        release_year: 2001,
        director_name: "Agnès Varda".to_string(),
    }
}

/// Titles of a movie list payload.
pub fn titles(payload: &Payload) -> Vec<String> {
    payload
        .as_movies()
        .map(|page| page.results.iter().map(|m| m.title.clone()).collect())
        .unwrap_or_default()
}
