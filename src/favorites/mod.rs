//! The user's favorite movies, persisted write-through to durable storage.
//!
//! Records keep their insertion order. Every mutation is applied in memory
//! first and published to subscribers, then the full collection is written
//! out. A failed write is reported but not rolled back; the store stays dirty
//! until a later write succeeds.

pub mod storage;

use crate::catalog::models::{Movie, MovieDetail, MovieId};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

pub use storage::{FavoritesStorage, JsonFileStorage, MemoryStorage, StorageError};

/// The minimal movie snapshot kept for a favorite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FavoriteRecord {
    pub id: MovieId,
    pub title: String,
    pub poster_url: Option<String>,
    pub release_year: i32,
    pub director_name: String,
}

impl From<&MovieDetail> for FavoriteRecord {
    fn from(movie: &MovieDetail) -> Self {
        Self {
            id: movie.id,
            title: movie.title.clone(),
            poster_url: movie.poster_url.clone(),
            release_year: movie.release_year,
            director_name: movie.director.name.clone(),
        }
    }
}

impl From<&Movie> for FavoriteRecord {
    fn from(movie: &Movie) -> Self {
        Self {
            id: movie.id,
            title: movie.title.clone(),
            poster_url: movie.poster_url.clone(),
            release_year: movie.release_year,
            director_name: movie.director_name.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Toggled {
    Added,
    Removed,
}

#[derive(Debug, thiserror::Error)]
pub enum FavoritesError {
    #[error("failed to persist favorites")]
    Persist(#[from] StorageError),
    #[error("failed to encode favorites")]
    Encode(#[from] serde_json::Error),
}

pub type FavoritesMap = IndexMap<MovieId, FavoriteRecord>;

struct WriteState {
    /// The last write failed; memory is ahead of storage.
    dirty: bool,
}

pub struct FavoritesStore {
    storage: Arc<dyn FavoritesStorage>,
    state: watch::Sender<Arc<FavoritesMap>>,
    gate: Mutex<WriteState>,
}

impl FavoritesStore {
    /// Read the stored blob once. Never fails: unreadable or corrupt storage
    /// starts an empty collection.
    pub async fn load(storage: Arc<dyn FavoritesStorage>) -> Self {
        let records = match storage.read().await {
            Ok(Some(blob)) => decode(&blob),
            Ok(None) => FavoritesMap::new(),
            Err(e) => {
                warn!(error = ?e, "failed to read favorites, starting empty");
                FavoritesMap::new()
            }
        };
        info!(count = records.len(), "favorites loaded");

        Self {
            storage,
            state: watch::Sender::new(Arc::new(records)),
            gate: Mutex::new(WriteState { dirty: false }),
        }
    }

    /// Append `record` unless its id is already present. Returns whether it
    /// was added.
    pub async fn add(&self, record: FavoriteRecord) -> Result<bool, FavoritesError> {
        self.mutate(|map| {
            if map.contains_key(&record.id) {
                return (false, false);
            }
            map.insert(record.id, record);
            (true, true)
        })
        .await
    }

    /// Remove `id` if present. Returns whether anything was removed.
    pub async fn remove(&self, id: MovieId) -> Result<bool, FavoritesError> {
        self.mutate(|map| {
            let removed = map.shift_remove(&id).is_some();
            (removed, removed)
        })
        .await
    }

    /// Add or remove `record` depending on whether its id is currently a
    /// favorite.
    pub async fn toggle(&self, record: FavoriteRecord) -> Result<Toggled, FavoritesError> {
        self.mutate(|map| {
            if map.shift_remove(&record.id).is_some() {
                (true, Toggled::Removed)
            } else {
                map.insert(record.id, record);
                (true, Toggled::Added)
            }
        })
        .await
    }

    pub fn is_favorite(&self, id: MovieId) -> bool {
        self.state.borrow().contains_key(&id)
    }

    pub fn get(&self, id: MovieId) -> Option<FavoriteRecord> {
        self.state.borrow().get(&id).cloned()
    }

    /// Favorites in insertion order.
    pub fn list(&self) -> Vec<FavoriteRecord> {
        self.state.borrow().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.state.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.borrow().is_empty()
    }

    pub fn snapshot(&self) -> Arc<FavoritesMap> {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<FavoritesMap>> {
        self.state.subscribe()
    }

    /// Whether the last write failed and storage lags behind memory.
    pub async fn is_dirty(&self) -> bool {
        self.gate.lock().await.dirty
    }

    /// Write the current collection out again.
    pub async fn flush(&self) -> Result<(), FavoritesError> {
        let mut gate = self.gate.lock().await;
        let current = self.snapshot();
        self.persist(&mut gate, &current).await
    }

    /// Apply `op` to a copy of the current collection under the write gate.
    ///
    /// `op` returns whether it changed anything plus its outcome. Unchanged
    /// collections are not written unless an earlier write failed.
    async fn mutate<R>(&self, op: impl FnOnce(&mut FavoritesMap) -> (bool, R)) -> Result<R, FavoritesError> {
        let mut gate = self.gate.lock().await;
        let mut next = FavoritesMap::clone(&self.state.borrow());

        let (changed, outcome) = op(&mut next);
        if !changed && !gate.dirty {
            return Ok(outcome);
        }

        let next = Arc::new(next);
        if changed {
            self.state.send_replace(next.clone());
        }
        self.persist(&mut gate, &next).await?;
        Ok(outcome)
    }

    async fn persist(&self, gate: &mut WriteState, records: &FavoritesMap) -> Result<(), FavoritesError> {
        let blob = encode(records)?;
        match self.storage.write(&blob).await {
            Ok(()) => {
                if gate.dirty {
                    info!(count = records.len(), "favorites storage caught up");
                }
                gate.dirty = false;
                debug!(count = records.len(), "favorites persisted");
                Ok(())
            }
            Err(e) => {
                gate.dirty = true;
                warn!(error = ?e, "failed to persist favorites, keeping in-memory state");
                Err(e.into())
            }
        }
    }
}

fn encode(records: &FavoritesMap) -> Result<String, serde_json::Error> {
    serde_json::to_string(&records.values().collect::<Vec<_>>())
}

/// Parse a stored blob. Anything but a JSON array yields an empty
/// collection. Malformed records inside the array are skipped on their own,
/// so one bad entry does not cost the rest; repeated ids keep their first
/// occurrence.
fn decode(blob: &str) -> FavoritesMap {
    let values: Vec<serde_json::Value> = match serde_json::from_str(blob) {
        Ok(values) => values,
        Err(e) => {
            warn!(error = %e, "stored favorites are corrupt, starting empty");
            return FavoritesMap::new();
        }
    };

    let mut map = FavoritesMap::with_capacity(values.len());
    for (index, value) in values.into_iter().enumerate() {
        match serde_json::from_value::<FavoriteRecord>(value) {
            Ok(record) => {
                map.entry(record.id).or_insert(record);
            }
            Err(e) => warn!(index, error = %e, "skipping malformed favorite"),
        }
    }
    map
}
