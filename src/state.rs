//! Process-wide explorer state: the catalog client, the shared query cache
//! and the favorites store, plus the query functions views call.

use crate::catalog::{CatalogApiError, Fetcher, Payload};
use crate::favorites::FavoritesStore;
use crate::pagination::{PageInfo, PageSizeOptions};
use crate::query::key::{
    ActorFilters, DirectorFilters, EntityKind, Filters, LogicalQuery, MovieFilters, Resource,
    ReviewFilters, SortOrder,
};
use crate::query::{CachePolicy, QueryCache, QueryObserver, QueryResult};
use futures::FutureExt;
use futures::future::BoxFuture;
use std::sync::Arc;
use tracing::debug;

pub type CatalogCache = QueryCache<Payload, CatalogApiError>;
pub type CatalogResult = QueryResult<Payload, CatalogApiError>;
pub type CatalogObserver = QueryObserver<Payload, CatalogApiError>;

/// Page number, size and ordering for a list query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paging {
    pub page: u32,
    /// Must be one of the configured options; anything else falls back to
    /// the default size.
    pub page_size: Option<u32>,
    pub ordering: Option<SortOrder>,
}

impl Default for Paging {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: None,
            ordering: None,
        }
    }
}

impl Paging {
    pub fn page(page: u32) -> Self {
        Self {
            page,
            ..Self::default()
        }
    }
}

/// Explicitly owned replacement for global query/favorites singletons.
/// Clones share everything.
#[derive(Clone)]
pub struct Explorer {
    fetcher: Arc<dyn Fetcher>,
    cache: CatalogCache,
    favorites: Arc<FavoritesStore>,
    page_sizes: PageSizeOptions,
    spread: u32,
}

impl Explorer {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        policy: CachePolicy,
        favorites: Arc<FavoritesStore>,
        page_sizes: PageSizeOptions,
        spread: u32,
    ) -> Self {
        Self {
            fetcher,
            cache: QueryCache::new(policy),
            favorites,
            page_sizes,
            spread,
        }
    }

    pub fn cache(&self) -> &CatalogCache {
        &self.cache
    }

    pub fn favorites(&self) -> &Arc<FavoritesStore> {
        &self.favorites
    }

    pub fn page_sizes(&self) -> &PageSizeOptions {
        &self.page_sizes
    }

    pub fn spread(&self) -> u32 {
        self.spread
    }

    /// Apply `paging` to `query`, snapping the page size to an allowed one.
    pub fn paged(&self, query: LogicalQuery, paging: Paging) -> LogicalQuery {
        query
            .with_page(paging.page)
            .with_page_size(self.page_sizes.resolve(paging.page_size))
            .with_ordering(paging.ordering)
    }

    /// Stale-while-revalidate read of `query`.
    pub async fn query(&self, query: &LogicalQuery) -> CatalogResult {
        self.cache.get(&query.key(), self.fetch_fn(query)).await
    }

    /// Like [`query`](Self::query), but waits for a stale entry to be
    /// refreshed. For one-shot callers that print a single answer.
    pub async fn load(&self, query: &LogicalQuery) -> CatalogResult {
        self.cache.resolve(&query.key(), self.fetch_fn(query)).await
    }

    pub async fn movies(&self, filters: &MovieFilters, paging: Paging) -> CatalogResult {
        self.query(&self.paged(LogicalQuery::movies(filters), paging))
            .await
    }

    pub async fn movie(&self, id: u64) -> CatalogResult {
        self.query(&LogicalQuery::new(Resource::Movie(id))).await
    }

    /// Look up a movie by the id segment of a route. Ids that are not
    /// numbers cannot exist, so they yield `None` without a request.
    pub async fn movie_by_route_id(&self, raw: &str) -> Option<CatalogResult> {
        match raw.trim().parse::<u64>() {
            Ok(id) => Some(self.movie(id).await),
            Err(_) => {
                debug!(raw, "ignoring non-numeric movie id");
                None
            }
        }
    }

    pub async fn top_rated(&self) -> CatalogResult {
        self.query(&LogicalQuery::new(Resource::TopRatedMovies))
            .await
    }

    pub async fn movies_by_genre(&self, name: &str, paging: Paging) -> CatalogResult {
        self.query(&self.paged(LogicalQuery::movies_by_genre(name), paging))
            .await
    }

    pub async fn movies_by_director(&self, name: &str, paging: Paging) -> CatalogResult {
        self.query(&self.paged(LogicalQuery::movies_by_director(name), paging))
            .await
    }

    pub async fn actors(&self, filters: &ActorFilters, paging: Paging) -> CatalogResult {
        self.query(&self.paged(LogicalQuery::actors(filters), paging))
            .await
    }

    pub async fn actor(&self, id: u64) -> CatalogResult {
        self.query(&LogicalQuery::new(Resource::Actor(id))).await
    }

    pub async fn directors(&self, filters: &DirectorFilters, paging: Paging) -> CatalogResult {
        self.query(&self.paged(LogicalQuery::directors(filters), paging))
            .await
    }

    pub async fn director(&self, id: u64) -> CatalogResult {
        self.query(&LogicalQuery::new(Resource::Director(id))).await
    }

    pub async fn genres(&self, name: Option<&str>, paging: Paging) -> CatalogResult {
        let mut filters = Filters::new();
        filters.set_text("name", name);
        let query = LogicalQuery::new(Resource::Genres).with_filters(filters);
        self.query(&self.paged(query, paging)).await
    }

    pub async fn genre(&self, id: u64) -> CatalogResult {
        self.query(&LogicalQuery::new(Resource::Genre(id))).await
    }

    pub async fn reviews(&self, filters: &ReviewFilters, paging: Paging) -> CatalogResult {
        self.query(&self.paged(LogicalQuery::reviews(filters), paging))
            .await
    }

    pub async fn featured_reviews(&self, paging: Paging) -> CatalogResult {
        self.query(&self.paged(LogicalQuery::new(Resource::FeaturedReviews), paging))
            .await
    }

    /// A new observer over the shared cache, for one consumer.
    pub fn observer(&self) -> CatalogObserver {
        QueryObserver::new(self.cache.clone())
    }

    /// Point `observer` at `query`.
    pub fn observe(&self, observer: &CatalogObserver, query: &LogicalQuery) {
        observer.observe(query.key(), self.fetch_fn(query));
    }

    pub fn invalidate(&self, query: &LogicalQuery) -> bool {
        self.cache.invalidate(&query.key())
    }

    /// Mark every cached query about `entity` stale.
    pub fn invalidate_entity(&self, entity: EntityKind) -> usize {
        self.cache.invalidate_where(|key| key.entity() == entity)
    }

    pub async fn refetch(&self, query: &LogicalQuery) -> CatalogResult {
        self.cache.refetch(&query.key(), self.fetch_fn(query)).await
    }

    /// Paging state for a list payload fetched with `query`.
    pub fn page_info(&self, query: &LogicalQuery, payload: &Payload) -> Option<PageInfo> {
        let (page, size) = (query.page(), query.page_size());
        let info = match payload {
            Payload::Movies(p) => PageInfo::from_page(p, page, size),
            Payload::People(p) => PageInfo::from_page(p, page, size),
            Payload::Genres(p) => PageInfo::from_page(p, page, size),
            Payload::Reviews(p) => PageInfo::from_page(p, page, size),
            Payload::Movie(_) | Payload::TopRatedMovies(_) | Payload::Person(_) | Payload::Genre(_) => {
                return None;
            }
        };
        Some(info)
    }

    fn fetch_fn(
        &self,
        query: &LogicalQuery,
    ) -> impl Fn() -> BoxFuture<'static, Result<Payload, CatalogApiError>> + Send + Sync + 'static
    {
        let fetcher = self.fetcher.clone();
        let query = query.clone();
        move || {
            let fetcher = fetcher.clone();
            let query = query.clone();
            async move { fetcher.fetch(&query).await }.boxed()
        }
    }
}
