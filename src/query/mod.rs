//! Request keys, the shared query cache, and the helpers built on top of it.

pub mod cache;
pub mod debounce;
pub mod key;
pub mod observer;

pub use cache::{CachePolicy, CacheStatus, QueryCache, QueryResult, Retryable};
pub use debounce::Debouncer;
pub use key::{
    ActorFilters, CacheKey, DirectorFilters, EntityKind, FilterValue, Filters, LogicalQuery,
    MovieFilters, Resource, ReviewFilters, SortField, SortOrder,
};
pub use observer::{Observation, QueryObserver};
