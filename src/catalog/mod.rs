//! Movie catalog REST client and its data types.

pub mod api;
pub mod errors;
pub mod json;
pub mod models;

pub use api::CatalogApi;
pub use errors::CatalogApiError;
pub use models::{Genre, Movie, MovieDetail, MovieId, Paginated, Payload, Person, Review};

use crate::query::key::LogicalQuery;
use async_trait::async_trait;

/// Anything that can answer a [`LogicalQuery`].
///
/// The HTTP client is the production implementation; tests substitute a
/// scripted one.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, query: &LogicalQuery) -> Result<Payload, CatalogApiError>;
}
