//! HTTP client for the movie catalog REST API.

use crate::catalog::Fetcher;
use crate::catalog::errors::CatalogApiError;
use crate::catalog::json::parse_json_with_context;
use crate::catalog::models::{
    Genre, Movie, MovieDetail, Paginated, Payload, Person, Review,
};
use crate::query::key::{LogicalQuery, Resource};
use crate::utils::fmt_duration;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

pub struct CatalogApi {
    http: reqwest::Client,
    base_url: String,
}

impl CatalogApi {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, CatalogApiError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for `resource`, without query parameters.
    pub fn url_for(&self, resource: Resource) -> String {
        format!("{}{}", self.base_url, resource.path())
    }

    async fn get_json<T: DeserializeOwned>(&self, query: &LogicalQuery) -> Result<T, CatalogApiError> {
        let resource = query.resource();
        let url = self.url_for(resource);
        let params = query.params();
        let start = Instant::now();

        let response = self.http.get(&url).query(&params).send().await?;
        let status = response.status();
        let final_url = response.url().to_string();
        debug!(
            url = %final_url,
            status = status.as_u16(),
            duration = fmt_duration(start.elapsed()),
            "catalog response"
        );

        if status == StatusCode::NOT_FOUND {
            return Err(CatalogApiError::NotFound {
                resource: describe(resource),
            });
        }
        if !status.is_success() {
            return Err(CatalogApiError::Status {
                status: status.as_u16(),
                url: final_url,
            });
        }

        let body = response.text().await?;
        trace!(bytes = body.len(), "catalog body received");
        parse_json_with_context(&body).map_err(|source| CatalogApiError::ParseFailed {
            status: status.as_u16(),
            url: final_url,
            source,
        })
    }
}

#[async_trait]
impl Fetcher for CatalogApi {
    async fn fetch(&self, query: &LogicalQuery) -> Result<Payload, CatalogApiError> {
        let payload = match query.resource() {
            Resource::Movies | Resource::MoviesByGenre | Resource::MoviesByDirector => {
                Payload::Movies(self.get_json::<Paginated<Movie>>(query).await?)
            }
            Resource::Movie(_) => Payload::Movie(self.get_json::<MovieDetail>(query).await?),
            Resource::TopRatedMovies => {
                Payload::TopRatedMovies(self.get_json::<Vec<Movie>>(query).await?)
            }
            Resource::Actors | Resource::Directors => {
                Payload::People(self.get_json::<Paginated<Person>>(query).await?)
            }
            Resource::Actor(_) | Resource::Director(_) => {
                Payload::Person(self.get_json::<Person>(query).await?)
            }
            Resource::Genres => Payload::Genres(self.get_json::<Paginated<Genre>>(query).await?),
            Resource::Genre(_) => Payload::Genre(self.get_json::<Genre>(query).await?),
            Resource::Reviews | Resource::FeaturedReviews => {
                Payload::Reviews(self.get_json::<Paginated<Review>>(query).await?)
            }
        };
        Ok(payload)
    }
}

/// Human-readable name of the thing a 404 refers to.
fn describe(resource: Resource) -> String {
    match resource {
        Resource::Movie(id) => format!("movie {id}"),
        Resource::Actor(id) => format!("actor {id}"),
        Resource::Director(id) => format!("director {id}"),
        Resource::Genre(id) => format!("genre {id}"),
        other => format!("endpoint {}", other.path()),
    }
}
