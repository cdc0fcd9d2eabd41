//! Typed catalog queries and their canonical cache keys.
//!
//! A [`LogicalQuery`] is normalized as it is built: empty and whitespace-only
//! text is treated as absent, and numbers compare by value (`7` and `7.0` are
//! the same filter). Filters live in a sorted map, so insertion order never
//! reaches the key. Both the cache key and the HTTP query string are derived
//! from [`LogicalQuery::params`], so the two can never disagree.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use url::form_urlencoded;

/// Page size used when a query does not specify one.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// The entity a query is about. Used for coarse invalidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Movie,
    Actor,
    Director,
    Genre,
    Review,
}

/// An endpoint of the catalog API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Movies,
    Movie(u64),
    TopRatedMovies,
    MoviesByGenre,
    MoviesByDirector,
    Actors,
    Actor(u64),
    Directors,
    Director(u64),
    Genres,
    Genre(u64),
    Reviews,
    FeaturedReviews,
}

impl Resource {
    /// Request path relative to the API base URL.
    pub fn path(&self) -> String {
        match self {
            Self::Movies => "/movies/".into(),
            Self::Movie(id) => format!("/movies/{id}/"),
            Self::TopRatedMovies => "/movies/top_rated/".into(),
            Self::MoviesByGenre => "/movies/by_genre/".into(),
            Self::MoviesByDirector => "/movies/by_director/".into(),
            Self::Actors => "/actors/".into(),
            Self::Actor(id) => format!("/actors/{id}/"),
            Self::Directors => "/directors/".into(),
            Self::Director(id) => format!("/directors/{id}/"),
            Self::Genres => "/genres/".into(),
            Self::Genre(id) => format!("/genres/{id}/"),
            Self::Reviews => "/reviews/".into(),
            Self::FeaturedReviews => "/reviews/featured/".into(),
        }
    }

    pub fn entity(&self) -> EntityKind {
        match self {
            Self::Movies
            | Self::Movie(_)
            | Self::TopRatedMovies
            | Self::MoviesByGenre
            | Self::MoviesByDirector => EntityKind::Movie,
            Self::Actors | Self::Actor(_) => EntityKind::Actor,
            Self::Directors | Self::Director(_) => EntityKind::Director,
            Self::Genres | Self::Genre(_) => EntityKind::Genre,
            Self::Reviews | Self::FeaturedReviews => EntityKind::Review,
        }
    }

    /// Whether the endpoint returns `{count, next, previous, results}` and
    /// therefore takes page, page size and ordering.
    pub fn is_paginated(&self) -> bool {
        !matches!(
            self,
            Self::Movie(_) | Self::Actor(_) | Self::Director(_) | Self::Genre(_) | Self::TopRatedMovies
        )
    }

    /// Single-entity endpoints and their id.
    pub fn id(&self) -> Option<u64> {
        match self {
            Self::Movie(id) | Self::Actor(id) | Self::Director(id) | Self::Genre(id) => Some(*id),
            _ => None,
        }
    }
}

/// A normalized filter value.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Text(String),
    Int(i64),
    /// Always finite and never integral; integral numbers are stored as `Int`.
    Number(f64),
    Bool(bool),
}

impl FilterValue {
    fn text(value: &str) -> Option<Self> {
        if value.trim().is_empty() {
            None
        } else {
            Some(Self::Text(value.to_string()))
        }
    }

    fn number(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
            // Also folds -0.0 into 0.
            Some(Self::Int(value as i64))
        } else {
            Some(Self::Number(value))
        }
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Int(n) => write!(f, "{n}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Bool(b) => write!(f, "{b}"),
        }
    }
}

/// Filter parameters keyed by their API name, kept sorted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filters(BTreeMap<&'static str, FilterValue>);

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a text filter; `None`, `""` and whitespace-only strings clear it.
    pub fn set_text(&mut self, field: &'static str, value: Option<&str>) -> &mut Self {
        self.put(field, value.and_then(FilterValue::text))
    }

    pub fn set_int(&mut self, field: &'static str, value: Option<i64>) -> &mut Self {
        self.put(field, value.map(FilterValue::Int))
    }

    /// Set a numeric filter. Non-finite values clear it.
    pub fn set_number(&mut self, field: &'static str, value: Option<f64>) -> &mut Self {
        self.put(field, value.and_then(FilterValue::number))
    }

    pub fn set_bool(&mut self, field: &'static str, value: Option<bool>) -> &mut Self {
        self.put(field, value.map(FilterValue::Bool))
    }

    pub fn get(&self, field: &str) -> Option<&FilterValue> {
        self.0.get(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &FilterValue)> {
        self.0.iter().map(|(k, v)| (*k, v))
    }

    fn put(&mut self, field: &'static str, value: Option<FilterValue>) -> &mut Self {
        match value {
            Some(v) => {
                self.0.insert(field, v);
            }
            None => {
                self.0.remove(field);
            }
        }
        self
    }
}

/// Movie list filters as entered in the filter panel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MovieFilters {
    pub title: Option<String>,
    pub release_year: Option<i32>,
    pub release_year_gte: Option<i32>,
    pub release_year_lte: Option<i32>,
    pub director: Option<String>,
    pub director_id: Option<u64>,
    pub actor: Option<String>,
    pub actor_id: Option<u64>,
    pub genre: Option<String>,
    pub genre_id: Option<u64>,
    pub rating_gte: Option<f64>,
    pub rating_lte: Option<f64>,
}

impl MovieFilters {
    pub fn to_filters(&self) -> Filters {
        let mut f = Filters::new();
        f.set_text("title", self.title.as_deref())
            .set_int("release_year", self.release_year.map(i64::from))
            .set_int("release_year_gte", self.release_year_gte.map(i64::from))
            .set_int("release_year_lte", self.release_year_lte.map(i64::from))
            .set_text("director", self.director.as_deref())
            .set_int("director_id", self.director_id.map(id_to_i64))
            .set_text("actor", self.actor.as_deref())
            .set_int("actor_id", self.actor_id.map(id_to_i64))
            .set_text("genre", self.genre.as_deref())
            .set_int("genre_id", self.genre_id.map(id_to_i64))
            .set_number("rating_gte", self.rating_gte)
            .set_number("rating_lte", self.rating_lte);
        f
    }

    /// Whether any filter survives normalization.
    pub fn is_active(&self) -> bool {
        !self.to_filters().is_empty()
    }
}

/// Actor list filters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActorFilters {
    pub name: Option<String>,
    pub nationality: Option<String>,
    pub movie: Option<String>,
    pub movie_id: Option<u64>,
    pub genre: Option<String>,
    pub genre_id: Option<u64>,
}

impl ActorFilters {
    pub fn to_filters(&self) -> Filters {
        let mut f = Filters::new();
        f.set_text("name", self.name.as_deref())
            .set_text("nationality", self.nationality.as_deref())
            .set_text("movie", self.movie.as_deref())
            .set_int("movie_id", self.movie_id.map(id_to_i64))
            .set_text("genre", self.genre.as_deref())
            .set_int("genre_id", self.genre_id.map(id_to_i64));
        f
    }
}

/// Director list filters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DirectorFilters {
    pub name: Option<String>,
    pub nationality: Option<String>,
    pub movie: Option<String>,
    pub movie_id: Option<u64>,
}

impl DirectorFilters {
    pub fn to_filters(&self) -> Filters {
        let mut f = Filters::new();
        f.set_text("name", self.name.as_deref())
            .set_text("nationality", self.nationality.as_deref())
            .set_text("movie", self.movie.as_deref())
            .set_int("movie_id", self.movie_id.map(id_to_i64));
        f
    }
}

/// Review list filters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewFilters {
    pub movie: Option<String>,
    pub movie_id: Option<u64>,
    pub reviewer_name: Option<String>,
    pub rating: Option<u8>,
    pub rating_gte: Option<u8>,
    pub rating_lte: Option<u8>,
    pub is_featured: Option<bool>,
}

impl ReviewFilters {
    pub fn to_filters(&self) -> Filters {
        let mut f = Filters::new();
        f.set_text("movie", self.movie.as_deref())
            .set_int("movie_id", self.movie_id.map(id_to_i64))
            .set_text("reviewer_name", self.reviewer_name.as_deref())
            .set_int("rating", self.rating.map(i64::from))
            .set_int("rating_gte", self.rating_gte.map(i64::from))
            .set_int("rating_lte", self.rating_lte.map(i64::from))
            .set_bool("is_featured", self.is_featured);
        f
    }
}

fn id_to_i64(id: u64) -> i64 {
    i64::try_from(id).unwrap_or(i64::MAX)
}

/// Fields the movie list can be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortField {
    Title,
    ReleaseYear,
    Rating,
    CreatedAt,
}

impl SortField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::ReleaseYear => "release_year",
            Self::Rating => "rating",
            Self::CreatedAt => "created_at",
        }
    }
}

/// An ordering token such as `-release_year`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SortOrder {
    pub field: SortField,
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown ordering field `{0}`")]
pub struct UnknownSortField(pub String);

impl SortOrder {
    pub fn asc(field: SortField) -> Self {
        Self {
            field,
            descending: false,
        }
    }

    pub fn desc(field: SortField) -> Self {
        Self {
            field,
            descending: true,
        }
    }

    /// Parse a raw ordering token. The empty token means default ordering.
    pub fn parse_token(token: &str) -> Result<Option<Self>, UnknownSortField> {
        let token = token.trim();
        if token.is_empty() {
            return Ok(None);
        }
        token.parse().map(Some)
    }
}

impl FromStr for SortOrder {
    type Err = UnknownSortField;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (descending, name) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let field = match name {
            "title" => SortField::Title,
            "release_year" => SortField::ReleaseYear,
            "rating" => SortField::Rating,
            "created_at" => SortField::CreatedAt,
            other => return Err(UnknownSortField(other.to_string())),
        };
        Ok(Self { field, descending })
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.descending {
            f.write_str("-")?;
        }
        f.write_str(self.field.as_str())
    }
}

/// Everything that determines what a catalog request returns.
#[derive(Debug, Clone, PartialEq)]
pub struct LogicalQuery {
    resource: Resource,
    filters: Filters,
    page: u32,
    page_size: u32,
    ordering: Option<SortOrder>,
}

impl LogicalQuery {
    pub fn new(resource: Resource) -> Self {
        Self {
            resource,
            filters: Filters::new(),
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            ordering: None,
        }
    }

    pub fn movies(filters: &MovieFilters) -> Self {
        Self::new(Resource::Movies).with_filters(filters.to_filters())
    }

    pub fn actors(filters: &ActorFilters) -> Self {
        Self::new(Resource::Actors).with_filters(filters.to_filters())
    }

    pub fn directors(filters: &DirectorFilters) -> Self {
        Self::new(Resource::Directors).with_filters(filters.to_filters())
    }

    pub fn reviews(filters: &ReviewFilters) -> Self {
        Self::new(Resource::Reviews).with_filters(filters.to_filters())
    }

    /// `/movies/by_genre/?name=...`
    pub fn movies_by_genre(name: &str) -> Self {
        let mut filters = Filters::new();
        filters.set_text("name", Some(name));
        Self::new(Resource::MoviesByGenre).with_filters(filters)
    }

    /// `/movies/by_director/?name=...`
    pub fn movies_by_director(name: &str) -> Self {
        let mut filters = Filters::new();
        filters.set_text("name", Some(name));
        Self::new(Resource::MoviesByDirector).with_filters(filters)
    }

    pub fn with_filters(mut self, filters: Filters) -> Self {
        self.filters = filters;
        self
    }

    /// Page numbers start at 1; 0 is clamped.
    pub fn with_page(mut self, page: u32) -> Self {
        self.page = page.max(1);
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_ordering(mut self, ordering: Option<SortOrder>) -> Self {
        self.ordering = ordering;
        self
    }

    pub fn resource(&self) -> Resource {
        self.resource
    }

    pub fn filters(&self) -> &Filters {
        &self.filters
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn ordering(&self) -> Option<SortOrder> {
        self.ordering
    }

    /// Normalized request parameters, sorted by name.
    ///
    /// Single-entity endpoints and the top-rated list ignore page, page size
    /// and ordering, so those never split their cache entries.
    pub fn params(&self) -> Vec<(&'static str, String)> {
        let mut params: BTreeMap<&'static str, String> = self
            .filters
            .iter()
            .map(|(k, v)| (k, v.to_string()))
            .collect();

        if self.resource.is_paginated() {
            params.insert("page", self.page.to_string());
            params.insert("page_size", self.page_size.to_string());
            if let Some(ordering) = self.ordering {
                params.insert("ordering", ordering.to_string());
            }
        }

        params.into_iter().collect()
    }

    /// Canonical cache key: the request path followed by the encoded params.
    pub fn key(&self) -> CacheKey {
        let params = self.params();
        let path = self.resource.path();
        let repr = if params.is_empty() {
            path
        } else {
            let query = form_urlencoded::Serializer::new(String::new())
                .extend_pairs(params.iter().map(|(k, v)| (*k, v.as_str())))
                .finish();
            format!("{path}?{query}")
        };
        CacheKey {
            resource: self.resource,
            repr: Arc::from(repr),
        }
    }
}

/// Stable identity of a [`LogicalQuery`]. Cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    resource: Resource,
    repr: Arc<str>,
}

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.repr
    }

    pub fn resource(&self) -> Resource {
        self.resource
    }

    pub fn entity(&self) -> EntityKind {
        self.resource.entity()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_strings_and_absent_fields_share_a_key() {
        let blank = MovieFilters {
            title: Some(String::new()),
            director: Some("   ".into()),
            genre: None,
            ..Default::default()
        };
        let absent = MovieFilters::default();

        assert_eq!(
            LogicalQuery::movies(&blank).key(),
            LogicalQuery::movies(&absent).key()
        );
        assert!(!blank.is_active());
    }

    #[test]
    fn insertion_order_does_not_matter() {
        let mut a = Filters::new();
        a.set_text("genre", Some("Drama")).set_int("release_year_gte", Some(1990));
        let mut b = Filters::new();
        b.set_int("release_year_gte", Some(1990)).set_text("genre", Some("Drama"));

        let qa = LogicalQuery::new(Resource::Movies).with_filters(a);
        let qb = LogicalQuery::new(Resource::Movies).with_filters(b);
        assert_eq!(qa.key(), qb.key());
        assert_eq!(qa, qb);
    }

    #[test]
    fn numbers_compare_by_value() {
        let seven = MovieFilters {
            rating_gte: Some(7.0),
            ..Default::default()
        };
        let mut explicit = Filters::new();
        explicit.set_int("rating_gte", Some(7));

        assert_eq!(
            LogicalQuery::movies(&seven).key(),
            LogicalQuery::new(Resource::Movies).with_filters(explicit).key()
        );

        let mut zero = Filters::new();
        zero.set_number("rating_gte", Some(-0.0));
        assert_eq!(zero.get("rating_gte"), Some(&FilterValue::Int(0)));

        let mut nan = Filters::new();
        nan.set_number("rating_gte", Some(f64::NAN));
        assert!(nan.is_empty());
    }

    #[test]
    fn fractional_numbers_keep_their_value() {
        let q = LogicalQuery::movies(&MovieFilters {
            rating_gte: Some(7.5),
            ..Default::default()
        });
        assert_eq!(
            q.key().as_str(),
            "/movies/?page=1&page_size=20&rating_gte=7.5"
        );
    }

    #[test]
    fn key_includes_paging_and_ordering() {
        let base = LogicalQuery::movies(&MovieFilters::default());
        let paged = base.clone().with_page(2);
        let sized = base.clone().with_page_size(50);
        let sorted = base
            .clone()
            .with_ordering(Some(SortOrder::desc(SortField::Rating)));

        assert_ne!(base.key(), paged.key());
        assert_ne!(base.key(), sized.key());
        assert_ne!(base.key(), sorted.key());
        assert_eq!(
            sorted.key().as_str(),
            "/movies/?ordering=-rating&page=1&page_size=20"
        );
    }

    #[test]
    fn detail_keys_ignore_paging() {
        let a = LogicalQuery::new(Resource::Movie(42));
        let b = LogicalQuery::new(Resource::Movie(42))
            .with_page(3)
            .with_page_size(100);
        assert_eq!(a.key(), b.key());
        assert_eq!(a.key().as_str(), "/movies/42/");
        assert!(a.params().is_empty());
    }

    #[test]
    fn text_values_are_encoded() {
        let q = LogicalQuery::movies_by_director("Agnès Varda");
        assert_eq!(
            q.key().as_str(),
            "/movies/by_director/?name=Agn%C3%A8s+Varda&page=1&page_size=20"
        );
        assert_eq!(q.key().entity(), EntityKind::Movie);
    }

    #[test]
    fn page_zero_is_clamped() {
        assert_eq!(LogicalQuery::new(Resource::Genres).with_page(0).page(), 1);
    }

    #[test]
    fn ordering_tokens_round_trip() {
        assert_eq!(SortOrder::parse_token("").unwrap(), None);
        assert_eq!(
            SortOrder::parse_token("-release_year").unwrap(),
            Some(SortOrder::desc(SortField::ReleaseYear))
        );
        assert_eq!(SortOrder::asc(SortField::Title).to_string(), "title");
        assert!(SortOrder::parse_token("budget").is_err());
    }

    #[test]
    fn review_filters_include_booleans() {
        let q = LogicalQuery::reviews(&ReviewFilters {
            movie_id: Some(3),
            is_featured: Some(true),
            ..Default::default()
        });
        let params = q.params();
        assert!(params.contains(&("is_featured", "true".to_string())));
        assert!(params.contains(&("movie_id", "3".to_string())));
    }
}
