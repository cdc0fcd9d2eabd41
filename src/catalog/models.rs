//! Typed payloads returned by the catalog REST API.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

pub type MovieId = u64;

/// A page of results from a list endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub count: u64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

impl<T> Paginated<T> {
    pub fn has_next(&self) -> bool {
        self.next.is_some()
    }

    pub fn has_previous(&self) -> bool {
        self.previous.is_some()
    }
}

/// Movie as it appears in list responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movie {
    pub id: MovieId,
    pub title: String,
    pub release_year: i32,
    #[serde(default, deserialize_with = "decimal_opt")]
    pub rating: Option<f64>,
    #[serde(default)]
    pub poster_url: Option<String>,
    #[serde(default)]
    pub backdrop_url: Option<String>,
    #[serde(default)]
    pub director_name: String,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default, deserialize_with = "decimal_opt")]
    pub average_rating: Option<f64>,
    #[serde(default)]
    pub review_count: u32,
    #[serde(default)]
    pub duration: Option<u32>,
    #[serde(default)]
    pub plot: Option<String>,
}

/// Movie detail with its director, cast and reviews inlined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovieDetail {
    pub id: MovieId,
    pub title: String,
    pub release_year: i32,
    #[serde(default, deserialize_with = "decimal_opt")]
    pub rating: Option<f64>,
    #[serde(default)]
    pub poster_url: Option<String>,
    #[serde(default)]
    pub backdrop_url: Option<String>,
    #[serde(default)]
    pub duration: Option<u32>,
    #[serde(default)]
    pub plot: Option<String>,
    pub director: Person,
    #[serde(default)]
    pub actors: Vec<Person>,
    #[serde(default)]
    pub genres: Vec<Genre>,
    #[serde(default)]
    pub reviews: Vec<Review>,
    #[serde(default, deserialize_with = "decimal_opt")]
    pub average_rating: Option<f64>,
    #[serde(default)]
    pub review_count: u32,
}

/// Actor or director. Both share one shape on the wire; detail endpoints
/// additionally fill `movies`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub birth_date: Option<NaiveDate>,
    #[serde(default)]
    pub nationality: String,
    #[serde(default)]
    pub biography: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub movies_count: u32,
    #[serde(default)]
    pub movies: Vec<Movie>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Genre {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub movies_count: u32,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: u64,
    #[serde(default)]
    pub movie: Option<MovieId>,
    pub reviewer_name: String,
    pub rating: u8,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub is_featured: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Any successful catalog response, tagged by the endpoint that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Payload {
    Movies(Paginated<Movie>),
    Movie(MovieDetail),
    TopRatedMovies(Vec<Movie>),
    People(Paginated<Person>),
    Person(Person),
    Genres(Paginated<Genre>),
    Genre(Genre),
    Reviews(Paginated<Review>),
}

impl Payload {
    pub fn as_movies(&self) -> Option<&Paginated<Movie>> {
        match self {
            Self::Movies(page) => Some(page),
            _ => None,
        }
    }

    pub fn as_movie(&self) -> Option<&MovieDetail> {
        match self {
            Self::Movie(movie) => Some(movie),
            _ => None,
        }
    }

    pub fn as_people(&self) -> Option<&Paginated<Person>> {
        match self {
            Self::People(page) => Some(page),
            _ => None,
        }
    }

    pub fn as_person(&self) -> Option<&Person> {
        match self {
            Self::Person(person) => Some(person),
            _ => None,
        }
    }

    pub fn as_genres(&self) -> Option<&Paginated<Genre>> {
        match self {
            Self::Genres(page) => Some(page),
            _ => None,
        }
    }

    pub fn as_genre(&self) -> Option<&Genre> {
        match self {
            Self::Genre(genre) => Some(genre),
            _ => None,
        }
    }

    pub fn as_top_rated(&self) -> Option<&[Movie]> {
        match self {
            Self::TopRatedMovies(movies) => Some(movies),
            _ => None,
        }
    }

    pub fn as_reviews(&self) -> Option<&Paginated<Review>> {
        match self {
            Self::Reviews(page) => Some(page),
            _ => None,
        }
    }

    /// Total result count for paginated payloads.
    pub fn count(&self) -> Option<u64> {
        match self {
            Self::Movies(page) => Some(page.count),
            Self::People(page) => Some(page.count),
            Self::Genres(page) => Some(page.count),
            Self::Reviews(page) => Some(page.count),
            Self::TopRatedMovies(movies) => Some(movies.len() as u64),
            Self::Movie(_) | Self::Person(_) | Self::Genre(_) => None,
        }
    }

    /// `(has_next, has_previous)` for paginated payloads.
    pub fn links(&self) -> Option<(bool, bool)> {
        match self {
            Self::Movies(page) => Some((page.has_next(), page.has_previous())),
            Self::People(page) => Some((page.has_next(), page.has_previous())),
            Self::Genres(page) => Some((page.has_next(), page.has_previous())),
            Self::Reviews(page) => Some((page.has_next(), page.has_previous())),
            _ => None,
        }
    }
}

/// Decimal fields are serialized as strings by the API (`"8.5"`) but fixtures
/// and older deployments send plain numbers. Accept both.
fn decimal_opt<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Number(n)) => Ok(Some(n)),
        Some(Raw::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(Raw::Text(s)) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn movie_accepts_string_and_numeric_ratings() {
        let json = r#"{
            "id": 1, "title": "Heat", "release_year": 1995,
            "rating": "8.3", "average_rating": 4.5,
            "poster_url": null, "director_name": "Michael Mann",
            "genres": ["Crime"], "review_count": 2
        }"#;
        let movie: Movie = serde_json::from_str(json).unwrap();
        assert_eq!(movie.rating, Some(8.3));
        assert_eq!(movie.average_rating, Some(4.5));
        assert_eq!(movie.poster_url, None);
    }

    #[test]
    fn missing_optional_fields_default() {
        let json = r#"{"id": 7, "title": "Alien", "release_year": 1979}"#;
        let movie: Movie = serde_json::from_str(json).unwrap();
        assert_eq!(movie.rating, None);
        assert!(movie.genres.is_empty());
        assert_eq!(movie.director_name, "");
    }

    #[test]
    fn paginated_links() {
        let json = r#"{"count": 45, "next": "http://x/movies/?page=2", "previous": null, "results": []}"#;
        let page: Paginated<Movie> = serde_json::from_str(json).unwrap();
        assert!(page.has_next());
        assert!(!page.has_previous());

        let payload = Payload::Movies(page);
        assert_eq!(payload.count(), Some(45));
        assert_eq!(payload.links(), Some((true, false)));
    }

    #[test]
    fn person_detail_with_movies() {
        let json = r#"{
            "id": 3, "name": "Sigourney Weaver", "birth_date": "1949-10-08",
            "nationality": "American", "biography": "", "image_url": null,
            "movies_count": 1,
            "movies": [{"id": 7, "title": "Alien", "release_year": 1979}],
            "created_at": "2024-01-01T00:00:00Z", "updated_at": "2024-01-01T00:00:00Z"
        }"#;
        let person: Person = serde_json::from_str(json).unwrap();
        assert_eq!(person.movies.len(), 1);
        assert_eq!(
            person.birth_date,
            NaiveDate::from_ymd_opt(1949, 10, 8)
        );
    }

    fn empty<T>(count: u64) -> Paginated<T> {
        Paginated {
            count,
            next: None,
            previous: None,
            results: Vec::new(),
        }
    }

    #[test]
    fn payload_accessors_match_their_variant() {
        let person: Person = serde_json::from_str(r#"{"id": 3, "name": "Agnès Varda"}"#).unwrap();
        let genre = Genre {
            id: 1,
            name: "Drama".to_string(),
            description: None,
            movies_count: 0,
            created_at: None,
            updated_at: None,
        };

        let people = Payload::People(Paginated {
            results: vec![person.clone()],
            ..empty(1)
        });
        assert_eq!(people.as_people().map(|p| p.results.len()), Some(1));
        assert!(people.as_person().is_none());

        let single = Payload::Person(person);
        assert_eq!(single.as_person().map(|p| p.name.as_str()), Some("Agnès Varda"));
        assert!(single.as_people().is_none());
        assert_eq!(single.count(), None);

        assert_eq!(Payload::Genres(empty(4)).as_genres().map(|p| p.count), Some(4));
        assert_eq!(Payload::Genre(genre).as_genre().map(|g| g.id), Some(1));
        assert_eq!(Payload::Reviews(empty(9)).as_reviews().map(|p| p.count), Some(9));

        let top = Payload::TopRatedMovies(Vec::new());
        assert_eq!(top.as_top_rated(), Some(&[][..]));
        assert!(top.as_movies().is_none());
        assert_eq!(top.links(), None);
    }
}
