//! Plain-text rendering of catalog payloads for the terminal.

use crate::catalog::models::{Genre, Movie, MovieDetail, Payload, Person, Review};
use crate::favorites::FavoriteRecord;
use crate::pagination::PageInfo;
use crate::query::{CacheStatus, QueryResult};
use std::fmt::Write;
use yansi::Paint;

fn rating(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |r| format!("{r:.1}"))
}

pub fn movie_line(movie: &Movie, favorite: bool) -> String {
    let star = if favorite { "★ ".yellow().to_string() } else { "  ".to_string() };
    let mut line = format!(
        "{star}{:>5}  {} ({})  {}",
        movie.id,
        movie.title.bold(),
        movie.release_year,
        rating(movie.rating).cyan()
    );
    if !movie.director_name.is_empty() {
        let _ = write!(line, "  {}", movie.director_name.dim());
    }
    if !movie.genres.is_empty() {
        let _ = write!(line, "  [{}]", movie.genres.join(", "));
    }
    line
}

pub fn movie_detail(movie: &MovieDetail, favorite: bool) -> String {
    let mut out = String::new();
    let star = if favorite { " ★".yellow().to_string() } else { String::new() };
    let _ = writeln!(out, "{} ({}){star}", movie.title.bold(), movie.release_year);
    let _ = writeln!(
        out,
        "Directed by {}  ·  rating {}  ·  {} reviews (avg {})",
        movie.director.name,
        rating(movie.rating),
        movie.review_count,
        rating(movie.average_rating)
    );
    if let Some(minutes) = movie.duration {
        let _ = writeln!(out, "{minutes} min");
    }
    if !movie.genres.is_empty() {
        let names: Vec<_> = movie.genres.iter().map(|g| g.name.as_str()).collect();
        let _ = writeln!(out, "Genres: {}", names.join(", "));
    }
    if let Some(plot) = movie.plot.as_deref().filter(|p| !p.trim().is_empty()) {
        let _ = writeln!(out, "\n{plot}");
    }
    if !movie.actors.is_empty() {
        let _ = writeln!(out, "\nCast:");
        for actor in &movie.actors {
            let _ = writeln!(out, "  {}", actor.name);
        }
    }
    if !movie.reviews.is_empty() {
        let _ = writeln!(out, "\nReviews:");
        for review in &movie.reviews {
            out.push_str(&review_line(review));
            out.push('\n');
        }
    }
    out
}

pub fn person_line(person: &Person) -> String {
    let mut line = format!("{:>5}  {}", person.id, person.name.bold());
    if !person.nationality.is_empty() {
        let _ = write!(line, "  {}", person.nationality.dim());
    }
    let _ = write!(line, "  {} movies", person.movies_count);
    line
}

pub fn person_detail(person: &Person, is_favorite: impl Fn(u64) -> bool) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", person.name.bold());
    if let Some(born) = person.birth_date {
        let _ = writeln!(out, "Born {born}");
    }
    if !person.nationality.is_empty() {
        let _ = writeln!(out, "{}", person.nationality);
    }
    if !person.biography.trim().is_empty() {
        let _ = writeln!(out, "\n{}", person.biography);
    }
    if !person.movies.is_empty() {
        let _ = writeln!(out, "\nMovies:");
        for movie in &person.movies {
            let _ = writeln!(out, "{}", movie_line(movie, is_favorite(movie.id)));
        }
    }
    out
}

pub fn genre_line(genre: &Genre) -> String {
    format!("{:>5}  {}  {} movies", genre.id, genre.name.bold(), genre.movies_count)
}

pub fn review_line(review: &Review) -> String {
    let featured = if review.is_featured { " ✦".magenta().to_string() } else { String::new() };
    let mut line = format!(
        "  {}/10  {}{featured}",
        review.rating,
        review.reviewer_name.bold()
    );
    if !review.comment.trim().is_empty() {
        let _ = write!(line, ": {}", review.comment);
    }
    line
}

pub fn favorite_line(record: &FavoriteRecord) -> String {
    format!(
        "{:>5}  {} ({})  {}",
        record.id,
        record.title.bold(),
        record.release_year,
        record.director_name.dim()
    )
}

/// Every line of a payload. Movies already in favorites get a star.
pub fn payload(payload: &Payload, is_favorite: impl Fn(u64) -> bool) -> String {
    let lines: Vec<String> = match payload {
        Payload::Movies(page) => page
            .results
            .iter()
            .map(|m| movie_line(m, is_favorite(m.id)))
            .collect(),
        Payload::TopRatedMovies(movies) => movies
            .iter()
            .map(|m| movie_line(m, is_favorite(m.id)))
            .collect(),
        Payload::Movie(movie) => return movie_detail(movie, is_favorite(movie.id)),
        Payload::People(page) => page.results.iter().map(person_line).collect(),
        Payload::Person(person) => return person_detail(person, is_favorite),
        Payload::Genres(page) => page.results.iter().map(genre_line).collect(),
        Payload::Genre(genre) => {
            let mut out = genre_line(genre);
            if let Some(description) = genre.description.as_deref() {
                let _ = write!(out, "\n\n{description}");
            }
            return out;
        }
        Payload::Reviews(page) => page.results.iter().map(review_line).collect(),
    };
    if lines.is_empty() {
        return "No results.".dim().to_string();
    }
    lines.join("\n")
}

/// Result count and page window, e.g. `45 results  ·  page 2 of 3  ·  1 [2] 3`.
pub fn pager(info: &PageInfo, spread: u32) -> String {
    let mut out = format!(
        "{} results  ·  page {} of {}",
        info.count,
        info.current,
        info.total_pages.max(1)
    );
    if info.should_render() {
        let _ = write!(out, "  ·  {}", info.window(spread));
    }
    out
}

/// One-line status for a cache result that carries no payload.
pub fn status<E: std::fmt::Display>(result: &QueryResult<Payload, E>) -> Option<String> {
    match (&result.data, result.status) {
        (None, _) if result.is_fetching => Some("Loading…".dim().to_string()),
        (None, _) => Some(match &result.error {
            Some(e) => format!("{} {e}", "error:".red().bold()),
            None => "No data.".to_string(),
        }),
        (Some(_), CacheStatus::Stale) if result.error.is_some() => Some(format!(
            "{} showing cached results, refresh failed",
            "warning:".yellow().bold()
        )),
        _ => None,
    }
}
