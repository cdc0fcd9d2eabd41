use crate::catalog::MovieId;
use crate::query::key::{ActorFilters, DirectorFilters, MovieFilters, ReviewFilters, SortOrder};
use crate::state::Paging;
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};

/// Browse a movie catalog from the terminal.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Log output format
    #[arg(long, value_enum, default_value_t = default_tracing_format(), global = true)]
    pub tracing: TracingFormat,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum TracingFormat {
    /// Human-readable, compact log lines
    Pretty,
    /// One JSON object per event
    Json,
}

/// Pretty in debug builds, JSON in release builds.
fn default_tracing_format() -> TracingFormat {
    if cfg!(debug_assertions) {
        TracingFormat::Pretty
    } else {
        TracingFormat::Json
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List movies
    Movies(MoviesArgs),
    /// Show one movie with its cast and reviews
    Movie {
        /// Movie id as it would appear in a route
        id: String,
    },
    /// The ten highest rated movies
    TopRated,
    /// List actors
    Actors(PeopleArgs),
    /// Show one actor and their movies
    Actor { id: u64 },
    /// List directors
    Directors(PeopleArgs),
    /// Show one director and their movies
    Director { id: u64 },
    /// List genres
    Genres {
        #[arg(long)]
        name: Option<String>,
        #[command(flatten)]
        paging: PagingArgs,
    },
    /// List reviews
    Reviews(ReviewsArgs),
    /// Manage favorite movies
    #[command(subcommand)]
    Favorites(FavoritesCommand),
    /// Search movies by title, one keystroke per stdin line
    Search,
}

#[derive(ClapArgs, Debug, Default)]
pub struct PagingArgs {
    /// Page number, starting at 1
    #[arg(long, default_value_t = 1)]
    pub page: u32,
    /// Results per page
    #[arg(long)]
    pub page_size: Option<u32>,
    /// Sort token such as `-rating` or `title`
    #[arg(long, allow_hyphen_values = true)]
    pub ordering: Option<SortOrder>,
}

impl PagingArgs {
    pub fn paging(&self) -> Paging {
        Paging {
            page: self.page,
            page_size: self.page_size,
            ordering: self.ordering,
        }
    }
}

#[derive(ClapArgs, Debug, Default)]
pub struct MoviesArgs {
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long)]
    pub genre: Option<String>,
    #[arg(long)]
    pub director: Option<String>,
    #[arg(long)]
    pub actor: Option<String>,
    /// Exact release year
    #[arg(long)]
    pub year: Option<i32>,
    /// Released in or after this year
    #[arg(long)]
    pub year_from: Option<i32>,
    /// Released in or before this year
    #[arg(long)]
    pub year_to: Option<i32>,
    #[arg(long)]
    pub min_rating: Option<f64>,
    #[arg(long)]
    pub max_rating: Option<f64>,
    #[command(flatten)]
    pub paging: PagingArgs,
}

impl MoviesArgs {
    pub fn filters(&self) -> MovieFilters {
        MovieFilters {
            title: self.title.clone(),
            release_year: self.year,
            release_year_gte: self.year_from,
            release_year_lte: self.year_to,
            director: self.director.clone(),
            actor: self.actor.clone(),
            genre: self.genre.clone(),
            rating_gte: self.min_rating,
            rating_lte: self.max_rating,
            ..MovieFilters::default()
        }
    }
}

#[derive(ClapArgs, Debug, Default)]
pub struct PeopleArgs {
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub nationality: Option<String>,
    /// Title of a movie they worked on
    #[arg(long)]
    pub movie: Option<String>,
    #[command(flatten)]
    pub paging: PagingArgs,
}

impl PeopleArgs {
    pub fn actor_filters(&self) -> ActorFilters {
        ActorFilters {
            name: self.name.clone(),
            nationality: self.nationality.clone(),
            movie: self.movie.clone(),
            ..ActorFilters::default()
        }
    }

    pub fn director_filters(&self) -> DirectorFilters {
        DirectorFilters {
            name: self.name.clone(),
            nationality: self.nationality.clone(),
            movie: self.movie.clone(),
            ..DirectorFilters::default()
        }
    }
}

#[derive(ClapArgs, Debug, Default)]
pub struct ReviewsArgs {
    #[arg(long)]
    pub movie_id: Option<MovieId>,
    #[arg(long)]
    pub reviewer: Option<String>,
    #[arg(long)]
    pub min_rating: Option<u8>,
    /// Only featured reviews
    #[arg(long)]
    pub featured: bool,
    #[command(flatten)]
    pub paging: PagingArgs,
}

impl ReviewsArgs {
    pub fn filters(&self) -> ReviewFilters {
        ReviewFilters {
            movie_id: self.movie_id,
            reviewer_name: self.reviewer.clone(),
            rating_gte: self.min_rating,
            ..ReviewFilters::default()
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum FavoritesCommand {
    /// Show favorites in the order they were added
    List,
    /// Add a movie by id
    Add { id: MovieId },
    /// Remove a movie by id
    Remove { id: MovieId },
    /// Add the movie if missing, remove it otherwise
    Toggle { id: MovieId },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::key::SortField;

    #[test]
    fn movies_arguments_map_to_filters() {
        let args = Args::try_parse_from([
            "marquee",
            "movies",
            "--genre",
            "Drama",
            "--year-from",
            "1990",
            "--ordering",
            "-rating",
            "--page",
            "2",
        ])
        .unwrap();

        let Command::Movies(movies) = args.command else {
            panic!("expected the movies command");
        };
        let filters = movies.filters();
        assert_eq!(filters.genre.as_deref(), Some("Drama"));
        assert_eq!(filters.release_year_gte, Some(1990));

        let paging = movies.paging.paging();
        assert_eq!(paging.page, 2);
        assert_eq!(paging.ordering, Some(SortOrder::desc(SortField::Rating)));
    }

    #[test]
    fn unknown_ordering_is_rejected() {
        let err = Args::try_parse_from(["marquee", "movies", "--ordering", "budget"]);
        assert!(err.is_err());
    }

    #[test]
    fn favorites_subcommands_parse() {
        let args = Args::try_parse_from(["marquee", "--tracing", "json", "favorites", "toggle", "7"]).unwrap();
        assert_eq!(args.tracing, TracingFormat::Json);
        assert!(matches!(
            args.command,
            Command::Favorites(FavoritesCommand::Toggle { id: 7 })
        ));
    }
}
