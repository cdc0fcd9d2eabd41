use crate::catalog::{CatalogApi, CatalogApiError, Payload};
use crate::cli::{Command, FavoritesCommand};
use crate::config::Config;
use crate::favorites::{FavoriteRecord, FavoritesStore, JsonFileStorage, Toggled};
use crate::query::key::{LogicalQuery, MovieFilters, Resource};
use crate::query::{Debouncer, Observation};
use crate::render;
use crate::state::{CatalogResult, Explorer, Paging};
use crate::utils::fmt_duration;
use anyhow::{Context, Result, anyhow};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn};

/// Main application struct containing all necessary components
pub struct App {
    config: Config,
    explorer: Explorer,
}

impl App {
    pub async fn new(config: Config) -> Result<Self> {
        let start = Instant::now();
        let api = CatalogApi::new(&config.api_base_url, config.request_timeout)
            .context("Failed to create catalog client")?;
        let page_sizes = config
            .page_sizes()
            .context("Default page size is not one of the page size options")?;

        let storage = Arc::new(JsonFileStorage::new(config.favorites_path.clone()));
        let favorites = Arc::new(FavoritesStore::load(storage).await);

        let explorer = Explorer::new(
            Arc::new(api),
            config.cache_policy(),
            favorites,
            page_sizes,
            config.pagination_spread,
        );

        info!(
            api_base_url = %config.api_base_url,
            favorites_path = %config.favorites_path.display(),
            stale_after = fmt_duration(config.cache_stale_after),
            duration = fmt_duration(start.elapsed()),
            "explorer initialized"
        );
        Ok(Self { config, explorer })
    }

    pub fn explorer(&self) -> &Explorer {
        &self.explorer
    }

    /// Run one command and map its outcome to an exit code.
    pub async fn run(self, command: Command) -> ExitCode {
        match self.execute(command).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!(error = ?e, "command failed");
                eprintln!("error: {e:#}");
                ExitCode::FAILURE
            }
        }
    }

    async fn execute(&self, command: Command) -> Result<()> {
        let explorer = &self.explorer;
        match command {
            Command::Movies(args) => {
                let query = explorer.paged(LogicalQuery::movies(&args.filters()), args.paging.paging());
                self.print_list(&query, explorer.load(&query).await)
            }
            Command::Movie { id } => match explorer.movie_by_route_id(&id).await {
                Some(result) => self.print_result(result),
                None => Err(anyhow!("movie `{id}` not found")),
            },
            Command::TopRated => {
                self.print_result(explorer.load(&LogicalQuery::new(Resource::TopRatedMovies)).await)
            }
            Command::Actors(args) => {
                let query = explorer.paged(LogicalQuery::actors(&args.actor_filters()), args.paging.paging());
                self.print_list(&query, explorer.load(&query).await)
            }
            Command::Actor { id } => {
                self.print_result(explorer.load(&LogicalQuery::new(Resource::Actor(id))).await)
            }
            Command::Directors(args) => {
                let query = explorer.paged(
                    LogicalQuery::directors(&args.director_filters()),
                    args.paging.paging(),
                );
                self.print_list(&query, explorer.load(&query).await)
            }
            Command::Director { id } => {
                self.print_result(explorer.load(&LogicalQuery::new(Resource::Director(id))).await)
            }
            Command::Genres { name, paging } => {
                let result = explorer.genres(name.as_deref(), paging.paging()).await;
                self.print_result(result)
            }
            Command::Reviews(args) => {
                let base = if args.featured {
                    LogicalQuery::new(Resource::FeaturedReviews)
                } else {
                    LogicalQuery::reviews(&args.filters())
                };
                let query = explorer.paged(base, args.paging.paging());
                self.print_list(&query, explorer.load(&query).await)
            }
            Command::Favorites(command) => self.favorites(command).await,
            Command::Search => self.search().await,
        }
    }

    async fn favorites(&self, command: FavoritesCommand) -> Result<()> {
        let store = self.explorer.favorites();
        match command {
            FavoritesCommand::List => {
                if store.is_empty() {
                    println!("No favorites yet.");
                }
                for record in store.list() {
                    println!("{}", render::favorite_line(&record));
                }
            }
            FavoritesCommand::Add { id } => {
                let record = self.favorite_record(id).await?;
                let title = record.title.clone();
                if store.add(record).await.context("Failed to save favorites")? {
                    println!("Added {title} to favorites.");
                } else {
                    println!("{title} is already a favorite.");
                }
            }
            FavoritesCommand::Remove { id } => {
                if store.remove(id).await.context("Failed to save favorites")? {
                    println!("Removed movie {id} from favorites.");
                } else {
                    println!("Movie {id} is not a favorite.");
                }
            }
            FavoritesCommand::Toggle { id } => {
                // Removing needs no lookup; only fetch when adding.
                let record = match store.get(id) {
                    Some(existing) => existing,
                    None => self.favorite_record(id).await?,
                };
                let title = record.title.clone();
                match store.toggle(record).await.context("Failed to save favorites")? {
                    Toggled::Added => println!("Added {title} to favorites."),
                    Toggled::Removed => println!("Removed {title} from favorites."),
                }
            }
        }
        Ok(())
    }

    async fn favorite_record(&self, id: u64) -> Result<FavoriteRecord> {
        let result = self.explorer.load(&LogicalQuery::new(Resource::Movie(id))).await;
        match (result.data.as_deref(), &result.error) {
            (Some(payload), _) => payload
                .as_movie()
                .map(FavoriteRecord::from)
                .ok_or_else(|| anyhow!("movie {id} not found")),
            (None, Some(error)) => {
                Err(anyhow::Error::from(error.clone())).with_context(|| format!("Failed to load movie {id}"))
            }
            (None, None) => Err(anyhow!("movie {id} not found")),
        }
    }

    /// Debounced title search: every stdin line is a new value of the search
    /// box, and each settled value is shown through an observer.
    async fn search(&self) -> Result<()> {
        let delay = self.config.debounce_delay;
        let debouncer = Debouncer::new(String::new(), delay);
        let observer = self.explorer.observer();
        let mut settled = debouncer.subscribe();
        let mut results = observer.subscribe();

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut last_input: Option<String> = None;
        let mut awaiting_settle = false;
        let mut fetching = false;
        let mut eof = false;

        let grace = tokio::time::sleep(delay);
        tokio::pin!(grace);

        loop {
            if eof && !awaiting_settle && !fetching {
                break;
            }
            tokio::select! {
                line = lines.next_line(), if !eof => {
                    match line.context("Failed to read search input")? {
                        Some(line) => {
                            debouncer.push(line.clone());
                            last_input = Some(line);
                            awaiting_settle = true;
                        }
                        None => {
                            eof = true;
                            let budget = delay + self.config.request_timeout * 2;
                            grace.as_mut().reset(tokio::time::Instant::now() + budget);
                        }
                    }
                }
                Ok(()) = settled.changed() => {
                    let title = settled.borrow_and_update().clone();
                    awaiting_settle = last_input.as_ref() != Some(&title);
                    debug!(title = %title, "search settled");
                    let query = self.explorer.paged(
                        LogicalQuery::movies(&MovieFilters {
                            title: Some(title),
                            ..MovieFilters::default()
                        }),
                        Paging::default(),
                    );
                    self.explorer.observe(&observer, &query);
                    fetching = true;
                }
                Ok(()) = results.changed() => {
                    let observation = results.borrow_and_update().clone();
                    if let Some(observation) = observation {
                        fetching = observation.result.is_fetching;
                        if !fetching {
                            println!("{}", self.render_observation(&observation));
                        }
                    }
                }
                _ = &mut grace, if eof => {
                    warn!("search did not settle before the input closed");
                    break;
                }
            }
        }

        debouncer.cancel();
        Ok(())
    }

    fn render_observation(&self, observation: &Observation<Payload, CatalogApiError>) -> String {
        let mut out = format!("» {}\n", observation.key);
        match render::status(&observation.result) {
            Some(line) if observation.result.data.is_none() => out.push_str(&line),
            status => {
                if let Some(line) = status {
                    out.push_str(&line);
                    out.push('\n');
                }
                if let Some(payload) = observation.result.data.as_deref() {
                    let favorites = self.explorer.favorites();
                    out.push_str(&render::payload(payload, |id| favorites.is_favorite(id)));
                }
            }
        }
        out
    }

    fn print_result(&self, result: CatalogResult) -> Result<()> {
        let Some(payload) = result.data.as_deref() else {
            return match &result.error {
                Some(error) => Err(error.clone().into()),
                None => Err(anyhow!("no data returned")),
            };
        };
        if let Some(line) = render::status(&result) {
            eprintln!("{line}");
        }
        let favorites = self.explorer.favorites();
        println!("{}", render::payload(payload, |id| favorites.is_favorite(id)));
        Ok(())
    }

    fn print_list(&self, query: &LogicalQuery, result: CatalogResult) -> Result<()> {
        let info = result
            .data
            .as_deref()
            .and_then(|payload| self.explorer.page_info(query, payload));
        self.print_result(result)?;
        if let Some(info) = info {
            println!("\n{}", render::pager(&info, self.explorer.spread()));
        }
        Ok(())
    }
}
