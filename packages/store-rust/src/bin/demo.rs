//! Browses a generated game catalog through a remote-paged collection store.
//!
//! The "backend" is an in-process loader that filters, sorts and slices the
//! catalog, memoized by a [`CallCache`] the way a real fetch function would
//! be.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use serde::{Deserialize, Serialize};
use tessera_core::sort::compare_values;
use tessera_core::{Entity, EntityId, FetchRequest, FetchResult, Sort, SortDirection};
use tessera_store::{
    init_tracing, CacheConfig, CacheOptions, CallCache, CollectionStore, FilterFeature, LogFormat,
    PaginationFeature, SortFeature,
};
use tracing::info;

/// Command-line arguments.
#[derive(Debug, Parser)]
#[command(name = "tessera-demo", about = "Page through a generated game catalog")]
struct Args {
    /// Case-insensitive name search.
    #[arg(long, short = 's', default_value = "")]
    search: String,

    /// Rows per page.
    #[arg(long, default_value_t = 10, env = "TESSERA_PAGE_SIZE")]
    page_size: usize,

    /// 1-based page to show.
    #[arg(long, short = 'p', default_value_t = 1)]
    page: usize,

    /// Field to sort by (`name`, `price`, `year`).
    #[arg(long)]
    sort_by: Option<String>,

    /// Sort direction.
    #[arg(long, default_value = "asc")]
    direction: SortDirection,

    /// Simulated backend latency in milliseconds.
    #[arg(long, default_value_t = 50)]
    latency_ms: u64,

    /// Emit JSON logs.
    #[arg(long, env = "TESSERA_JSON_LOGS")]
    json_logs: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Game {
    id: i64,
    name: String,
    price: f64,
    year: u16,
}

impl Entity for Game {
    fn id(&self) -> EntityId {
        EntityId::Num(self.id)
    }
}

const TITLES: [&str; 10] = [
    "F-Zero",
    "Metroid",
    "Zelda",
    "Kirby",
    "Star Fox",
    "Pikmin",
    "Mario Kart",
    "Wario",
    "Donkey Kong",
    "Fire Emblem",
];
const SUFFIXES: [&str; 13] = [
    "", " GX", " II", " 64", " Advance", " DS", " Origins", " Remix", " Deluxe", " Legends",
    " Tactics", " Arena", " Zero",
];

fn catalog() -> Vec<Game> {
    let mut id = 0;
    let mut games = Vec::with_capacity(TITLES.len() * SUFFIXES.len());
    for suffix in SUFFIXES {
        for title in TITLES {
            id += 1;
            games.push(Game {
                id,
                name: format!("{title}{suffix}"),
                price: f64::from(u32::try_from(id % 7).unwrap_or(0)) * 10.0 + 9.99,
                year: 1990 + u16::try_from(id % 30).unwrap_or(0),
            });
        }
    }
    games
}

async fn query(
    games: Arc<Vec<Game>>,
    request: FetchRequest<String>,
    latency: Duration,
) -> Result<FetchResult<Game>> {
    tokio::time::sleep(latency).await;
    let needle = request.filter.to_lowercase();
    let mut rows: Vec<Game> = games
        .iter()
        .filter(|game| game.name.to_lowercase().contains(&needle))
        .cloned()
        .collect();
    if let Some(sort) = &request.sort {
        rows.sort_by(|a, b| {
            let ordering = compare_values(
                a.field_value(&sort.field).as_ref(),
                b.field_value(&sort.field).as_ref(),
            );
            match sort.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        });
    }
    let total = rows.len();
    let Some(page) = request.page else {
        return Ok(FetchResult::Entities(rows));
    };
    let entities = rows.into_iter().skip(page.start_index).take(page.size).collect();
    Ok(FetchResult::Page { entities, total })
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(if args.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    });

    let games = Arc::new(catalog());
    let cache: CallCache<FetchResult<Game>> = CallCache::new(CacheConfig::default());
    let latency = Duration::from_millis(args.latency_ms);
    let options = CacheOptions {
        expires: Some(Duration::from_secs(60)),
        ..CacheOptions::default()
    };

    let initial_sort = args.sort_by.clone().map(|field| Sort {
        field,
        direction: args.direction,
    });
    let store: CollectionStore<Game, String> = CollectionStore::builder()
        .collection("games")
        .filter(FilterFeature::remote())
        .initial_filter(args.search.clone())
        .sort(SortFeature::remote(initial_sort))
        .pagination(PaginationFeature::remote_paged(args.page_size.max(1), 3))
        .loader(move |request: FetchRequest<String>| {
            let cache = cache.clone();
            let games = Arc::clone(&games);
            async move {
                let key = (
                    request.filter.clone(),
                    request.sort.clone(),
                    request.page.map(|page| (page.start_index, page.size)),
                );
                cache
                    .cache(&key, options, || query(games, request, latency))
                    .await
                    .map_err(anyhow::Error::from)
            }
        })
        .build();

    store.set_loading();
    store.settled().await;
    if args.page > 1 && !store.load_entities_page(args.page - 1) {
        info!(page = args.page, "page out of range, showing the first page");
    }
    store.settled().await;

    if let Some(error) = store.error() {
        anyhow::bail!("loading failed: {}", error.message);
    }

    let page = store.current_page();
    println!(
        "page {}/{} ({} games)",
        page.info.page_index + 1,
        page.info.pages_count.max(1),
        page.info.total
    );
    for game in &page.entities {
        println!("{:>4}  {:<24} {:>7.2}  {}", game.id, game.name, game.price, game.year);
    }
    Ok(())
}
