//! Shared fixtures: a 130-game catalog and an in-process mock backend.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tessera_core::sort::compare_values;
use tessera_core::{Entity, EntityId, FetchRequest, FetchResult, SortDirection};
use tessera_store::EntityLoader;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Game {
    pub id: i64,
    pub name: String,
    pub price: f64,
    pub year: u16,
}

impl Entity for Game {
    fn id(&self) -> EntityId {
        EntityId::Num(self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GameFilter {
    #[serde(default)]
    pub search: String,
}

impl GameFilter {
    pub fn search(search: &str) -> Self {
        Self {
            search: search.to_string(),
        }
    }

    pub fn matches(&self, game: &Game) -> bool {
        game.name
            .to_lowercase()
            .contains(&self.search.to_lowercase())
    }
}

const FRANCHISES: [&str; 16] = [
    "Metroid",
    "Zelda",
    "Kirby",
    "Star Fox",
    "Pikmin",
    "Mario Kart",
    "Wario Ware",
    "Donkey Kong",
    "Fire Emblem",
    "Pokemon",
    "Splatoon",
    "Bayonetta",
    "Xenoblade",
    "Animal Crossing",
    "Smash Bros",
    "Golden Sun",
];
const EDITIONS: [&str; 8] = ["", " II", " III", " 64", " Advance", " DS", " Deluxe", " Origins"];

/// 130 games. Only "F-Zero" and "F-Zero GX" contain "zero".
pub fn catalog() -> Vec<Game> {
    let mut names = vec!["F-Zero".to_string(), "F-Zero GX".to_string()];
    for edition in EDITIONS {
        for franchise in FRANCHISES {
            names.push(format!("{franchise}{edition}"));
        }
    }
    names
        .into_iter()
        .zip(1..)
        .map(|(name, id)| Game {
            id,
            name,
            price: f64::from(u8::try_from(id % 5).unwrap()) * 10.0 + 19.0,
            year: 1990 + u16::try_from(id % 25).unwrap(),
        })
        .collect()
}

/// How the backend shapes responses to paged requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// `{entities, total}`.
    Page,
    /// `{entities, hasMore}`.
    Scroll,
}

/// Filters, sorts and slices the catalog, counting and recording calls.
pub struct Backend {
    games: Vec<Game>,
    shape: Shape,
    latency: Duration,
    calls: AtomicUsize,
    failing: AtomicBool,
    requests: Mutex<Vec<FetchRequest<GameFilter>>>,
}

impl Backend {
    pub fn new(shape: Shape, latency: Duration) -> Arc<Self> {
        Self::with_games(catalog(), shape, latency)
    }

    pub fn with_games(games: Vec<Game>, shape: Shape, latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            games,
            shape,
            latency,
            calls: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<FetchRequest<GameFilter>> {
        self.requests.lock().clone()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn fetch(
        &self,
        request: FetchRequest<GameFilter>,
    ) -> anyhow::Result<FetchResult<Game>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());
        tokio::time::sleep(self.latency).await;
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("catalog unavailable");
        }

        let mut rows: Vec<Game> = self
            .games
            .iter()
            .filter(|game| request.filter.matches(game))
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
        let entities: Vec<Game> = rows
            .into_iter()
            .skip(page.start_index)
            .take(page.size)
            .collect();
        Ok(match self.shape {
            Shape::Page => FetchResult::Page { entities, total },
            Shape::Scroll => FetchResult::Scroll {
                has_more: page.start_index + entities.len() < total,
                entities,
                total: None,
            },
        })
    }
}

/// A store loader backed by `backend`.
pub fn loader(backend: &Arc<Backend>) -> impl EntityLoader<Game, GameFilter> {
    let backend = Arc::clone(backend);
    move |request: FetchRequest<GameFilter>| {
        let backend = Arc::clone(&backend);
        async move { backend.fetch(request).await }
    }
}

pub fn names(games: &[Game]) -> Vec<String> {
    games.iter().map(|game| game.name.clone()).collect()
}
