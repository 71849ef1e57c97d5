//! Storage seam for catalog entries.
//!
//! The catalog core only talks to [`DataStore`]. [`InMemoryStore`] is the
//! implementation the binary and the tests run against; a persistent engine
//! plugs in behind the same trait.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::model::{BoardGame, GamePatch};
use crate::query::{Page, QueryPlan};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("data store unavailable: {0}")]
    Unavailable(String),

    #[error("data store query failed: {0}")]
    Query(String),
}

#[async_trait]
pub trait DataStore: Send + Sync {
    async fn get(&self, id: i64) -> Result<Option<BoardGame>, StoreError>;

    /// Runs a compiled plan. `record_count` counts every match, before paging.
    async fn query(&self, plan: &QueryPlan) -> Result<Page, StoreError>;

    /// Applies `patch` to the entry with `patch.id` and stamps it with
    /// `modified_at`, as one atomic step. Never creates an entry: returns
    /// `None` if there is none.
    async fn update(
        &self,
        patch: &GamePatch,
        modified_at: DateTime<Utc>,
    ) -> Result<Option<BoardGame>, StoreError>;

    /// Removes and returns the entry, if it existed.
    async fn remove(&self, id: i64) -> Result<Option<BoardGame>, StoreError>;
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    games: RwLock<BTreeMap<i64, BoardGame>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_games(games: impl IntoIterator<Item = BoardGame>) -> Self {
        Self {
            games: RwLock::new(games.into_iter().map(|g| (g.id, g)).collect()),
        }
    }

    /// A small catalog for local runs.
    pub fn demo() -> Self {
        Self::with_games([
            BoardGame::new(1, "Axis & Allies", 1981),
            BoardGame::new(2, "Citadels", 2000),
            BoardGame::new(3, "Terraforming Mars", 2016),
        ])
    }

    pub async fn len(&self) -> usize {
        self.games.read().await.len()
    }
}

#[async_trait]
impl DataStore for InMemoryStore {
    async fn get(&self, id: i64) -> Result<Option<BoardGame>, StoreError> {
        Ok(self.games.read().await.get(&id).cloned())
    }

    async fn query(&self, plan: &QueryPlan) -> Result<Page, StoreError> {
        let games = self.games.read().await;
        Ok(plan.execute(games.values()))
    }

    async fn update(
        &self,
        patch: &GamePatch,
        modified_at: DateTime<Utc>,
    ) -> Result<Option<BoardGame>, StoreError> {
        let mut games = self.games.write().await;
        Ok(games.get_mut(&patch.id).map(|game| {
            patch.apply_to(game);
            game.last_modified_date = modified_at;
            game.clone()
        }))
    }

    async fn remove(&self, id: i64) -> Result<Option<BoardGame>, StoreError> {
        Ok(self.games.write().await.remove(&id))
    }
}
