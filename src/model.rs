//! Catalog records shared by the query compiler, the store and the API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A catalog entry.
///
/// `last_modified_date` is owned by the service: it is stamped on every
/// successful update and never taken from the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardGame {
    pub id: i64,
    pub name: String,
    pub year: i32,
    pub last_modified_date: DateTime<Utc>,
}

impl BoardGame {
    pub fn new(id: i64, name: impl Into<String>, year: i32) -> Self {
        Self {
            id,
            name: name.into(),
            year,
            last_modified_date: Utc::now(),
        }
    }
}

/// Partial update body: `{ "id": 5, "name": "...", "year": 2016 }`.
///
/// Only a non-blank `name` and a positive `year` are applied; anything else
/// leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GamePatch {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
}

impl GamePatch {
    /// Applies the present fields to `game`. Returns `true` if anything changed.
    pub fn apply_to(&self, game: &mut BoardGame) -> bool {
        let mut changed = false;
        if let Some(name) = self.name.as_deref().filter(|n| !n.trim().is_empty()) {
            game.name = name.to_owned();
            changed = true;
        }
        if let Some(year) = self.year.filter(|y| *y > 0) {
            game.year = year;
            changed = true;
        }
        changed
    }
}
