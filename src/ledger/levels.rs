//! Progression ledger - per-user levels with a floor at zero

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::error::StoreError;
use crate::store::{DurableStore, Snapshot};

/// Leaderboard length used when the caller gives none
pub const DEFAULT_LEADERBOARD_SIZE: usize = 10;

/// One row of the leaderboard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    /// 1-based position
    pub rank: usize,
    pub user_id: String,
    pub level: u64,
}

pub struct LevelLedger {
    store: DurableStore,
    levels: Snapshot<u64>,
}

impl LevelLedger {
    /// Load the levels domain.
    ///
    /// Entries are read leniently: older files may hold negative or
    /// fractional levels, which are clamped into range instead of
    /// rejecting the whole file.
    pub async fn open(store: DurableStore) -> Self {
        let stored: Snapshot<Value> = store.load().await;
        let levels = stored
            .into_iter()
            .map(|(user_id, value)| {
                let level = stored_level(&user_id, &value);
                (user_id, level)
            })
            .collect();
        Self { store, levels }
    }

    /// Current level, 0 for unseen users. Does not create a record.
    pub fn get(&self, user_id: &str) -> u64 {
        self.levels.get(user_id).copied().unwrap_or(0)
    }

    /// Apply `delta` and persist. The result never drops below zero.
    ///
    /// On save failure the previous level (or absence) is restored.
    pub async fn adjust(&mut self, user_id: &str, delta: i64) -> Result<u64, StoreError> {
        let previous = self.levels.get(user_id).copied();
        let current = previous.unwrap_or(0);
        let level = if delta >= 0 {
            current.saturating_add(delta.unsigned_abs())
        } else {
            current.saturating_sub(delta.unsigned_abs())
        };

        self.levels.insert(user_id.to_string(), level);

        if let Err(e) = self.store.save(&self.levels).await {
            match previous {
                Some(old) => {
                    self.levels.insert(user_id.to_string(), old);
                }
                None => {
                    self.levels.shift_remove(user_id);
                }
            }
            return Err(e);
        }

        info!(user_id, delta, level, "Level adjusted");
        Ok(level)
    }

    /// Highest levels first. Equal levels keep insertion order.
    pub fn leaderboard(&self, top_n: usize) -> Vec<LeaderboardEntry> {
        let mut ranked: Vec<(&String, u64)> =
            self.levels.iter().map(|(id, level)| (id, *level)).collect();
        // sort_by is stable, so ties stay in insertion order
        ranked.sort_by(|a, b| b.1.cmp(&a.1));

        ranked
            .into_iter()
            .take(top_n)
            .enumerate()
            .map(|(i, (user_id, level))| LeaderboardEntry {
                rank: i + 1,
                user_id: user_id.clone(),
                level,
            })
            .collect()
    }

    pub async fn flush(&self) -> Result<(), StoreError> {
        self.store.save(&self.levels).await
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn store(&self) -> &DurableStore {
        &self.store
    }
}

/// Convert one stored level to the floor-at-zero representation.
fn stored_level(user_id: &str, value: &Value) -> u64 {
    if let Some(level) = value.as_u64() {
        return level;
    }
    if let Some(level) = value.as_i64() {
        warn!(user_id, level, "Negative stored level clamped to 0");
        return 0;
    }
    if let Some(level) = value.as_f64() {
        warn!(user_id, level, "Fractional stored level truncated");
        // `as` saturates, and maps NaN and negatives to 0
        return level as u64;
    }
    warn!(user_id, value = %value, "Unreadable stored level reset to 0");
    0
}
