//! Reward ledger - points earned through a cooldown-gated claim

use chrono::{NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::store::{DurableStore, Snapshot};

/// Points granted per successful claim
pub const POINTS_PER_CLAIM: u64 = 10;

/// Minimum interval between two claims by the same user
pub const CLAIM_COOLDOWN_HOURS: i64 = 24;

pub fn claim_cooldown() -> TimeDelta {
    TimeDelta::hours(CLAIM_COOLDOWN_HOURS)
}

/// Per-user reward state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RewardRecord {
    #[serde(default)]
    pub points: u64,

    /// Time of the last successful claim, `None` if never claimed
    #[serde(rename = "lastClaim", default)]
    pub last_claim: Option<NaiveDateTime>,

    /// Fields written by other tools, kept as-is
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Result of a claim attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    Granted { points_earned: u64, total_points: u64 },
    /// Cooldown still running
    Denied { remaining: TimeDelta },
}

pub struct RewardLedger {
    store: DurableStore,
    records: Snapshot<RewardRecord>,
}

impl RewardLedger {
    /// Load the rewards domain and take ownership of it.
    pub async fn open(store: DurableStore) -> Self {
        let records = store.load().await;
        Self { store, records }
    }

    /// Return the user's record, inserting the zero default if unseen.
    ///
    /// The inserted default is only persisted by the next save.
    pub fn get_or_create(&mut self, user_id: &str) -> RewardRecord {
        self.records.entry(user_id.to_string()).or_default().clone()
    }

    pub fn points(&mut self, user_id: &str) -> u64 {
        self.get_or_create(user_id).points
    }

    /// Grant points if the cooldown has elapsed at `now`.
    ///
    /// Elapsed time equal to the cooldown is enough to claim. If the save
    /// fails the record is restored and the error returned.
    pub async fn claim(
        &mut self,
        user_id: &str,
        now: NaiveDateTime,
    ) -> Result<ClaimOutcome, StoreError> {
        let previous = self.get_or_create(user_id);

        if let Some(last_claim) = previous.last_claim {
            let elapsed = now - last_claim;
            if elapsed < claim_cooldown() {
                let remaining = claim_cooldown() - elapsed;
                debug!(user_id, remaining_secs = remaining.num_seconds(), "Claim denied");
                return Ok(ClaimOutcome::Denied { remaining });
            }
        }

        let record = self.records.entry(user_id.to_string()).or_default();
        record.points = record.points.saturating_add(POINTS_PER_CLAIM);
        record.last_claim = Some(now);
        let total_points = record.points;

        if let Err(e) = self.store.save(&self.records).await {
            self.records.insert(user_id.to_string(), previous);
            return Err(e);
        }

        info!(user_id, points = POINTS_PER_CLAIM, total_points, "Claim granted");
        Ok(ClaimOutcome::Granted {
            points_earned: POINTS_PER_CLAIM,
            total_points,
        })
    }

    /// Persist the whole domain now.
    pub async fn flush(&self) -> Result<(), StoreError> {
        self.store.save(&self.records).await
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn store(&self) -> &DurableStore {
        &self.store
    }
}
