//! Ledgers - the business rules over each persisted domain
//!
//! - `rewards`: points with a 24h claim cooldown
//! - `levels`: progression levels and the leaderboard
//! - `channels`: welcome/goodbye channel per guild

pub mod channels;
pub mod levels;
pub mod rewards;

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use crate::error::StoreError;
use crate::store::{Backend, Domain, DurableStore, GistBackend, LocalBackend, RemoteSettings};

pub use channels::{ChannelLedger, ChannelRef, GroupChannels};
pub use levels::{LeaderboardEntry, LevelLedger, DEFAULT_LEADERBOARD_SIZE};
pub use rewards::{ClaimOutcome, RewardLedger, RewardRecord};

/// Where the ledgers keep their state
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Directory holding one JSON file per domain
    pub data_dir: PathBuf,
    /// Gist mirror, `None` for local-only mode
    pub remote: Option<RemoteSettings>,
    /// Domains pushed to the mirror on every save
    pub mirrored: Vec<Domain>,
}

impl LedgerConfig {
    pub fn local_only(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            remote: None,
            mirrored: Vec::new(),
        }
    }
}

/// All ledgers of one process, created once at startup.
pub struct Ledgers {
    pub rewards: RewardLedger,
    pub levels: LevelLedger,
    pub channels: ChannelLedger,
}

impl Ledgers {
    /// Build the backends and load every domain.
    pub async fn open(config: &LedgerConfig) -> Self {
        let local: Arc<dyn Backend> = Arc::new(LocalBackend::new(&config.data_dir));

        let remote: Option<Arc<dyn Backend>> = match &config.remote {
            Some(settings) => match GistBackend::new(settings.clone()) {
                Ok(gist) => {
                    info!(gist_id = gist.gist_id(), "Remote mirror enabled");
                    Some(Arc::new(gist))
                }
                Err(e) => {
                    warn!(error = %e, "Remote mirror could not be initialised, running local-only");
                    None
                }
            },
            None => {
                info!("GIST_ID or GITHUB_GIST_TOKEN not set, running local-only");
                None
            }
        };

        Self::open_with(local, remote, &config.mirrored).await
    }

    /// Load every domain from explicit backends.
    pub async fn open_with(
        local: Arc<dyn Backend>,
        remote: Option<Arc<dyn Backend>>,
        mirrored: &[Domain],
    ) -> Self {
        let store_for = |domain: Domain| {
            let store = DurableStore::new(domain, local.clone());
            match &remote {
                Some(remote) if mirrored.contains(&domain) => store.with_mirror(remote.clone()),
                _ => store,
            }
        };

        let ledgers = Self {
            rewards: RewardLedger::open(store_for(Domain::REWARDS)).await,
            levels: LevelLedger::open(store_for(Domain::LEVELS)).await,
            channels: ChannelLedger::open(store_for(Domain::CHANNELS)).await,
        };

        info!(
            rewards = ledgers.rewards.len(),
            levels = ledgers.levels.len(),
            channels = ledgers.channels.len(),
            "Ledgers loaded"
        );
        ledgers
    }

    /// Save every domain. All saves are attempted; the first error is returned.
    pub async fn flush(&self) -> Result<(), StoreError> {
        let results = [
            self.rewards.flush().await,
            self.levels.flush().await,
            self.channels.flush().await,
        ];

        let mut first_error = None;
        for result in results {
            if let Err(e) = result {
                warn!(error = %e, "Flush failed");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Names of the domains mirrored remotely, for the startup banner
    pub fn mirrored_domains(&self) -> Vec<Domain> {
        [
            self.rewards.store(),
            self.levels.store(),
            self.channels.store(),
        ]
        .into_iter()
        .filter(|s| s.is_mirrored())
        .map(|s| s.domain())
        .collect()
    }
}
