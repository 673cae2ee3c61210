//! Command dispatcher - the single queue through which ledgers are mutated
//!
//! Commands arrive already parsed and permission-checked. The dispatcher task
//! owns the ledgers and runs one command to completion before taking the
//! next, so a read-modify-write on a record never interleaves with another.

use std::sync::Arc;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::clock::Clock;
use crate::error::{DispatchError, StoreError};
use crate::ledger::{
    ChannelRef, ClaimOutcome, LeaderboardEntry, Ledgers, DEFAULT_LEADERBOARD_SIZE,
};

/// Default bound on queued commands
pub const DEFAULT_QUEUE_SIZE: usize = 256;

/// Operations exposed to the chat dispatch layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    Claim { user: String },
    Points { user: String },
    /// Save every domain now
    Backup,
    AddLevel { user: String, amount: i64 },
    RemoveLevel { user: String, amount: i64 },
    Level { user: String },
    TopLevels {
        #[serde(default)]
        limit: Option<usize>,
    },
    SetWelcome { guild: String, channel: ChannelRef },
    SetGoodbye { guild: String, channel: ChannelRef },
    MemberJoined { guild: String, user: String },
    MemberLeft { guild: String, user: String },
}

/// Structured result for the dispatch layer to render
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Reply {
    Claimed {
        user: String,
        points_earned: u64,
        total_points: u64,
    },
    Cooldown {
        user: String,
        remaining_secs: i64,
    },
    Points {
        user: String,
        points: u64,
    },
    BackedUp,
    Level {
        user: String,
        level: u64,
    },
    Leaderboard {
        entries: Vec<LeaderboardEntry>,
    },
    ChannelSet {
        guild: String,
        channel: ChannelRef,
    },
    /// Where to announce a membership change, if anywhere
    Announce {
        guild: String,
        user: String,
        channel: Option<ChannelRef>,
    },
    /// The change could not be made durable and was not applied
    SaveFailed,
    /// The dispatcher is gone; nothing was applied
    Unavailable,
}

impl From<DispatchError> for Reply {
    fn from(_: DispatchError) -> Self {
        Reply::Unavailable
    }
}

/// Owns the ledgers and applies commands to them.
pub struct Dispatcher {
    ledgers: Ledgers,
    clock: Arc<dyn Clock>,
}

struct Request {
    command: Command,
    reply_tx: oneshot::Sender<Reply>,
}

/// Cloneable sender side of the dispatcher queue
#[derive(Clone)]
pub struct DispatchHandle {
    request_tx: mpsc::Sender<Request>,
}

impl DispatchHandle {
    /// Queue a command and wait for its reply.
    pub async fn dispatch(&self, command: Command) -> Result<Reply, DispatchError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.request_tx
            .send(Request { command, reply_tx })
            .await
            .map_err(|_| DispatchError::Closed)?;
        reply_rx.await.map_err(|_| DispatchError::NoReply)
    }
}

impl Dispatcher {
    pub fn new(ledgers: Ledgers, clock: Arc<dyn Clock>) -> Self {
        Self { ledgers, clock }
    }

    pub fn ledgers(&self) -> &Ledgers {
        &self.ledgers
    }

    /// Start the dispatcher task.
    ///
    /// The task ends once every handle is dropped, flushing all ledgers on
    /// the way out. The join handle yields the ledgers back.
    pub fn spawn(self, queue_size: usize) -> (DispatchHandle, JoinHandle<Ledgers>) {
        let (request_tx, request_rx) = mpsc::channel(queue_size.max(1));
        let task = tokio::spawn(self.run(request_rx));
        (DispatchHandle { request_tx }, task)
    }

    async fn run(mut self, mut request_rx: mpsc::Receiver<Request>) -> Ledgers {
        info!("Dispatcher started");

        while let Some(request) = request_rx.recv().await {
            let reply = self.handle(request.command).await;
            if request.reply_tx.send(reply).is_err() {
                debug!("Caller went away before the reply");
            }
        }

        info!("Dispatcher queue closed, flushing ledgers");
        if let Err(e) = self.ledgers.flush().await {
            error!(error = %e, "Final flush failed");
        }
        self.ledgers
    }

    /// Apply one command.
    pub async fn handle(&mut self, command: Command) -> Reply {
        debug!(?command, "Handling command");

        match command {
            Command::Claim { user } => {
                let now = self.clock.now();
                match self.ledgers.rewards.claim(&user, now).await {
                    Ok(ClaimOutcome::Granted {
                        points_earned,
                        total_points,
                    }) => Reply::Claimed {
                        user,
                        points_earned,
                        total_points,
                    },
                    Ok(ClaimOutcome::Denied { remaining }) => Reply::Cooldown {
                        user,
                        remaining_secs: whole_seconds_left(remaining),
                    },
                    Err(e) => save_failed("claim", e),
                }
            }

            Command::Points { user } => {
                let points = self.ledgers.rewards.points(&user);
                Reply::Points { user, points }
            }

            Command::Backup => match self.ledgers.flush().await {
                Ok(()) => Reply::BackedUp,
                Err(e) => save_failed("backup", e),
            },

            Command::AddLevel { user, amount } => self.adjust_level(user, amount).await,

            Command::RemoveLevel { user, amount } => {
                self.adjust_level(user, amount.saturating_neg()).await
            }

            Command::Level { user } => {
                let level = self.ledgers.levels.get(&user);
                Reply::Level { user, level }
            }

            Command::TopLevels { limit } => Reply::Leaderboard {
                entries: self
                    .ledgers
                    .levels
                    .leaderboard(limit.unwrap_or(DEFAULT_LEADERBOARD_SIZE)),
            },

            Command::SetWelcome { guild, channel } => {
                match self.ledgers.channels.set_welcome(&guild, channel.clone()).await {
                    Ok(()) => Reply::ChannelSet { guild, channel },
                    Err(e) => save_failed("set_welcome", e),
                }
            }

            Command::SetGoodbye { guild, channel } => {
                match self.ledgers.channels.set_goodbye(&guild, channel.clone()).await {
                    Ok(()) => Reply::ChannelSet { guild, channel },
                    Err(e) => save_failed("set_goodbye", e),
                }
            }

            Command::MemberJoined { guild, user } => {
                let channel = self.ledgers.channels.welcome(&guild).cloned();
                Reply::Announce {
                    guild,
                    user,
                    channel,
                }
            }

            Command::MemberLeft { guild, user } => {
                let channel = self.ledgers.channels.goodbye(&guild).cloned();
                Reply::Announce {
                    guild,
                    user,
                    channel,
                }
            }
        }
    }

    async fn adjust_level(&mut self, user: String, delta: i64) -> Reply {
        match self.ledgers.levels.adjust(&user, delta).await {
            Ok(level) => Reply::Level { user, level },
            Err(e) => save_failed("adjust_level", e),
        }
    }
}

/// Remaining cooldown in seconds, rounded up so a denied claim never
/// reports zero.
fn whole_seconds_left(remaining: TimeDelta) -> i64 {
    let secs = remaining.num_seconds();
    if remaining > TimeDelta::seconds(secs) {
        secs + 1
    } else {
        secs
    }
}

/// Log the detail, hand back only the generic signal.
fn save_failed(operation: &'static str, e: StoreError) -> Reply {
    error!(operation, error = %e, "Could not persist change");
    Reply::SaveFailed
}
