//! guild-ledger - persistent state engine for community bots
//!
//! Keeps small per-member state durable across restarts and mirrors it to a
//! GitHub Gist:
//!
//! - **Rewards**: points earned by a claim gated behind a 24h cooldown
//! - **Levels**: progression levels with a floor at zero and a leaderboard
//! - **Channels**: welcome/goodbye channel per guild
//!
//! Every save writes the whole domain to a local JSON file first. The mirror
//! push that follows is best-effort.

pub mod clock;
pub mod config;
pub mod console;
pub mod dispatch;
pub mod error;
pub mod ledger;
pub mod server;
pub mod store;

pub use clock::{Clock, SystemClock};
pub use config::Args;
pub use dispatch::{Command, DispatchHandle, Dispatcher, Reply};
pub use error::{DispatchError, RemoteError, StoreError};
pub use ledger::{LedgerConfig, Ledgers};
pub use store::{Backend, Domain, DurableStore, Snapshot};
