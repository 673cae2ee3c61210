//! End-to-end ledger scenarios through the dispatcher
//!
//! Covers:
//! - The claim/cooldown/claim sequence with a controllable clock
//! - State surviving a restart (save then load from the local files)
//! - Local write failures surfacing as a generic save failure

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use tempfile::TempDir;

use guild_ledger::ledger::ChannelRef;
use guild_ledger::store::LocalBackend;
use guild_ledger::{
    Backend, Clock, Command, Dispatcher, Domain, LedgerConfig, Ledgers, Reply, StoreError,
};

/// Clock the test moves by hand
struct ManualClock(Mutex<NaiveDateTime>);

impl ManualClock {
    fn starting_at(now: NaiveDateTime) -> Arc<Self> {
        Arc::new(Self(Mutex::new(now)))
    }

    fn advance(&self, by: TimeDelta) {
        let mut now = self.0.lock().unwrap();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.0.lock().unwrap()
    }
}

fn start_time() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 6, 1)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
}

async fn dispatcher(dir: &TempDir, clock: Arc<ManualClock>) -> Dispatcher {
    let ledgers = Ledgers::open(&LedgerConfig::local_only(dir.path())).await;
    Dispatcher::new(ledgers, clock)
}

fn claim(user: &str) -> Command {
    Command::Claim {
        user: user.to_string(),
    }
}

// =============================================================================
// Claim gate
// =============================================================================

#[tokio::test]
async fn test_claim_cooldown_claim_sequence() {
    let dir = TempDir::new().unwrap();
    let clock = ManualClock::starting_at(start_time());
    let mut dispatcher = dispatcher(&dir, clock.clone()).await;

    assert_eq!(
        dispatcher.handle(claim("42")).await,
        Reply::Claimed {
            user: "42".to_string(),
            points_earned: 10,
            total_points: 10
        }
    );

    assert_eq!(
        dispatcher.handle(claim("42")).await,
        Reply::Cooldown {
            user: "42".to_string(),
            remaining_secs: 24 * 3600
        }
    );

    clock.advance(TimeDelta::hours(24) + TimeDelta::minutes(1));
    assert_eq!(
        dispatcher.handle(claim("42")).await,
        Reply::Claimed {
            user: "42".to_string(),
            points_earned: 10,
            total_points: 20
        }
    );
}

#[tokio::test]
async fn test_remaining_shrinks_with_elapsed_time() {
    let dir = TempDir::new().unwrap();
    let clock = ManualClock::starting_at(start_time());
    let mut dispatcher = dispatcher(&dir, clock.clone()).await;

    dispatcher.handle(claim("7")).await;

    // (hours to advance, hours left afterwards)
    for (step, left) in [(1, 23), (5, 18), (17, 1)] {
        clock.advance(TimeDelta::hours(step));
        assert_eq!(
            dispatcher.handle(claim("7")).await,
            Reply::Cooldown {
                user: "7".to_string(),
                remaining_secs: left * 3600
            }
        );
    }
}

#[tokio::test]
async fn test_sub_second_remainder_rounds_up() {
    let dir = TempDir::new().unwrap();
    let clock = ManualClock::starting_at(start_time());
    let mut dispatcher = dispatcher(&dir, clock.clone()).await;

    dispatcher.handle(claim("7")).await;
    clock.advance(TimeDelta::hours(24) - TimeDelta::milliseconds(100));

    assert_eq!(
        dispatcher.handle(claim("7")).await,
        Reply::Cooldown {
            user: "7".to_string(),
            remaining_secs: 1
        }
    );
}

#[tokio::test]
async fn test_never_claimed_user_has_zero_points() {
    let dir = TempDir::new().unwrap();
    let mut dispatcher = dispatcher(&dir, ManualClock::starting_at(start_time())).await;

    assert_eq!(
        dispatcher
            .handle(Command::Points {
                user: "ghost".to_string()
            })
            .await,
        Reply::Points {
            user: "ghost".to_string(),
            points: 0
        }
    );
}

// =============================================================================
// Durability across restarts
// =============================================================================

#[tokio::test]
async fn test_state_survives_restart() {
    let dir = TempDir::new().unwrap();
    let clock = ManualClock::starting_at(start_time());

    {
        let mut dispatcher = dispatcher(&dir, clock.clone()).await;
        dispatcher.handle(claim("42")).await;
        dispatcher
            .handle(Command::AddLevel {
                user: "a".to_string(),
                amount: 5,
            })
            .await;
        dispatcher
            .handle(Command::AddLevel {
                user: "b".to_string(),
                amount: 9,
            })
            .await;
        dispatcher
            .handle(Command::AddLevel {
                user: "c".to_string(),
                amount: 9,
            })
            .await;
        dispatcher
            .handle(Command::SetWelcome {
                guild: "g".to_string(),
                channel: ChannelRef::Id(555),
            })
            .await;
    }

    let mut restarted = dispatcher(&dir, clock.clone()).await;

    assert_eq!(
        restarted
            .handle(Command::Points {
                user: "42".to_string()
            })
            .await,
        Reply::Points {
            user: "42".to_string(),
            points: 10
        }
    );

    // Cooldown is still enforced after the restart
    assert!(matches!(
        restarted.handle(claim("42")).await,
        Reply::Cooldown { .. }
    ));

    // Tie order comes back from the file unchanged
    match restarted.handle(Command::TopLevels { limit: Some(3) }).await {
        Reply::Leaderboard { entries } => {
            let ids: Vec<&str> = entries.iter().map(|e| e.user_id.as_str()).collect();
            assert_eq!(ids, vec!["b", "c", "a"]);
        }
        other => panic!("unexpected reply: {:?}", other),
    }

    assert_eq!(
        restarted
            .handle(Command::MemberJoined {
                guild: "g".to_string(),
                user: "newcomer".to_string(),
            })
            .await,
        Reply::Announce {
            guild: "g".to_string(),
            user: "newcomer".to_string(),
            channel: Some(ChannelRef::Id(555)),
        }
    );
}

#[tokio::test]
async fn test_legacy_file_format_loads() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("data.json"),
        r#"{
    "1001": {"points": 40, "lastClaim": "2024-06-01T11:00:00.250000"},
    "1002": {"points": 0, "lastClaim": null}
}"#,
    )
    .unwrap();
    std::fs::write(dir.path().join("levels.json"), r#"{"1001": 3}"#).unwrap();

    let clock = ManualClock::starting_at(start_time());
    let mut dispatcher = dispatcher(&dir, clock).await;

    assert_eq!(
        dispatcher
            .handle(Command::Level {
                user: "1001".to_string()
            })
            .await,
        Reply::Level {
            user: "1001".to_string(),
            level: 3
        }
    );
    assert!(matches!(
        dispatcher.handle(claim("1001")).await,
        Reply::Cooldown { .. }
    ));
    assert_eq!(
        dispatcher.handle(claim("1002")).await,
        Reply::Claimed {
            user: "1002".to_string(),
            points_earned: 10,
            total_points: 10
        }
    );
}

#[tokio::test]
async fn test_legacy_negative_level_does_not_wipe_levels() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("levels.json"), r#"{"1": 40, "2": 12, "3": -2}"#).unwrap();

    {
        let mut dispatcher = dispatcher(&dir, ManualClock::starting_at(start_time())).await;
        dispatcher
            .handle(Command::AddLevel {
                user: "9".to_string(),
                amount: 1,
            })
            .await;
    }

    let mut restarted = dispatcher(&dir, ManualClock::starting_at(start_time())).await;
    match restarted.handle(Command::TopLevels { limit: None }).await {
        Reply::Leaderboard { entries } => {
            let rows: Vec<(&str, u64)> = entries
                .iter()
                .map(|e| (e.user_id.as_str(), e.level))
                .collect();
            assert_eq!(rows, vec![("1", 40), ("2", 12), ("9", 1), ("3", 0)]);
        }
        other => panic!("unexpected reply: {:?}", other),
    }
}

// =============================================================================
// Local persistence failures
// =============================================================================

/// Local backend whose writes always fail
struct ReadOnlyDisk;

#[async_trait]
impl Backend for ReadOnlyDisk {
    fn kind(&self) -> &'static str {
        "read-only"
    }

    async fn fetch(&self, _domain: Domain) -> Result<Option<String>, StoreError> {
        Ok(None)
    }

    async fn store(&self, domain: Domain, _content: &str) -> Result<(), StoreError> {
        Err(StoreError::Io {
            path: domain.file_name.into(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
        })
    }
}

#[tokio::test]
async fn test_failed_save_is_reported_and_rolled_back() {
    let ledgers = Ledgers::open_with(Arc::new(ReadOnlyDisk), None, &[]).await;
    let mut dispatcher = Dispatcher::new(ledgers, ManualClock::starting_at(start_time()));

    assert_eq!(dispatcher.handle(claim("42")).await, Reply::SaveFailed);
    assert_eq!(
        dispatcher
            .handle(Command::Points {
                user: "42".to_string()
            })
            .await,
        Reply::Points {
            user: "42".to_string(),
            points: 0
        }
    );

    assert_eq!(
        dispatcher
            .handle(Command::AddLevel {
                user: "42".to_string(),
                amount: 3
            })
            .await,
        Reply::SaveFailed
    );
    assert_eq!(dispatcher.ledgers().levels.get("42"), 0);
    assert!(dispatcher.ledgers().levels.is_empty());

    assert_eq!(
        dispatcher
            .handle(Command::SetGoodbye {
                guild: "g".to_string(),
                channel: ChannelRef::Id(1),
            })
            .await,
        Reply::SaveFailed
    );
    assert!(dispatcher.ledgers().channels.goodbye("g").is_none());

    assert_eq!(dispatcher.handle(Command::Backup).await, Reply::SaveFailed);
}

// =============================================================================
// Queue
// =============================================================================

#[tokio::test]
async fn test_queued_commands_run_in_order_and_flush_on_close() {
    let dir = TempDir::new().unwrap();
    let ledgers = Ledgers::open(&LedgerConfig::local_only(dir.path())).await;
    let (handle, task) =
        Dispatcher::new(ledgers, ManualClock::starting_at(start_time())).spawn(8);

    let mut replies = Vec::new();
    for _ in 0..3 {
        replies.push(handle.dispatch(claim("42")).await.unwrap());
    }
    assert!(matches!(replies[0], Reply::Claimed { total_points: 10, .. }));
    assert!(matches!(replies[1], Reply::Cooldown { .. }));
    assert!(matches!(replies[2], Reply::Cooldown { .. }));

    handle
        .dispatch(Command::RemoveLevel {
            user: "42".to_string(),
            amount: 1000,
        })
        .await
        .unwrap();

    drop(handle);
    let ledgers = task.await.unwrap();
    assert_eq!(ledgers.levels.get("42"), 0);

    // Closing the queue flushed every domain
    let local = LocalBackend::new(dir.path());
    for domain in Domain::ALL {
        assert!(local.fetch(domain).await.unwrap().is_some(), "{} not flushed", domain);
    }
}
