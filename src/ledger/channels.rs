//! Channel config ledger - where each guild announces arrivals and departures

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use crate::error::StoreError;
use crate::store::{DurableStore, Snapshot};

/// Opaque reference to a chat channel.
///
/// Numeric ids are what the chat platform hands out; names are accepted so
/// other front ends can use their own scheme.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChannelRef {
    Id(u64),
    Name(String),
}

impl fmt::Display for ChannelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelRef::Id(id) => write!(f, "{}", id),
            ChannelRef::Name(name) => f.write_str(name),
        }
    }
}

/// Per-guild channel settings. Either field may be unset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupChannels {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub welcome: Option<ChannelRef>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goodbye: Option<ChannelRef>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Welcome,
    Goodbye,
}

impl Slot {
    fn field(self, channels: &mut GroupChannels) -> &mut Option<ChannelRef> {
        match self {
            Slot::Welcome => &mut channels.welcome,
            Slot::Goodbye => &mut channels.goodbye,
        }
    }
}

pub struct ChannelLedger {
    store: DurableStore,
    groups: Snapshot<GroupChannels>,
}

impl ChannelLedger {
    pub async fn open(store: DurableStore) -> Self {
        let groups = store.load().await;
        Self { store, groups }
    }

    pub async fn set_welcome(&mut self, group_id: &str, channel: ChannelRef) -> Result<(), StoreError> {
        self.set(group_id, Slot::Welcome, channel).await
    }

    pub async fn set_goodbye(&mut self, group_id: &str, channel: ChannelRef) -> Result<(), StoreError> {
        self.set(group_id, Slot::Goodbye, channel).await
    }

    pub fn welcome(&self, group_id: &str) -> Option<&ChannelRef> {
        self.groups.get(group_id).and_then(|g| g.welcome.as_ref())
    }

    pub fn goodbye(&self, group_id: &str) -> Option<&ChannelRef> {
        self.groups.get(group_id).and_then(|g| g.goodbye.as_ref())
    }

    /// Upsert one slot, leaving the other untouched, then persist.
    async fn set(&mut self, group_id: &str, slot: Slot, channel: ChannelRef) -> Result<(), StoreError> {
        let previous = self.groups.get(group_id).cloned();

        let group = self.groups.entry(group_id.to_string()).or_default();
        *slot.field(group) = Some(channel.clone());

        if let Err(e) = self.store.save(&self.groups).await {
            match previous {
                Some(old) => {
                    self.groups.insert(group_id.to_string(), old);
                }
                None => {
                    self.groups.shift_remove(group_id);
                }
            }
            return Err(e);
        }

        info!(group_id, slot = ?slot, channel = %channel, "Channel configured");
        Ok(())
    }

    pub async fn flush(&self) -> Result<(), StoreError> {
        self.store.save(&self.groups).await
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn store(&self) -> &DurableStore {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Domain, LocalBackend};
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn ledger(dir: &TempDir) -> ChannelLedger {
        let store = DurableStore::new(Domain::CHANNELS, Arc::new(LocalBackend::new(dir.path())));
        ChannelLedger::open(store).await
    }

    #[tokio::test]
    async fn test_unset_group_has_no_channels() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger(&dir).await;

        assert!(ledger.welcome("g").is_none());
        assert!(ledger.goodbye("g").is_none());
    }

    #[tokio::test]
    async fn test_setting_one_slot_keeps_the_other() {
        let dir = TempDir::new().unwrap();
        let mut ledger = ledger(&dir).await;

        ledger.set_welcome("g", ChannelRef::Id(100)).await.unwrap();
        ledger.set_goodbye("g", ChannelRef::Id(200)).await.unwrap();
        ledger.set_welcome("g", ChannelRef::Id(101)).await.unwrap();

        assert_eq!(ledger.welcome("g"), Some(&ChannelRef::Id(101)));
        assert_eq!(ledger.goodbye("g"), Some(&ChannelRef::Id(200)));
    }

    #[tokio::test]
    async fn test_file_omits_unset_slots() {
        let dir = TempDir::new().unwrap();
        let mut ledger = ledger(&dir).await;
        ledger.set_goodbye("g", ChannelRef::Id(7)).await.unwrap();

        let content = std::fs::read_to_string(dir.path().join("welcome_channels.json")).unwrap();
        let value: Value = serde_json::from_str(&content).unwrap();
        assert_eq!(value, serde_json::json!({"g": {"goodbye": 7}}));
    }

    #[test]
    fn test_channel_ref_accepts_ids_and_names() {
        let group: GroupChannels =
            serde_json::from_str(r#"{"welcome": 123, "goodbye": "farewell", "theme": "dark"}"#).unwrap();

        assert_eq!(group.welcome, Some(ChannelRef::Id(123)));
        assert_eq!(group.goodbye, Some(ChannelRef::Name("farewell".to_string())));
        assert_eq!(group.extra.get("theme"), Some(&Value::from("dark")));
        assert_eq!(ChannelRef::Id(5).to_string(), "5");
    }
}
