//! Durable store - whole-domain persistence with an optional remote mirror
//!
//! Handles:
//! - Loading a domain snapshot (remote first, then local file, then empty)
//! - Saving a domain snapshot (local file is authoritative, remote is best-effort)
//! - Stable, indented JSON encoding so files stay human-diffable

pub mod local;
pub mod remote;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::error::StoreError;

pub use local::LocalBackend;
pub use remote::{GistBackend, RemoteSettings};

/// Full in-memory mapping for one domain. Iteration follows insertion order.
pub type Snapshot<R> = IndexMap<String, R>;

/// One named category of persisted state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Domain {
    /// Short name used in config and logs
    pub name: &'static str,
    /// File name, both on disk and inside the remote document
    pub file_name: &'static str,
}

impl Domain {
    pub const REWARDS: Domain = Domain {
        name: "rewards",
        file_name: "data.json",
    };

    pub const LEVELS: Domain = Domain {
        name: "levels",
        file_name: "levels.json",
    };

    pub const CHANNELS: Domain = Domain {
        name: "channels",
        file_name: "welcome_channels.json",
    };

    pub const ALL: [Domain; 3] = [Domain::REWARDS, Domain::LEVELS, Domain::CHANNELS];

    /// Look up a domain by its config name.
    pub fn from_name(name: &str) -> Option<Domain> {
        Self::ALL.into_iter().find(|d| d.name == name.trim())
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// A place a serialized domain can be fetched from and written to.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Backend identifier for logs
    fn kind(&self) -> &'static str;

    /// Fetch the serialized domain. `Ok(None)` means no copy exists yet.
    async fn fetch(&self, domain: Domain) -> Result<Option<String>, StoreError>;

    /// Replace the stored copy of the domain with `content`.
    async fn store(&self, domain: Domain, content: &str) -> Result<(), StoreError>;

    /// Move an unreadable copy out of the way so the next save cannot
    /// overwrite it. Returns where it went, or `None` if nothing was moved.
    async fn quarantine(&self, _domain: Domain) -> Result<Option<PathBuf>, StoreError> {
        Ok(None)
    }
}

/// Persists one domain through a local backend and an optional mirror.
#[derive(Clone)]
pub struct DurableStore {
    domain: Domain,
    local: Arc<dyn Backend>,
    remote: Option<Arc<dyn Backend>>,
}

impl DurableStore {
    pub fn new(domain: Domain, local: Arc<dyn Backend>) -> Self {
        Self {
            domain,
            local,
            remote: None,
        }
    }

    /// Mirror every save of this domain to `remote`.
    pub fn with_mirror(mut self, remote: Arc<dyn Backend>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn domain(&self) -> Domain {
        self.domain
    }

    pub fn is_mirrored(&self) -> bool {
        self.remote.is_some()
    }

    /// Load the domain snapshot. Never fails; falls back to an empty snapshot.
    pub async fn load<R: DeserializeOwned>(&self) -> Snapshot<R> {
        if let Some(remote) = &self.remote {
            match remote.fetch(self.domain).await {
                Ok(Some(content)) => match decode::<R>(&content) {
                    Ok(snapshot) => {
                        info!(
                            domain = %self.domain,
                            backend = remote.kind(),
                            entries = snapshot.len(),
                            "Loaded domain from remote mirror"
                        );
                        return snapshot;
                    }
                    Err(e) => {
                        warn!(domain = %self.domain, error = %e, "Remote copy is malformed, using local file");
                    }
                },
                Ok(None) => {
                    info!(domain = %self.domain, "No remote copy yet, using local file");
                }
                Err(e) => {
                    warn!(domain = %self.domain, error = %e, "Remote load failed, using local file");
                }
            }
        }

        match self.local.fetch(self.domain).await {
            Ok(Some(content)) => match decode::<R>(&content) {
                Ok(snapshot) => {
                    info!(
                        domain = %self.domain,
                        entries = snapshot.len(),
                        "Loaded domain from local file"
                    );
                    snapshot
                }
                Err(e) => {
                    match self.local.quarantine(self.domain).await {
                        Ok(Some(moved_to)) => error!(
                            domain = %self.domain,
                            file = self.domain.file_name,
                            moved_to = %moved_to.display(),
                            error = %e,
                            "Local file is malformed, moved aside and starting empty"
                        ),
                        Ok(None) => error!(
                            domain = %self.domain,
                            file = self.domain.file_name,
                            error = %e,
                            "Local file is malformed, starting empty"
                        ),
                        Err(move_err) => error!(
                            domain = %self.domain,
                            file = self.domain.file_name,
                            error = %e,
                            move_error = %move_err,
                            "Local file is malformed and could not be moved aside, starting empty"
                        ),
                    }
                    Snapshot::new()
                }
            },
            Ok(None) => {
                debug!(domain = %self.domain, "No local file, starting empty");
                Snapshot::new()
            }
            Err(e) => {
                warn!(domain = %self.domain, error = %e, "Local load failed, starting empty");
                Snapshot::new()
            }
        }
    }

    /// Save the whole snapshot.
    ///
    /// The local write must succeed or the error is returned. A mirror
    /// failure is logged and does not affect the result.
    pub async fn save<R: Serialize>(&self, snapshot: &Snapshot<R>) -> Result<(), StoreError> {
        let content = encode(self.domain, snapshot)?;

        self.local.store(self.domain, &content).await?;
        debug!(domain = %self.domain, bytes = content.len(), "Saved domain locally");

        if let Some(remote) = &self.remote {
            match remote.store(self.domain, &content).await {
                Ok(()) => debug!(domain = %self.domain, backend = remote.kind(), "Mirrored domain"),
                Err(e) => warn!(
                    domain = %self.domain,
                    backend = remote.kind(),
                    error = %e,
                    "Mirror push failed, local copy kept"
                ),
            }
        }

        Ok(())
    }
}

/// Serialize a snapshot with four-space indentation.
pub fn encode<R: Serialize>(domain: Domain, snapshot: &Snapshot<R>) -> Result<String, StoreError> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    snapshot
        .serialize(&mut ser)
        .map_err(|source| StoreError::Encode {
            domain: domain.name,
            source,
        })?;
    // serde_json only ever emits UTF-8
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Parse a serialized snapshot.
pub fn decode<R: DeserializeOwned>(content: &str) -> Result<Snapshot<R>, serde_json::Error> {
    if content.trim().is_empty() {
        return Ok(Snapshot::new());
    }
    serde_json::from_str(content)
}
