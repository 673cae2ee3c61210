//! Configuration for guild-ledger
//!
//! CLI arguments and environment variable handling using clap.
//! A `.env` file is loaded by `main` before parsing.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use crate::dispatch::DEFAULT_QUEUE_SIZE;
use crate::ledger::LedgerConfig;
use crate::store::remote::{DEFAULT_API_URL, DEFAULT_TIMEOUT_SECS};
use crate::store::{Domain, RemoteSettings};

/// guild-ledger - durable reward, level and channel state for community bots
#[derive(Parser, Debug, Clone)]
#[command(name = "guild-ledger")]
#[command(about = "Durable reward, level and channel ledgers with Gist backup")]
pub struct Args {
    /// Directory holding the domain files
    #[arg(long, env = "DATA_DIR", default_value = ".")]
    pub data_dir: PathBuf,

    /// Address for the liveness endpoint
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Maximum queued commands before callers wait
    #[arg(long, env = "QUEUE_SIZE", default_value_t = DEFAULT_QUEUE_SIZE)]
    pub queue_size: usize,

    /// Remote mirror configuration
    #[command(flatten)]
    pub gist: GistArgs,
}

/// GitHub Gist mirror configuration
#[derive(Parser, Debug, Clone)]
pub struct GistArgs {
    /// Gist holding the mirrored domain files
    #[arg(long, env = "GIST_ID")]
    pub gist_id: Option<String>,

    /// Token with gist scope
    #[arg(long, env = "GITHUB_GIST_TOKEN", hide_env_values = true)]
    pub gist_token: Option<String>,

    /// GitHub API root
    #[arg(long, env = "GIST_API_URL", default_value = DEFAULT_API_URL)]
    pub gist_api_url: String,

    /// Timeout for each mirror request in seconds
    #[arg(long, env = "REMOTE_TIMEOUT_SECS", default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub remote_timeout_secs: u64,

    /// Comma-separated domains pushed to the mirror (rewards, levels, channels)
    #[arg(long, env = "MIRROR_DOMAINS", value_delimiter = ',', default_value = "rewards")]
    pub mirror_domains: Vec<String>,
}

impl Args {
    /// Mirror settings, or `None` when credentials are missing
    pub fn remote_settings(&self) -> Option<RemoteSettings> {
        let gist_id = self.gist.gist_id.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
        let token = self.gist.gist_token.as_deref().map(str::trim).filter(|s| !s.is_empty())?;

        Some(RemoteSettings {
            api_url: self.gist.gist_api_url.clone(),
            gist_id: gist_id.to_string(),
            token: token.to_string(),
            timeout_secs: self.gist.remote_timeout_secs,
        })
    }

    /// Parsed mirror domain list. Unknown names are skipped; `validate` reports them.
    pub fn mirrored_domains(&self) -> Vec<Domain> {
        let mut domains = Vec::new();
        for domain in self.gist.mirror_domains.iter().filter_map(|n| Domain::from_name(n)) {
            if !domains.contains(&domain) {
                domains.push(domain);
            }
        }
        domains
    }

    pub fn ledger_config(&self) -> LedgerConfig {
        LedgerConfig {
            data_dir: self.data_dir.clone(),
            remote: self.remote_settings(),
            mirrored: self.mirrored_domains(),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.gist.remote_timeout_secs == 0 {
            return Err("REMOTE_TIMEOUT_SECS must be greater than zero".to_string());
        }

        if self.queue_size == 0 {
            return Err("QUEUE_SIZE must be greater than zero".to_string());
        }

        let unknown: Vec<&str> = self
            .gist
            .mirror_domains
            .iter()
            .map(|n| n.trim())
            .filter(|n| !n.is_empty() && Domain::from_name(n).is_none())
            .collect();
        if !unknown.is_empty() {
            return Err(format!(
                "Unknown MIRROR_DOMAINS entries: {} (expected rewards, levels, channels)",
                unknown.join(", ")
            ));
        }

        Ok(())
    }
}
