//! GitHub Gist backend - off-process backup of domain snapshots
//!
//! Each domain lives as one file inside a single gist. Fetch reads the file
//! content, store replaces it wholesale with a PATCH. There is no merge: the
//! last writer wins.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, Response, Url};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{Backend, Domain};
use crate::error::{RemoteError, StoreError};

/// Default GitHub REST API root
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Default bound on each mirror request
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Host serving raw content of truncated gist files
const RAW_CONTENT_HOST: &str = "gist.githubusercontent.com";

/// Largest response body excerpt kept in an error
const ERROR_BODY_LIMIT: usize = 200;

/// Connection settings for the gist mirror
#[derive(Debug, Clone)]
pub struct RemoteSettings {
    pub api_url: String,
    pub gist_id: String,
    pub token: String,
    pub timeout_secs: u64,
}

/// Gist as returned by `GET /gists/{id}`. Only the fields we read.
#[derive(Debug, Deserialize)]
struct GistDocument {
    #[serde(default)]
    files: HashMap<String, GistFile>,
}

#[derive(Debug, Deserialize)]
struct GistFile {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    truncated: bool,
    #[serde(default)]
    raw_url: Option<String>,
}

/// Mirror backed by one GitHub gist.
pub struct GistBackend {
    client: Client,
    settings: RemoteSettings,
}

impl GistBackend {
    pub fn new(settings: RemoteSettings) -> Result<Self, RemoteError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/vnd.github+json"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .user_agent(concat!("guild-ledger/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| RemoteError::Client(e.to_string()))?;

        Ok(Self { client, settings })
    }

    pub fn gist_id(&self) -> &str {
        &self.settings.gist_id
    }

    fn gist_url(&self) -> String {
        format!(
            "{}/gists/{}",
            self.settings.api_url.trim_end_matches('/'),
            self.settings.gist_id
        )
    }

    fn request_error(&self, e: reqwest::Error) -> RemoteError {
        if e.is_timeout() {
            RemoteError::Timeout(self.settings.timeout_secs)
        } else {
            RemoteError::Network(e.to_string())
        }
    }

    /// Turn a non-2xx response into an error carrying a short body excerpt.
    async fn check_status(response: Response) -> Result<Response, RemoteError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let mut body = response.text().await.unwrap_or_default();
        if body.len() > ERROR_BODY_LIMIT {
            let mut cut = ERROR_BODY_LIMIT;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }

        Err(RemoteError::Status {
            status: status.as_u16(),
            body,
        })
    }

    /// Whether the token may be sent to `url`: the API origin itself, or
    /// GitHub's raw content host over https.
    fn is_trusted(&self, url: &Url) -> bool {
        let same_origin = Url::parse(&self.settings.api_url)
            .map(|api| api.origin() == url.origin())
            .unwrap_or(false);
        same_origin || (url.scheme() == "https" && url.host_str() == Some(RAW_CONTENT_HOST))
    }

    async fn fetch_raw(&self, raw_url: &str) -> Result<String, RemoteError> {
        let url = Url::parse(raw_url)
            .map_err(|e| RemoteError::Parse(format!("invalid raw_url {}: {}", raw_url, e)))?;

        let mut request = self.client.get(url.clone());
        if self.is_trusted(&url) {
            request = request.bearer_auth(&self.settings.token);
        } else {
            debug!(host = url.host_str().unwrap_or(""), "Fetching raw_url without credentials");
        }

        let response = request
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        Self::check_status(response)
            .await?
            .text()
            .await
            .map_err(|e| self.request_error(e))
    }
}

#[async_trait]
impl Backend for GistBackend {
    fn kind(&self) -> &'static str {
        "gist"
    }

    async fn fetch(&self, domain: Domain) -> Result<Option<String>, StoreError> {
        let response = self
            .client
            .get(self.gist_url())
            .bearer_auth(&self.settings.token)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        let gist: GistDocument = Self::check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| RemoteError::Parse(e.to_string()))?;

        let Some(file) = gist.files.get(domain.file_name) else {
            return Ok(None);
        };

        // Large files come back truncated; the full text is behind raw_url
        if file.truncated {
            let raw_url = file.raw_url.as_deref().ok_or_else(|| {
                RemoteError::Parse(format!("{} is truncated without raw_url", domain.file_name))
            })?;
            return Ok(Some(self.fetch_raw(raw_url).await?));
        }

        match &file.content {
            Some(content) => Ok(Some(content.clone())),
            None => Err(RemoteError::Parse(format!("{} has no content", domain.file_name)).into()),
        }
    }

    async fn store(&self, domain: Domain, content: &str) -> Result<(), StoreError> {
        let payload = json!({
            "files": {
                domain.file_name: { "content": content }
            }
        });

        let response = self
            .client
            .patch(self.gist_url())
            .bearer_auth(&self.settings.token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        Self::check_status(response).await?;
        Ok(())
    }
}
