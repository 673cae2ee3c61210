//! Local file backend - one JSON file per domain in the data directory

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tokio::fs;

use super::{Backend, Domain};
use crate::error::StoreError;

/// Stores each domain as `<data_dir>/<file_name>`.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    dir: PathBuf,
}

impl LocalBackend {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Path of the file holding `domain`
    pub fn path_for(&self, domain: Domain) -> PathBuf {
        self.dir.join(domain.file_name)
    }

    fn io_error(path: &Path, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[async_trait]
impl Backend for LocalBackend {
    fn kind(&self) -> &'static str {
        "local"
    }

    async fn fetch(&self, domain: Domain) -> Result<Option<String>, StoreError> {
        let path = self.path_for(domain);
        match fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Self::io_error(&path, e)),
        }
    }

    async fn store(&self, domain: Domain, content: &str) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| Self::io_error(&self.dir, e))?;

        let path = self.path_for(domain);
        let tmp_path = self.dir.join(format!("{}.tmp", domain.file_name));

        // Write then rename so readers never see a half-written file
        fs::write(&tmp_path, content)
            .await
            .map_err(|e| Self::io_error(&tmp_path, e))?;
        fs::rename(&tmp_path, &path)
            .await
            .map_err(|e| Self::io_error(&path, e))?;

        Ok(())
    }

    /// Rename the file to `<file_name>.corrupt-<UTC timestamp>`.
    async fn quarantine(&self, domain: Domain) -> Result<Option<PathBuf>, StoreError> {
        let path = self.path_for(domain);
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3f");
        let aside = self.dir.join(format!("{}.corrupt-{}", domain.file_name, stamp));

        match fs::rename(&path, &aside).await {
            Ok(()) => Ok(Some(aside)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Self::io_error(&path, e)),
        }
    }
}
