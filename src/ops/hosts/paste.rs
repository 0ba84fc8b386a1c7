//! Paste-service storage host.
//!
//! Write-mostly: every written file becomes one externally visible paste.
//! The service offers no way to enumerate, read back, or remove pastes
//! through this surface, so everything except writing fails with a
//! protocol error.

use async_trait::async_trait;

use crate::ops::sdk::StorageHost;
use crate::prelude::*;

const PASTE_API_URL: &str = "https://pastebin.com/api/api_post.php";

pub struct PasteHost {
    client: reqwest::Client,
    api_key: String,
    api_url: String,
}

impl PasteHost {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_api_url(api_key, PASTE_API_URL)
    }

    pub fn with_api_url(api_key: impl Into<String>, api_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            api_url: api_url.into(),
        }
    }

    fn unsupported(&self, operation: &str) -> Error {
        Error::Protocol(format!("{} does not support {operation}", self.host_name()))
    }
}

#[async_trait]
impl StorageHost for PasteHost {
    fn host_name(&self) -> &'static str {
        "Pastebin"
    }

    async fn exists(&self, _path: &FilePath) -> Result<bool> {
        Err(self.unsupported("querying pastes"))
    }

    async fn is_directory_unchecked(&self, _path: &FilePath) -> Result<bool> {
        Err(self.unsupported("directories"))
    }

    async fn list_unchecked(&self, _path: &FilePath) -> Result<Vec<String>> {
        Err(self.unsupported("listing pastes"))
    }

    async fn read_file_unchecked(&self, _path: &FilePath) -> Result<String> {
        Err(self.unsupported("reading pastes"))
    }

    async fn write_file_unchecked(&self, path: &FilePath, content: &str) -> Result<()> {
        let response = self
            .client
            .post(&self.api_url)
            .form(&[
                ("api_option", "paste"),
                ("api_dev_key", self.api_key.as_str()),
                ("api_paste_code", content),
                ("api_paste_name", path.basename()),
                ("api_paste_private", "1"),
                ("api_paste_expire_date", "N"),
            ])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Error::Protocol(format!(
                "creating paste '{path}' failed with status {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn make_directory_unchecked(&self, _path: &FilePath) -> Result<()> {
        Err(self.unsupported("directories"))
    }

    async fn delete_file_unchecked(&self, _path: &FilePath) -> Result<()> {
        Err(self.unsupported("deleting pastes"))
    }

    /// Posts the content as a new paste directly; the service has no
    /// occupancy or parent directories to reconcile first.
    async fn write_file(&self, path: &FilePath, content: &str) -> Result<()> {
        self.write_file_unchecked(path, content).await
    }

    async fn read_file(&self, _path: &FilePath) -> Result<String> {
        Err(self.unsupported("reading pastes"))
    }

    async fn delete(&self, _path: &FilePath) -> Result<()> {
        Err(self.unsupported("deleting pastes"))
    }
}
