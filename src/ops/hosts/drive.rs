//! Google Drive storage host.
//!
//! Drive models files and directories as a flat object graph addressed by
//! opaque ids with parent links, so every path is resolved to an id by
//! walking its segments, one metadata query per segment, with nothing
//! cached. Writes go through Drive's resumable upload protocol: a
//! metadata request opens a session url, chunks are PUT against it with
//! explicit byte ranges, and a 308 response reports how much the server
//! has received so the client can continue from there.

use async_trait::async_trait;
use bytes::Bytes;
use regex::Regex;
use reqwest::header::{self, HeaderMap};
use reqwest::{StatusCode, redirect};
use serde::Deserialize;

use crate::ops::auth::AccessTokenProvider;
use crate::ops::sdk::StorageHost;
use crate::prelude::*;

const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";
const MAX_QUERY_PAGE_SIZE: usize = 1000;
const ROOT_FILE_ID: &str = "root";

static BYTE_RANGE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^bytes=(\d+)-(\d+)$").unwrap());

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DriveHostOptions {
    pub api_base_url: String,
    pub upload_base_url: String,
    pub max_upload_attempts: usize,
    pub upload_chunk_size: usize,
}

impl Default for DriveHostOptions {
    fn default() -> Self {
        Self {
            api_base_url: "https://www.googleapis.com/drive/v3".to_string(),
            upload_base_url: "https://www.googleapis.com/upload/drive/v3".to_string(),
            max_upload_attempts: 3,
            upload_chunk_size: DriveHost::MAX_UPLOAD_CHUNK_SIZE,
        }
    }
}

#[derive(Debug, Deserialize)]
struct DriveFile {
    id: Option<String>,
    name: Option<String>,
    #[serde(rename = "mimeType")]
    mime_type: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct DriveFileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

pub struct DriveHost {
    client: reqwest::Client,
    token_provider: Arc<dyn AccessTokenProvider>,
    options: DriveHostOptions,
}

impl DriveHost {
    pub const MAX_UPLOAD_CHUNK_SIZE: usize = 5_242_880;
    pub const UPLOAD_CHUNK_FACTOR: usize = 262_144;

    /// Builds a host, rejecting an invalid upload chunk size immediately
    /// rather than at upload time.
    pub fn new(
        token_provider: Arc<dyn AccessTokenProvider>,
        options: DriveHostOptions,
    ) -> Result<Self> {
        if !Self::upload_chunk_size_is_valid(options.upload_chunk_size) {
            return Err(Error::Protocol(format!(
                "invalid upload chunk size: {}",
                options.upload_chunk_size
            )));
        }
        // 308 must reach the upload loop, not the redirect layer.
        let client = reqwest::Client::builder()
            .redirect(redirect::Policy::none())
            .build()?;
        Ok(Self {
            client,
            token_provider,
            options,
        })
    }

    /// A chunk size must be a positive multiple of
    /// [`DriveHost::UPLOAD_CHUNK_FACTOR`] no larger than
    /// [`DriveHost::MAX_UPLOAD_CHUNK_SIZE`].
    pub fn upload_chunk_size_is_valid(upload_chunk_size: usize) -> bool {
        upload_chunk_size > 0
            && upload_chunk_size <= Self::MAX_UPLOAD_CHUNK_SIZE
            && upload_chunk_size % Self::UPLOAD_CHUNK_FACTOR == 0
    }

    fn parse_byte_range(headers: &HeaderMap) -> Result<(usize, usize)> {
        let range = headers
            .get(header::RANGE)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| Error::protocol("range header missing or invalid"))?;
        let captures = BYTE_RANGE
            .captures(range)
            .ok_or_else(|| Error::Protocol(format!("malformed byte range \"{range}\"")))?;
        let min: usize = captures[1]
            .parse()
            .map_err(|_| Error::Protocol(format!("malformed byte range \"{range}\"")))?;
        let max: usize = captures[2]
            .parse()
            .map_err(|_| Error::Protocol(format!("malformed byte range \"{range}\"")))?;
        if min > max {
            return Err(Error::Protocol(format!("invalid byte range {min}-{max}")));
        }
        Ok((min, max))
    }

    async fn query_files(
        &self,
        name: Option<&str>,
        parent_id: Option<&str>,
        fields: &str,
        limit: usize,
    ) -> Result<Vec<DriveFile>> {
        let token = self.token_provider.get_access_token().await?;

        let mut query_parts = Vec::new();
        if let Some(name) = name {
            query_parts.push(format!("name = '{}'", urlencoding::encode(name)));
        }
        if let Some(parent_id) = parent_id {
            query_parts.push(format!("'{parent_id}' in parents"));
        }
        query_parts.push("trashed = false".to_string());
        let query = query_parts.join(" and ");
        let page_size = limit.min(MAX_QUERY_PAGE_SIZE).to_string();

        let url = format!("{}/files", self.options.api_base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("q", query.as_str()),
                ("fields", fields),
                ("pageSize", page_size.as_str()),
            ])
            .bearer_auth(&token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Protocol(format!(
                "metadata query failed with status {}",
                response.status()
            )));
        }
        let list: DriveFileList = response.json().await?;
        Ok(list.files)
    }

    /// Resolves a path to a file id by walking its segments from the root,
    /// one child query per segment. Nothing is cached; every lookup
    /// re-walks the whole path.
    async fn id_for_path(&self, path: &FilePath) -> Result<Option<String>> {
        let mut id = ROOT_FILE_ID.to_string();
        for segment in path.segments() {
            let files = self
                .query_files(Some(segment), Some(&id), "files(id)", 1)
                .await?;
            match files.into_iter().next().and_then(|file| file.id) {
                Some(child_id) => id = child_id,
                None => return Ok(None),
            }
        }
        Ok(Some(id))
    }

    async fn resolved_id(&self, path: &FilePath) -> Result<String> {
        self.id_for_path(path)
            .await?
            .ok_or_else(|| Error::NotFound(path.clone()))
    }

    async fn initiate_upload(&self, path: &FilePath) -> Result<String> {
        let token = self.token_provider.get_access_token().await?;
        let parent_id = self.resolved_id(&path.parent()).await?;

        let url = format!("{}/files?uploadType=resumable", self.options.upload_base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&serde_json::json!({
                "name": path.basename(),
                "parents": [parent_id],
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Protocol(format!(
                "upload initiation failed with status {}",
                response.status()
            )));
        }
        response
            .headers()
            .get(header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| Error::protocol("upload initiation response carries no session url"))
    }

    async fn upload_chunk(
        &self,
        upload_url: &str,
        payload: &Bytes,
        first_byte: usize,
        end: usize,
    ) -> Result<reqwest::Response> {
        let token = self.token_provider.get_access_token().await?;
        let response = self
            .client
            .put(upload_url)
            .bearer_auth(token)
            .header(
                header::CONTENT_RANGE,
                format!("bytes {}-{}/{}", first_byte, end - 1, payload.len()),
            )
            .body(payload.slice(first_byte..end))
            .send()
            .await?;
        Ok(response)
    }

    /// Chunked upload loop against an open session. The first request
    /// carries one chunk; after the server reports the range it has
    /// received, the remainder is sent from the reported offset onward.
    async fn resumable_upload(
        &self,
        upload_url: &str,
        payload: &Bytes,
        first_byte: usize,
    ) -> Result<()> {
        if payload.is_empty() {
            // A zero-length upload has no chunk to send; finalize the
            // session directly.
            let token = self.token_provider.get_access_token().await?;
            let response = self
                .client
                .put(upload_url)
                .bearer_auth(token)
                .header(header::CONTENT_RANGE, "bytes */0")
                .send()
                .await?;
            if response.status().is_success() {
                return Ok(());
            }
            return Err(Error::Protocol(format!(
                "resumable upload failed with status {}",
                response.status()
            )));
        }

        let mut byte = first_byte;
        let mut end = (byte + self.options.upload_chunk_size).min(payload.len());
        while byte < payload.len() {
            let response = self.upload_chunk(upload_url, payload, byte, end).await?;
            let status = response.status();
            if status.is_success() {
                return Ok(());
            } else if status == StatusCode::PERMANENT_REDIRECT {
                let (_, received_max) = Self::parse_byte_range(response.headers())?;
                byte = received_max + 1;
                end = payload.len();
            } else {
                return Err(Error::Protocol(format!(
                    "resumable upload failed with status {status}"
                )));
            }
        }
        Ok(())
    }

    /// Asks the session what it has received so far, with a zero-length
    /// probe spanning the whole intended upload, and continues from the
    /// reported offset. A dead session is replaced by a fresh one and the
    /// upload restarts from zero.
    async fn resume_incomplete_upload(
        &self,
        path: &FilePath,
        upload_url: &str,
        payload: &Bytes,
    ) -> Result<()> {
        let token = self.token_provider.get_access_token().await?;
        let response = self
            .client
            .put(upload_url)
            .bearer_auth(token)
            .header(header::CONTENT_RANGE, format!("bytes */{}", payload.len()))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::PERMANENT_REDIRECT {
            let (_, received_max) = Self::parse_byte_range(response.headers())?;
            return self
                .resumable_upload(upload_url, payload, received_max + 1)
                .await;
        }
        if status.is_success() {
            return Ok(());
        }

        let new_upload_url = self.initiate_upload(path).await?;
        self.resumable_upload(&new_upload_url, payload, 0).await
    }
}

#[async_trait]
impl StorageHost for DriveHost {
    fn host_name(&self) -> &'static str {
        "Google Drive"
    }

    /// Confirms a token can be obtained from the credential provider.
    async fn authenticate(&self) -> Result<()> {
        self.token_provider.get_access_token().await?;
        info!("authenticated against {}", self.host_name());
        Ok(())
    }

    async fn exists(&self, path: &FilePath) -> Result<bool> {
        Ok(self.id_for_path(path).await?.is_some())
    }

    async fn is_directory_unchecked(&self, path: &FilePath) -> Result<bool> {
        if path.is_root() {
            return Ok(true);
        }
        let parent_id = self.resolved_id(&path.parent()).await?;
        let files = self
            .query_files(Some(path.basename()), Some(&parent_id), "files(mimeType)", 1)
            .await?;
        let file = files
            .first()
            .ok_or_else(|| Error::Protocol(format!("no metadata for '{path}'")))?;
        Ok(file.mime_type.as_deref() == Some(FOLDER_MIME_TYPE))
    }

    // TODO: page queries on directories with more than 1000 children.
    async fn list_unchecked(&self, path: &FilePath) -> Result<Vec<String>> {
        let id = self.resolved_id(path).await?;
        let files = self
            .query_files(None, Some(&id), "files(name)", MAX_QUERY_PAGE_SIZE)
            .await?;
        Ok(files.into_iter().filter_map(|file| file.name).collect())
    }

    async fn read_file_unchecked(&self, path: &FilePath) -> Result<String> {
        let id = self.resolved_id(path).await?;
        let token = self.token_provider.get_access_token().await?;
        let url = format!("{}/files/{id}", self.options.api_base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("alt", "media")])
            .bearer_auth(token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Error::Protocol(format!(
                "reading '{path}' failed with status {}",
                response.status()
            )));
        }
        Ok(response.text().await?)
    }

    /// Uploads through the resumable protocol, retrying up to the
    /// configured attempt budget and surfacing every attempt's error when
    /// the budget is exhausted.
    async fn write_file_unchecked(&self, path: &FilePath, content: &str) -> Result<()> {
        let payload = Bytes::copy_from_slice(content.as_bytes());
        let upload_url = self.initiate_upload(path).await?;

        let mut attempts = Vec::new();
        match self.resumable_upload(&upload_url, &payload, 0).await {
            Ok(()) => return Ok(()),
            Err(err) => {
                warn!("upload of {path} failed, will resume: {err}");
                attempts.push(err);
            }
        }
        for attempt in 1..self.options.max_upload_attempts {
            match self
                .resume_incomplete_upload(path, &upload_url, &payload)
                .await
            {
                Ok(()) => return Ok(()),
                Err(err) => {
                    warn!(
                        "upload attempt {} of {} for {path} failed: {err}",
                        attempt + 1,
                        self.options.max_upload_attempts
                    );
                    attempts.push(err);
                }
            }
        }
        Err(Error::UploadExhausted { attempts })
    }

    async fn make_directory_unchecked(&self, path: &FilePath) -> Result<()> {
        let token = self.token_provider.get_access_token().await?;
        let parent_id = self.resolved_id(&path.parent()).await?;
        let url = format!("{}/files", self.options.api_base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&serde_json::json!({
                "name": path.basename(),
                "mimeType": FOLDER_MIME_TYPE,
                "parents": [parent_id],
            }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Error::Protocol(format!(
                "creating directory '{path}' failed with status {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn delete_file_unchecked(&self, path: &FilePath) -> Result<()> {
        let id = self.resolved_id(path).await?;
        let token = self.token_provider.get_access_token().await?;
        let url = format!("{}/files/{id}", self.options.api_base_url);
        let response = self.client.delete(&url).bearer_auth(token).send().await?;
        if !response.status().is_success() {
            return Err(Error::Protocol(format!(
                "deleting '{path}' failed with status {}",
                response.status()
            )));
        }
        Ok(())
    }
}
