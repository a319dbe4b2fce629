//! Drive v3 REST implementation of [`ChunkTransport`].
//!
//! Chunked reads use `Range` requests against `files/{id}?alt=media` (or the
//! export endpoint), so every chunk is an independent request and a failed
//! chunk can be re-requested without reopening the session.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::{CONTENT_RANGE, CONTENT_TYPE, RANGE};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, instrument, trace};
use url::Url;

use super::error::{TransportError, parse_error_body};
use super::{ChunkRead, ChunkStream, ChunkTransport, RemoteNode, TransferMode};
use crate::config::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use crate::credentials::Credential;
use crate::user_agent;

/// Public Drive API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://www.googleapis.com";

const FILE_FIELDS: &str = "id,name,mimeType,shortcutDetails";

const LIST_FIELDS: &str = "nextPageToken,files(id,name,mimeType,shortcutDetails)";

const LIST_PAGE_SIZE: &str = "200";

/// HTTP client for the Drive v3 API.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct DriveClient {
    http: Client,
    base_url: Url,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileListPage {
    #[serde(default)]
    files: Vec<RemoteNode>,
    #[serde(default)]
    next_page_token: Option<String>,
}

impl DriveClient {
    /// Creates a client against the public API endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the HTTP client cannot be built.
    pub fn new() -> Result<Self, TransportError> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Creates a client against a custom base URL (used by tests and proxies).
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidUrl`] for an unparsable base URL.
    pub fn with_base_url(base_url: &str) -> Result<Self, TransportError> {
        Self::with_timeouts(base_url, CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS)
    }

    /// Creates a client with explicit connect/read timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the URL is invalid or the client cannot be built.
    pub fn with_timeouts(
        base_url: &str,
        connect_timeout_secs: u64,
        read_timeout_secs: u64,
    ) -> Result<Self, TransportError> {
        let mut base_url =
            Url::parse(base_url).map_err(|_| TransportError::invalid_url(base_url))?;
        // Endpoints join relative to the base, so keep its path as a directory.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout_secs))
            .read_timeout(Duration::from_secs(read_timeout_secs))
            .gzip(true)
            .user_agent(user_agent::default_user_agent())
            .build()
            .map_err(|e| TransportError::network(base_url.as_str(), e))?;
        Ok(Self { http, base_url })
    }

    fn endpoint(&self, path: &str) -> Result<Url, TransportError> {
        self.base_url
            .join(path)
            .map_err(|_| TransportError::invalid_url(format!("{}{path}", self.base_url)))
    }

    fn file_url(&self, object_id: &str, mode: &TransferMode) -> Result<Url, TransportError> {
        match mode {
            TransferMode::Media => {
                let mut url = self.endpoint(&format!("drive/v3/files/{object_id}"))?;
                url.query_pairs_mut()
                    .append_pair("alt", "media")
                    .append_pair("supportsAllDrives", "true")
                    .append_pair("acknowledgeAbuse", "true");
                Ok(url)
            }
            TransferMode::Export { mime_type } => {
                let mut url = self.endpoint(&format!("drive/v3/files/{object_id}/export"))?;
                url.query_pairs_mut().append_pair("mimeType", mime_type);
                Ok(url)
            }
        }
    }
}

#[async_trait]
impl ChunkTransport for DriveClient {
    #[instrument(level = "debug", skip(self, credential), fields(credential = %credential.label()))]
    async fn fetch_metadata(
        &self,
        credential: &Credential,
        id: &str,
    ) -> Result<RemoteNode, TransportError> {
        let resource = format!("files/{id}");
        let mut url = self.endpoint(&format!("drive/v3/files/{id}"))?;
        url.query_pairs_mut()
            .append_pair("supportsAllDrives", "true")
            .append_pair("fields", FILE_FIELDS);
        let response = self
            .http
            .get(url)
            .bearer_auth(credential.token())
            .send()
            .await
            .map_err(|e| TransportError::network(&resource, e))?;
        if !response.status().is_success() {
            return Err(api_error(&resource, response).await);
        }
        response
            .json::<RemoteNode>()
            .await
            .map_err(|e| TransportError::invalid_response(&resource, e.to_string()))
    }

    #[instrument(level = "debug", skip(self, credential), fields(credential = %credential.label()))]
    async fn list_children(
        &self,
        credential: &Credential,
        folder_id: &str,
    ) -> Result<Vec<RemoteNode>, TransportError> {
        let resource = format!("children of {folder_id}");
        let query = format!("'{folder_id}' in parents and trashed = false");
        let mut items = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut url = self.endpoint("drive/v3/files")?;
            {
                let mut pairs = url.query_pairs_mut();
                pairs
                    .append_pair("q", &query)
                    .append_pair("supportsAllDrives", "true")
                    .append_pair("includeItemsFromAllDrives", "true")
                    .append_pair("spaces", "drive")
                    .append_pair("pageSize", LIST_PAGE_SIZE)
                    .append_pair("fields", LIST_FIELDS)
                    .append_pair("orderBy", "folder, name");
                if let Some(token) = page_token.as_deref() {
                    pairs.append_pair("pageToken", token);
                }
            }
            let response = self
                .http
                .get(url)
                .bearer_auth(credential.token())
                .send()
                .await
                .map_err(|e| TransportError::network(&resource, e))?;
            if !response.status().is_success() {
                return Err(api_error(&resource, response).await);
            }
            let page: FileListPage = response
                .json()
                .await
                .map_err(|e| TransportError::invalid_response(&resource, e.to_string()))?;
            trace!(count = page.files.len(), "listed page");
            items.extend(page.files);
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
        debug!(folder_id, count = items.len(), "listed folder");
        Ok(items)
    }

    fn open_chunk_stream(
        &self,
        credential: &Credential,
        object_id: &str,
        mode: &TransferMode,
        chunk_size: u64,
    ) -> Box<dyn ChunkStream> {
        Box::new(DriveChunkStream {
            http: self.http.clone(),
            url: self.file_url(object_id, mode),
            token: credential.token().to_string(),
            resource: format!("files/{object_id}"),
            position: 0,
            chunk_size: chunk_size.max(1),
        })
    }
}

/// One ranged read session. The URL error (if any) is deferred to the first
/// `next_chunk` call so opening a stream is infallible.
struct DriveChunkStream {
    http: Client,
    url: Result<Url, TransportError>,
    token: String,
    resource: String,
    position: u64,
    chunk_size: u64,
}

#[async_trait]
impl ChunkStream for DriveChunkStream {
    async fn next_chunk(&mut self) -> Result<ChunkRead, TransportError> {
        let url = match &self.url {
            Ok(url) => url.clone(),
            Err(_) => return Err(TransportError::invalid_url(self.resource.clone())),
        };
        let end = self.position + self.chunk_size - 1;
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .header(RANGE, format!("bytes={}-{end}", self.position))
            .send()
            .await
            .map_err(|e| TransportError::network(&self.resource, e))?;

        let status = response.status();
        if status == StatusCode::RANGE_NOT_SATISFIABLE && self.position == 0 {
            // Zero-length objects cannot satisfy any range.
            return Ok(ChunkRead {
                data: Vec::new(),
                is_final: true,
            });
        }
        if !status.is_success() {
            return Err(api_error(&self.resource, response).await);
        }

        let total = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_content_range_total);

        let mut data = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(piece) = stream.next().await {
            let piece = piece.map_err(|e| TransportError::network(&self.resource, e))?;
            data.extend_from_slice(&piece);
        }

        let read = data.len() as u64;
        let is_final = if status == StatusCode::PARTIAL_CONTENT {
            match total {
                Some(total) => self.position + read >= total,
                None => read < self.chunk_size,
            }
        } else {
            // Server ignored the range and sent the whole object.
            true
        };
        self.position += read;
        debug!(
            resource = %self.resource,
            bytes = read,
            position = self.position,
            total,
            is_final,
            "chunk received"
        );
        Ok(ChunkRead { data, is_final })
    }
}

async fn api_error(resource: &str, response: Response) -> TransportError {
    let status = response.status();
    let is_json = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/json"));
    let body = response.text().await.unwrap_or_default();
    let details = if is_json {
        parse_error_body(&body)
    } else {
        None
    };
    let fallback = || {
        if body.trim().is_empty() {
            status.canonical_reason().unwrap_or("request failed").to_string()
        } else {
            body.clone()
        }
    };
    match details {
        Some(details) => TransportError::api(
            resource,
            status.as_u16(),
            details.reason,
            details.message.unwrap_or_else(fallback),
        ),
        None => TransportError::api(resource, status.as_u16(), None, fallback()),
    }
}

/// Parses the total length from `bytes 0-99/1234`. Unknown totals (`*`) yield `None`.
fn parse_content_range_total(value: &str) -> Option<u64> {
    let (_, total) = value.trim().rsplit_once('/')?;
    total.trim().parse().ok()
}
