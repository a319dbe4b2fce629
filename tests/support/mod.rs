//! Shared fixtures for engine integration tests.
//!
//! [`MockTransport`] serves an in-memory tree with scripted chunk faults and
//! per-credential quota exhaustion; [`RecordingListener`] counts callbacks.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use drive_core::remote::{ChunkRead, ChunkStream, FOLDER_MIME_TYPE, TransferMode};
use drive_core::{
    ChunkTransport, Credential, CredentialPool, DownloadListener, DownloadOrchestrator,
    DownloadRequest, EngineConfig, ProgressSnapshot, RemoteNode, RetryPolicy, TransportError,
};

pub const GDOC_MIME: &str = "application/vnd.google-apps.document";
pub const PDF_MIME: &str = "application/pdf";
pub const ZIP_MIME: &str = "application/zip";

/// A fault injected into one `next_chunk` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Retryable status (429/5xx).
    Transient(u16),
    /// Quota exhausted on whatever credential is active.
    Quota,
    /// Non-retryable client error.
    Fatal,
    /// Object gone.
    NotFound,
}

impl Fault {
    fn to_error(self, object_id: &str) -> TransportError {
        match self {
            Self::Transient(status) => {
                TransportError::api(object_id, status, None, "Service Unavailable")
            }
            Self::Quota => TransportError::api(
                object_id,
                403,
                Some("downloadQuotaExceeded".to_string()),
                "The download quota for this file has been exceeded.",
            ),
            Self::Fatal => TransportError::api(
                object_id,
                400,
                Some("badRequest".to_string()),
                "<b>Bad</b> request",
            ),
            Self::NotFound => not_found(object_id),
        }
    }
}

fn not_found(object_id: &str) -> TransportError {
    TransportError::api(
        object_id,
        404,
        Some("notFound".to_string()),
        format!("File not found: {object_id}."),
    )
}

/// Record of one opened chunk stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedStream {
    pub object_id: String,
    pub credential: String,
    pub exporting: bool,
}

#[derive(Default)]
struct Inner {
    nodes: HashMap<String, RemoteNode>,
    children: HashMap<String, Vec<RemoteNode>>,
    media: HashMap<String, Vec<u8>>,
    exports: HashMap<String, Vec<u8>>,
    hidden_from: HashSet<String>,
    quota_exhausted: Mutex<HashSet<String>>,
    scripts: Mutex<HashMap<String, VecDeque<Option<Fault>>>>,
    cancel_after: Mutex<Option<(usize, Arc<DownloadRequest>)>>,
    metadata_calls: AtomicUsize,
    list_calls: AtomicUsize,
    chunk_calls: AtomicUsize,
    served_chunks: AtomicUsize,
    opened: Mutex<Vec<OpenedStream>>,
}

/// In-memory remote store.
#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<Inner>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn inner_mut(&mut self) -> &mut Inner {
        Arc::get_mut(&mut self.inner).expect("configure mock before sharing it")
    }

    /// Registers a folder node and its children.
    pub fn folder(mut self, id: &str, name: &str, children: Vec<RemoteNode>) -> Self {
        let inner = self.inner_mut();
        inner
            .nodes
            .insert(id.to_string(), RemoteNode::new(id, name, FOLDER_MIME_TYPE));
        for child in &children {
            inner.nodes.insert(child.id.clone(), child.clone());
        }
        inner.children.insert(id.to_string(), children);
        self
    }

    /// Registers a binary file node with its bytes.
    pub fn file(mut self, id: &str, name: &str, mime_type: &str, data: &[u8]) -> Self {
        let inner = self.inner_mut();
        inner
            .nodes
            .insert(id.to_string(), RemoteNode::new(id, name, mime_type));
        inner.media.insert(id.to_string(), data.to_vec());
        self
    }

    /// Registers a native document that only serves export bytes.
    pub fn native_document(mut self, id: &str, name: &str, data: &[u8]) -> Self {
        let inner = self.inner_mut();
        inner
            .nodes
            .insert(id.to_string(), RemoteNode::new(id, name, GDOC_MIME));
        inner.exports.insert(id.to_string(), data.to_vec());
        self
    }

    /// Sets bytes for an object without registering metadata.
    pub fn content(mut self, id: &str, data: &[u8]) -> Self {
        self.inner_mut().media.insert(id.to_string(), data.to_vec());
        self
    }

    /// Metadata lookups with this credential label answer 404.
    pub fn hidden_from(mut self, label: &str) -> Self {
        self.inner_mut().hidden_from.insert(label.to_string());
        self
    }

    /// Chunk reads with this credential label fail with a quota error.
    pub fn quota_exhausted_for(self, label: &str) -> Self {
        lock(&self.inner.quota_exhausted).insert(label.to_string());
        self
    }

    /// Scripts successive `next_chunk` calls for `object_id`.
    ///
    /// `None` serves the next chunk normally, `Some(fault)` fails the call.
    /// Calls beyond the script are served normally.
    pub fn script(self, object_id: &str, steps: Vec<Option<Fault>>) -> Self {
        lock(&self.inner.scripts).insert(object_id.to_string(), steps.into());
        self
    }

    /// Cancels `request` once `chunks` chunks have been served in total.
    pub fn cancel_after_chunks(&self, chunks: usize, request: Arc<DownloadRequest>) {
        *lock(&self.inner.cancel_after) = Some((chunks, request));
    }

    pub fn metadata_calls(&self) -> usize {
        self.inner.metadata_calls.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.inner.list_calls.load(Ordering::SeqCst)
    }

    pub fn chunk_calls(&self) -> usize {
        self.inner.chunk_calls.load(Ordering::SeqCst)
    }

    pub fn opened_streams(&self) -> Vec<OpenedStream> {
        lock(&self.inner.opened).clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[async_trait]
impl ChunkTransport for MockTransport {
    async fn fetch_metadata(
        &self,
        credential: &Credential,
        id: &str,
    ) -> Result<RemoteNode, TransportError> {
        self.inner.metadata_calls.fetch_add(1, Ordering::SeqCst);
        if self.inner.hidden_from.contains(credential.label()) {
            return Err(not_found(id));
        }
        self.inner
            .nodes
            .get(id)
            .cloned()
            .ok_or_else(|| not_found(id))
    }

    async fn list_children(
        &self,
        credential: &Credential,
        folder_id: &str,
    ) -> Result<Vec<RemoteNode>, TransportError> {
        self.inner.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.inner.hidden_from.contains(credential.label()) {
            return Err(not_found(folder_id));
        }
        Ok(self
            .inner
            .children
            .get(folder_id)
            .cloned()
            .unwrap_or_default())
    }

    fn open_chunk_stream(
        &self,
        credential: &Credential,
        object_id: &str,
        mode: &TransferMode,
        chunk_size: u64,
    ) -> Box<dyn ChunkStream> {
        let exporting = matches!(mode, TransferMode::Export { .. });
        lock(&self.inner.opened).push(OpenedStream {
            object_id: object_id.to_string(),
            credential: credential.label().to_string(),
            exporting,
        });
        Box::new(MockStream {
            inner: Arc::clone(&self.inner),
            object_id: object_id.to_string(),
            credential: credential.label().to_string(),
            exporting,
            chunk_size: usize::try_from(chunk_size).unwrap_or(usize::MAX),
            position: 0,
        })
    }
}

struct MockStream {
    inner: Arc<Inner>,
    object_id: String,
    credential: String,
    exporting: bool,
    chunk_size: usize,
    position: usize,
}

#[async_trait]
impl ChunkStream for MockStream {
    async fn next_chunk(&mut self) -> Result<ChunkRead, TransportError> {
        self.inner.chunk_calls.fetch_add(1, Ordering::SeqCst);

        let scripted = lock(&self.inner.scripts)
            .get_mut(&self.object_id)
            .and_then(VecDeque::pop_front)
            .flatten();
        if let Some(fault) = scripted {
            return Err(fault.to_error(&self.object_id));
        }
        if lock(&self.inner.quota_exhausted).contains(&self.credential) {
            return Err(Fault::Quota.to_error(&self.object_id));
        }

        let source = if self.exporting {
            &self.inner.exports
        } else {
            &self.inner.media
        };
        let Some(data) = source.get(&self.object_id) else {
            if !self.exporting && self.inner.exports.contains_key(&self.object_id) {
                return Err(TransportError::api(
                    &self.object_id,
                    403,
                    Some("fileNotDownloadable".to_string()),
                    "Only files with binary content can be downloaded. Use Export with Docs Editors files.",
                ));
            }
            return Err(not_found(&self.object_id));
        };

        let end = data.len().min(self.position + self.chunk_size);
        let chunk = data[self.position..end].to_vec();
        self.position = end;
        let is_final = self.position >= data.len();

        let served = self.inner.served_chunks.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((after, request)) = lock(&self.inner.cancel_after).as_ref()
            && served >= *after
        {
            request.cancel();
        }
        Ok(ChunkRead {
            data: chunk,
            is_final,
        })
    }
}

/// Listener that records every callback.
#[derive(Default)]
pub struct RecordingListener {
    pub completed: AtomicUsize,
    pub errors: Mutex<Vec<String>>,
    pub progress: Mutex<Vec<ProgressSnapshot>>,
}

impl RecordingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn errors(&self) -> Vec<String> {
        lock(&self.errors).clone()
    }

    pub fn progress_samples(&self) -> usize {
        lock(&self.progress).len()
    }
}

#[async_trait]
impl DownloadListener for RecordingListener {
    async fn on_download_complete(&self) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    async fn on_download_error(&self, message: &str) {
        lock(&self.errors).push(message.to_string());
    }

    fn on_progress(&self, snapshot: &ProgressSnapshot) {
        lock(&self.progress).push(snapshot.clone());
    }
}

/// Engine configuration with tiny chunks and no retry delays.
pub fn test_config(chunk_size: u64) -> EngineConfig {
    EngineConfig::default()
        .with_chunk_size(chunk_size)
        .with_transient_retry_limit(3)
        .with_retry_policy(RetryPolicy::immediate(3))
        .with_progress_interval(Duration::from_millis(10))
}

pub fn primary() -> Credential {
    Credential::new("primary", "primary-token")
}

pub fn service_accounts(n: usize) -> Vec<Credential> {
    (0..n)
        .map(|i| Credential::new(format!("sa{i}"), format!("sa-token-{i}")))
        .collect()
}

/// Deterministic payload of `len` bytes.
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Builds an orchestrator over `transport`.
pub fn orchestrator(
    transport: &MockTransport,
    pool: CredentialPool,
    config: EngineConfig,
    request: &Arc<DownloadRequest>,
    listener: &Arc<RecordingListener>,
) -> DownloadOrchestrator {
    DownloadOrchestrator::new(
        Arc::new(transport.clone()),
        pool,
        config,
        Arc::clone(request),
        Arc::clone(listener) as Arc<dyn DownloadListener>,
    )
}

/// Relative paths of all files under `root`, sorted.
pub fn list_files(root: &Path) -> Vec<String> {
    let mut out = Vec::new();
    collect(root, root, &mut out);
    out.sort();
    out
}

fn collect(root: &Path, dir: &Path, out: &mut Vec<String>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect(root, &path, out);
        } else if let Ok(rel) = path.strip_prefix(root) {
            out.push(rel.to_string_lossy().replace('\\', "/"));
        }
    }
}
