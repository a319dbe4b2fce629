//! Remote store model and transport seam.
//!
//! The engine talks to the remote store only through [`ChunkTransport`]:
//! metadata lookup, child listing and chunked object reads. [`DriveClient`]
//! is the HTTP implementation; tests substitute scripted transports.

mod client;
mod error;
pub mod link;

use async_trait::async_trait;
use serde::Deserialize;

use crate::credentials::Credential;

pub use client::{DEFAULT_BASE_URL, DriveClient};
pub use error::{
    ErrorBodyDetails, NOT_DOWNLOADABLE_REASON, QUOTA_REASONS, TRANSIENT_STATUS_CODES,
    TransportError, parse_error_body,
};
pub use link::{AuthHint, LinkError, ParsedLink, extract_object_id, parse_link};

/// Mime type of remote folders.
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// Mime type of shortcut nodes.
pub const SHORTCUT_MIME_TYPE: &str = "application/vnd.google-apps.shortcut";

const NATIVE_MIME_PREFIX: &str = "application/vnd.google-apps.";

/// Kind of a remote node, derived from its mime type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    File,
    Folder,
    Shortcut,
}

impl NodeKind {
    /// Maps a mime type onto a node kind.
    #[must_use]
    pub fn from_mime_type(mime_type: &str) -> Self {
        match mime_type {
            FOLDER_MIME_TYPE => Self::Folder,
            SHORTCUT_MIME_TYPE => Self::Shortcut,
            _ => Self::File,
        }
    }
}

/// Whether the mime type is a native document that only exists in the store's
/// own format (and therefore can only be exported).
#[must_use]
pub fn is_native_document(mime_type: &str) -> bool {
    mime_type.starts_with(NATIVE_MIME_PREFIX)
        && NodeKind::from_mime_type(mime_type) == NodeKind::File
}

/// Target of a shortcut node.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ShortcutTarget {
    #[serde(rename = "targetId")]
    pub id: String,
    #[serde(rename = "targetMimeType", default)]
    pub mime_type: String,
}

/// Snapshot of one remote node, fetched once per visit.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteNode {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default, rename = "shortcutDetails")]
    pub shortcut_target: Option<ShortcutTarget>,
}

/// A node after following a shortcut to its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedTarget<'a> {
    pub id: &'a str,
    pub mime_type: &'a str,
    pub kind: NodeKind,
}

impl RemoteNode {
    /// Creates a node snapshot.
    pub fn new(id: impl Into<String>, name: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            mime_type: mime_type.into(),
            shortcut_target: None,
        }
    }

    /// Creates a shortcut node pointing at `target_id`.
    pub fn shortcut(
        id: impl Into<String>,
        name: impl Into<String>,
        target_id: impl Into<String>,
        target_mime_type: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            mime_type: SHORTCUT_MIME_TYPE.to_string(),
            shortcut_target: Some(ShortcutTarget {
                id: target_id.into(),
                mime_type: target_mime_type.into(),
            }),
        }
    }

    #[must_use]
    pub fn kind(&self) -> NodeKind {
        NodeKind::from_mime_type(&self.mime_type)
    }

    /// Follows a shortcut to its target id and type.
    ///
    /// Non-shortcut nodes resolve to themselves. A shortcut without target
    /// details is treated as a plain file.
    #[must_use]
    pub fn resolve_target(&self) -> ResolvedTarget<'_> {
        match &self.shortcut_target {
            Some(target) => ResolvedTarget {
                id: &target.id,
                mime_type: &target.mime_type,
                kind: match NodeKind::from_mime_type(&target.mime_type) {
                    NodeKind::Folder => NodeKind::Folder,
                    _ => NodeKind::File,
                },
            },
            None => ResolvedTarget {
                id: &self.id,
                mime_type: &self.mime_type,
                kind: match self.kind() {
                    NodeKind::Shortcut => NodeKind::File,
                    kind => kind,
                },
            },
        }
    }
}

/// How an object's bytes are requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferMode {
    /// Raw media download.
    Media,
    /// Conversion through the export endpoint into `mime_type`.
    Export { mime_type: String },
}

/// One chunk read from a [`ChunkStream`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRead {
    pub data: Vec<u8>,
    pub is_final: bool,
}

/// Remote store operations used by the engine.
#[async_trait]
pub trait ChunkTransport: Send + Sync {
    /// Fetches the metadata snapshot of a single node.
    async fn fetch_metadata(
        &self,
        credential: &Credential,
        id: &str,
    ) -> Result<RemoteNode, TransportError>;

    /// Lists the immediate children of a folder (all pages).
    async fn list_children(
        &self,
        credential: &Credential,
        folder_id: &str,
    ) -> Result<Vec<RemoteNode>, TransportError>;

    /// Opens a chunked read session for one object, bound to `credential`.
    fn open_chunk_stream(
        &self,
        credential: &Credential,
        object_id: &str,
        mode: &TransferMode,
        chunk_size: u64,
    ) -> Box<dyn ChunkStream>;
}

/// A credential-bound, sequential chunk reader for one object.
#[async_trait]
pub trait ChunkStream: Send {
    /// Fetches the next chunk. On error the stream position is unchanged, so
    /// calling again re-requests the same chunk.
    async fn next_chunk(&mut self) -> Result<ChunkRead, TransportError>;
}
