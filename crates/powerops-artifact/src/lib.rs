//! PowerOps Artifact
//!
//! This crate provides the blob storage trait and implementations for the
//! files attached to SHOP runs: case files, cut/mapping/extra inputs, logs
//! and YAML results.
//!
//! Every blob carries a small string metadata map (for example which run it
//! belongs to and what kind of file it is) alongside its content type.
//! The trait uses async streaming so large result files never need to be
//! held in memory by the store itself.

mod fs;

pub use fs::FsStore;

use std::collections::BTreeMap;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

/// A boxed stream of bytes for blob data.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, Error>> + Send>>;

/// Error type for blob storage operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
  /// The requested blob was not found.
  #[error("file not found: {0}")]
  NotFound(String),

  /// A blob with this key already exists.
  #[error("file already exists: {0}")]
  AlreadyExists(String),

  /// The key cannot be mapped to a storage location.
  #[error("invalid file key: {0}")]
  InvalidKey(String),

  /// The sidecar metadata could not be read or written.
  #[error("invalid file metadata for {key}: {source}")]
  Metadata {
    key: String,
    #[source]
    source: serde_json::Error,
  },

  /// An I/O error occurred.
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

/// Description of a blob to be stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileUpload {
  /// Storage key; the platform's external id for the file.
  pub key: String,
  /// Human readable file name, e.g. `shop_messages.log`.
  pub name: String,
  pub content_type: String,
  #[serde(default)]
  pub metadata: BTreeMap<String, String>,
}

impl FileUpload {
  pub fn new(key: impl Into<String>, name: impl Into<String>, content_type: impl Into<String>) -> Self {
    Self {
      key: key.into(),
      name: name.into(),
      content_type: content_type.into(),
      metadata: BTreeMap::new(),
    }
  }

  pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.metadata.insert(key.into(), value.into());
    self
  }
}

/// A stored blob's description, as returned by [`Store::head`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
  pub key: String,
  pub name: String,
  pub content_type: String,
  pub metadata: BTreeMap<String, String>,
  pub size: u64,
}

/// Blob storage trait.
///
/// Implementations provide the actual storage backend (filesystem, the
/// platform's file API, etc.).
#[async_trait]
pub trait Store: Send + Sync {
  /// Retrieve a blob's content by key.
  async fn get(&self, key: &str) -> Result<ByteStream, Error>;

  /// Retrieve a blob's description without its content.
  async fn head(&self, key: &str) -> Result<FileInfo, Error>;

  /// Store a blob. Fails with [`Error::AlreadyExists`] if the key is taken.
  async fn put(&self, upload: FileUpload, data: ByteStream) -> Result<FileInfo, Error>;

  /// Delete a blob by key.
  async fn delete(&self, key: &str) -> Result<(), Error>;
}

/// Wrap in-memory content as a single-chunk [`ByteStream`].
pub fn stream_from_bytes(data: impl Into<Bytes>) -> ByteStream {
  let data = data.into();
  Box::pin(futures::stream::once(async move { Ok(data) }))
}

/// Drain a [`ByteStream`] into a contiguous buffer.
pub async fn read_to_bytes(mut stream: ByteStream) -> Result<Bytes, Error> {
  let mut buffer = BytesMut::new();
  while let Some(chunk) = stream.next().await {
    buffer.extend_from_slice(&chunk?);
  }
  Ok(buffer.freeze())
}
