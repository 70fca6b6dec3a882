use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::{ByteStream, Error, FileInfo, FileUpload, Store};

const META_SUFFIX: &str = ".meta.json";

/// Filesystem-based blob store.
///
/// Each blob is stored at `{base_path}/{key}` with its [`FileInfo`] in a
/// sibling `{key}.meta.json`. Parent directories are created automatically.
pub struct FsStore {
  base_path: PathBuf,
}

impl FsStore {
  /// Create a new filesystem store with the given base path.
  pub fn new(base_path: impl Into<PathBuf>) -> Self {
    Self {
      base_path: base_path.into(),
    }
  }

  pub fn base_path(&self) -> &Path {
    &self.base_path
  }

  fn key_to_path(&self, key: &str) -> Result<PathBuf, Error> {
    let relative = Path::new(key);
    let valid = !key.is_empty()
      && !key.ends_with(META_SUFFIX)
      && relative
        .components()
        .all(|c| matches!(c, Component::Normal(_)));
    if !valid {
      return Err(Error::InvalidKey(key.to_string()));
    }
    Ok(self.base_path.join(relative))
  }

  fn meta_path(path: &Path) -> PathBuf {
    let mut meta = path.as_os_str().to_owned();
    meta.push(META_SUFFIX);
    PathBuf::from(meta)
  }

  async fn read_info(&self, key: &str, path: &Path) -> Result<FileInfo, Error> {
    let raw = fs::read(Self::meta_path(path)).await.map_err(|e| not_found_or_io(e, key))?;
    serde_json::from_slice(&raw).map_err(|source| Error::Metadata {
      key: key.to_string(),
      source,
    })
  }
}

fn not_found_or_io(e: std::io::Error, key: &str) -> Error {
  if e.kind() == std::io::ErrorKind::NotFound {
    Error::NotFound(key.to_string())
  } else {
    Error::Io(e)
  }
}

#[async_trait]
impl Store for FsStore {
  async fn get(&self, key: &str) -> Result<ByteStream, Error> {
    let path = self.key_to_path(key)?;
    let file = File::open(&path).await.map_err(|e| not_found_or_io(e, key))?;
    let stream = ReaderStream::new(file).map(|r| r.map_err(Error::Io));
    Ok(Box::pin(stream))
  }

  async fn head(&self, key: &str) -> Result<FileInfo, Error> {
    let path = self.key_to_path(key)?;
    self.read_info(key, &path).await
  }

  async fn put(&self, upload: FileUpload, data: ByteStream) -> Result<FileInfo, Error> {
    let path = self.key_to_path(&upload.key)?;

    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent).await?;
    }

    let mut file = OpenOptions::new()
      .write(true)
      .create_new(true)
      .open(&path)
      .await
      .map_err(|e| {
        if e.kind() == std::io::ErrorKind::AlreadyExists {
          Error::AlreadyExists(upload.key.clone())
        } else {
          Error::Io(e)
        }
      })?;

    let mut stream = std::pin::pin!(data);
    let mut size = 0u64;

    while let Some(chunk) = stream.next().await {
      let bytes = chunk?;
      size += bytes.len() as u64;
      file.write_all(&bytes).await?;
    }
    file.flush().await?;

    let info = FileInfo {
      key: upload.key,
      name: upload.name,
      content_type: upload.content_type,
      metadata: upload.metadata,
      size,
    };
    let meta = serde_json::to_vec_pretty(&info).map_err(|source| Error::Metadata {
      key: info.key.clone(),
      source,
    })?;
    fs::write(Self::meta_path(&path), meta).await?;

    debug!(key = %info.key, size = info.size, "file stored");
    Ok(info)
  }

  async fn delete(&self, key: &str) -> Result<(), Error> {
    let path = self.key_to_path(key)?;
    fs::remove_file(&path).await.map_err(|e| not_found_or_io(e, key))?;
    match fs::remove_file(Self::meta_path(&path)).await {
      Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(Error::Io(e)),
      _ => Ok(()),
    }
  }
}
