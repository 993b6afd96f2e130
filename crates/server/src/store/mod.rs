// Blob storage for chunk and assembled-file bytes.
//
// Keys are slash-separated relative paths (`chunks/<upload>/<index>`,
// `assembled/<upload>-<name>`). The filesystem backend maps keys onto a
// root directory; the memory backend serves tests. All operations are
// idempotent where the caller needs them to be: deleting a missing key
// succeeds, `append` creates the key on first write.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use uuid::Uuid;

pub fn chunk_key(upload_id: Uuid, index: u64) -> String {
    format!("chunks/{upload_id}/{index}")
}

pub fn chunk_prefix(upload_id: Uuid) -> String {
    format!("chunks/{upload_id}/")
}

pub fn assembled_key(upload_id: Uuid, file_name: &str) -> String {
    format!("assembled/{upload_id}-{file_name}")
}

/// Strip path separators and leading dots so client-supplied file names
/// can never escape the blob root.
pub fn sanitize_file_name(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| if c == '/' || c == '\\' || c.is_control() { '_' } else { c })
        .collect();
    let trimmed = cleaned.trim_start_matches('.').to_string();
    if trimmed.is_empty() {
        "unnamed".to_string()
    } else {
        trimmed
    }
}

pub enum BlobStore {
    Fs(FsBlobStore),
    Memory(MemoryBlobStore),
}

impl BlobStore {
    pub async fn put(&self, key: &str, bytes: &[u8]) -> io::Result<()> {
        match self {
            Self::Fs(fs) => fs.put(key, bytes).await,
            Self::Memory(mem) => mem.put(key, bytes).await,
        }
    }

    /// Append to the blob at `key`, creating it if absent.
    pub async fn append(&self, key: &str, bytes: &[u8]) -> io::Result<()> {
        match self {
            Self::Fs(fs) => fs.append(key, bytes).await,
            Self::Memory(mem) => mem.append(key, bytes).await,
        }
    }

    pub async fn get(&self, key: &str) -> io::Result<Option<Vec<u8>>> {
        match self {
            Self::Fs(fs) => fs.get(key).await,
            Self::Memory(mem) => Ok(mem.get(key).await),
        }
    }

    pub async fn byte_len(&self, key: &str) -> io::Result<Option<u64>> {
        match self {
            Self::Fs(fs) => fs.byte_len(key).await,
            Self::Memory(mem) => Ok(mem.byte_len(key).await),
        }
    }

    /// Delete a single blob. Succeeds when the key does not exist.
    pub async fn delete(&self, key: &str) -> io::Result<()> {
        match self {
            Self::Fs(fs) => fs.delete(key).await,
            Self::Memory(mem) => {
                mem.delete(key).await;
                Ok(())
            }
        }
    }

    /// Delete every blob under `prefix`. Succeeds when nothing matches.
    pub async fn delete_prefix(&self, prefix: &str) -> io::Result<()> {
        match self {
            Self::Fs(fs) => fs.delete_prefix(prefix).await,
            Self::Memory(mem) => {
                mem.delete_prefix(prefix).await;
                Ok(())
            }
        }
    }

    /// Stable locator for a stored blob, suitable for handing to external
    /// collaborators (the media pipeline) and for session snapshots.
    pub fn locator(&self, key: &str) -> String {
        match self {
            Self::Fs(fs) => fs.path_for(key).display().to_string(),
            Self::Memory(_) => format!("mem://{key}"),
        }
    }
}

pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Open a filesystem store rooted at `root`, creating the directory
    /// if needed.
    pub fn open(root: impl AsRef<Path>) -> io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        // Keys are produced by this crate from uuids and sanitized names;
        // reject any residual traversal segment outright.
        let mut path = self.root.clone();
        for segment in key.split('/').filter(|s| !s.is_empty() && *s != "." && *s != "..") {
            path.push(segment);
        }
        path
    }

    async fn put(&self, key: &str, bytes: &[u8]) -> io::Result<()> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, bytes).await
    }

    async fn append(&self, key: &str, bytes: &[u8]) -> io::Result<()> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        file.write_all(bytes).await?;
        file.flush().await
    }

    async fn get(&self, key: &str) -> io::Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn byte_len(&self, key: &str) -> io::Result<Option<u64>> {
        match tokio::fs::metadata(self.path_for(key)).await {
            Ok(meta) => Ok(Some(meta.len())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn delete(&self, key: &str) -> io::Result<()> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn delete_prefix(&self, prefix: &str) -> io::Result<()> {
        let dir = self.path_for(prefix.trim_end_matches('/'));
        match tokio::fs::remove_dir_all(dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> io::Result<()> {
        self.blobs.write().await.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn append(&self, key: &str, bytes: &[u8]) -> io::Result<()> {
        self.blobs
            .write()
            .await
            .entry(key.to_string())
            .or_default()
            .extend_from_slice(bytes);
        Ok(())
    }

    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.blobs.read().await.get(key).cloned()
    }

    async fn byte_len(&self, key: &str) -> Option<u64> {
        self.blobs.read().await.get(key).map(|b| b.len() as u64)
    }

    async fn delete(&self, key: &str) {
        self.blobs.write().await.remove(key);
    }

    async fn delete_prefix(&self, prefix: &str) {
        self.blobs.write().await.retain(|key, _| !key.starts_with(prefix));
    }
}
