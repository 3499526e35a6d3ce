//! Slideshow image store. Files are kept flat in the upload folder, with a
//! `hashes.json` index (SHA-256 hex -> file name) used to refuse duplicates.

use ring::digest::{digest, SHA256};
use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub const HASH_FILE: &str = "hashes.json";
const HASH_FILE_TMP: &str = "hashes.json.tmp";
const IMAGE_EXTENSIONS: &[&str] = &[".png", ".jpg", ".jpeg", ".gif"];

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("invalid file name '{0}'")]
    InvalidName(String),
    #[error("upload folder error: {0}")]
    Io(#[from] io::Error),
    #[error("hash index is corrupt: {0}")]
    Index(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOutcome {
    Stored(String),
    /// Same content already stored under the given name.
    Duplicate(String),
}

/// Serializes index updates across all stores of one process.
pub type IndexLock = Arc<Mutex<()>>;

pub struct UploadStore {
    dir: PathBuf,
    lock: IndexLock,
}

pub fn content_hash(bytes: &[u8]) -> String {
    digest(&SHA256, bytes)
        .as_ref()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Keeps only the last path component; rejects names that would escape the
/// folder or clash with the index.
pub fn sanitize_file_name(raw: &str) -> Option<String> {
    let name = raw.rsplit(['/', '\\']).next()?.trim();
    if name.is_empty() || name == "." || name == ".." || name == HASH_FILE || name == HASH_FILE_TMP {
        return None;
    }
    Some(name.to_string())
}

pub fn is_image(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    IMAGE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

impl UploadStore {
    pub fn new(dir: impl Into<PathBuf>, lock: IndexLock) -> Self {
        Self {
            dir: dir.into(),
            lock,
        }
    }

    async fn load_index(&self) -> Result<BTreeMap<String, String>, UploadError> {
        match fs::read(self.dir.join(HASH_FILE)).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(err) => Err(err.into()),
        }
    }

    async fn save_index(&self, index: &BTreeMap<String, String>) -> Result<(), UploadError> {
        let bytes = serde_json::to_vec_pretty(index)?;
        let tmp = self.dir.join(HASH_FILE_TMP);
        fs::write(&tmp, bytes).await?;
        fs::rename(&tmp, self.dir.join(HASH_FILE)).await?;
        Ok(())
    }

    pub async fn store(&self, raw_name: &str, bytes: &[u8]) -> Result<StoreOutcome, UploadError> {
        let name =
            sanitize_file_name(raw_name).ok_or_else(|| UploadError::InvalidName(raw_name.to_string()))?;
        fs::create_dir_all(&self.dir).await?;

        let hash = content_hash(bytes);
        let _guard = self.lock.lock().await;
        let mut index = self.load_index().await?;
        if let Some(existing) = index.get(&hash) {
            if fs::try_exists(self.dir.join(existing)).await.unwrap_or(false) {
                debug!(file = %name, existing = %existing, "duplicate upload");
                return Ok(StoreOutcome::Duplicate(existing.clone()));
            }
            warn!(file = %existing, "indexed file missing on disk, storing again");
        }

        fs::write(self.dir.join(&name), bytes).await?;
        index.insert(hash, name.clone());
        self.save_index(&index).await?;
        Ok(StoreOutcome::Stored(name))
    }

    /// Image file names, sorted.
    pub async fn list_images(&self) -> Result<Vec<String>, UploadError> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut images = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if is_image(name) {
                    images.push(name.to_string());
                }
            }
        }
        images.sort();
        Ok(images)
    }

    /// Resolves a stored file; `None` for unknown or unsafe names.
    pub async fn path_of(&self, name: &str) -> Option<PathBuf> {
        let clean = sanitize_file_name(name)?;
        if clean != name {
            return None;
        }
        let path = self.dir.join(clean);
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Some(path),
            _ => None,
        }
    }
}
