// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

/// Directory under the storage root that receives dropped trees.
pub const TRASH_DIR: &str = ".trash";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Corrupt data in {path}: {reason}")]
    Corrupt { path: String, reason: String },

    #[error("Incompatible version: found {found}, expected <= {expected}")]
    IncompatibleVersion { found: u32, expected: u32 },

    #[error("Injected failure: {0}")]
    Injected(String),
}

/// Durable byte storage addressed by `/`-separated relative paths.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn read(&self, path: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Replace `path` so readers observe either the old or the new contents,
    /// never a partial write.
    async fn write_atomic(&self, path: &str, data: Vec<u8>) -> Result<(), StorageError>;

    /// Durably append to `path`, creating it if needed. Returns the new length.
    async fn append(&self, path: &str, data: &[u8]) -> Result<u64, StorageError>;

    async fn truncate(&self, path: &str, len: u64) -> Result<(), StorageError>;

    async fn exists(&self, path: &str) -> Result<bool, StorageError>;

    /// Names of the immediate subdirectories of `prefix`, sorted.
    async fn list_dirs(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

    /// Remove the tree at `path` in one atomic step. Missing paths are a no-op.
    async fn remove_dir(&self, path: &str) -> Result<(), StorageError>;
}

/// Local file system storage rooted at a data directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    /// Open (creating if needed) the storage root and purge directories
    /// left in the trash by an interrupted drop.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        let storage = Self { root };
        storage.purge_trash().await;
        Ok(storage)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> PathBuf {
        path.split('/')
            .filter(|segment| !segment.is_empty())
            .fold(self.root.clone(), |acc, segment| acc.join(segment))
    }

    async fn purge_trash(&self) {
        let trash = self.root.join(TRASH_DIR);
        match fs::remove_dir_all(&trash).await {
            Ok(()) => debug!(path = %trash.display(), "purged trash directory"),
            Err(e) if e.kind() == IoErrorKind::NotFound => {}
            Err(e) => warn!(path = %trash.display(), error = %e, "failed to purge trash directory"),
        }
    }

    async fn ensure_dir(&self, dir: &Path) -> Result<(), StorageError> {
        if fs::try_exists(dir).await? {
            return Ok(());
        }
        fs::create_dir_all(dir).await?;
        if let Some(parent) = dir.parent() {
            sync_dir(parent).await?;
        }
        Ok(())
    }

    fn parent_of(&self, target: &Path) -> PathBuf {
        target
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone())
    }
}

async fn sync_dir(dir: &Path) -> Result<(), StorageError> {
    // Directory handles cannot be opened for sync on every platform.
    #[cfg(unix)]
    fs::File::open(dir).await?.sync_all().await?;
    #[cfg(not(unix))]
    let _ = dir;
    Ok(())
}

#[async_trait]
impl Storage for FileStorage {
    async fn read(&self, path: &str) -> Result<Option<Vec<u8>>, StorageError> {
        match fs::read(self.resolve(path)).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_atomic(&self, path: &str, data: Vec<u8>) -> Result<(), StorageError> {
        let target = self.resolve(path);
        let parent = self.parent_of(&target);
        self.ensure_dir(&parent).await?;

        let file_name = target
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("data");
        let tmp = parent.join(format!(".{}.tmp", file_name));

        let mut file = fs::File::create(&tmp).await?;
        file.write_all(&data).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&tmp, &target).await?;
        sync_dir(&parent).await
    }

    async fn append(&self, path: &str, data: &[u8]) -> Result<u64, StorageError> {
        let target = self.resolve(path);
        let parent = self.parent_of(&target);
        self.ensure_dir(&parent).await?;

        let existed = fs::try_exists(&target).await?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&target)
            .await?;
        file.write_all(data).await?;
        file.sync_data().await?;
        let len = file.metadata().await?.len();

        if !existed {
            sync_dir(&parent).await?;
        }
        Ok(len)
    }

    async fn truncate(&self, path: &str, len: u64) -> Result<(), StorageError> {
        let file = fs::OpenOptions::new()
            .write(true)
            .open(self.resolve(path))
            .await?;
        file.set_len(len).await?;
        file.sync_all().await?;
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool, StorageError> {
        Ok(fs::try_exists(self.resolve(path)).await?)
    }

    async fn list_dirs(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let mut entries = match fs::read_dir(self.resolve(prefix)).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    async fn remove_dir(&self, path: &str) -> Result<(), StorageError> {
        let source = self.resolve(path);
        if !fs::try_exists(&source).await? {
            return Ok(());
        }

        let trash = self.root.join(TRASH_DIR);
        fs::create_dir_all(&trash).await?;
        let base = source
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("dir");
        let dest = trash.join(format!("{}-{}", base, Uuid::new_v4()));

        // The rename is the commit point; everything after is cleanup.
        fs::rename(&source, &dest).await?;
        sync_dir(&self.parent_of(&source)).await?;

        if let Err(e) = fs::remove_dir_all(&dest).await {
            warn!(
                path = %dest.display(),
                error = %e,
                "failed to delete dropped directory, it will be purged on next open"
            );
        }
        Ok(())
    }
}

/// In-memory storage for tests, with write-failure injection.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    files: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every mutating call fails with `StorageError::Injected`.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub async fn file_len(&self, path: &str) -> Option<usize> {
        self.files.read().await.get(normalize(path)).map(Vec::len)
    }

    fn check_writable(&self) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Injected("writes disabled".to_string()));
        }
        Ok(())
    }
}

fn normalize(path: &str) -> &str {
    path.trim_matches('/')
}

fn dir_prefix(path: &str) -> String {
    let path = normalize(path);
    if path.is_empty() {
        String::new()
    } else {
        format!("{}/", path)
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn read(&self, path: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.files.read().await.get(normalize(path)).cloned())
    }

    async fn write_atomic(&self, path: &str, data: Vec<u8>) -> Result<(), StorageError> {
        self.check_writable()?;
        self.files
            .write()
            .await
            .insert(normalize(path).to_string(), data);
        Ok(())
    }

    async fn append(&self, path: &str, data: &[u8]) -> Result<u64, StorageError> {
        self.check_writable()?;
        let mut files = self.files.write().await;
        let file = files.entry(normalize(path).to_string()).or_default();
        file.extend_from_slice(data);
        Ok(file.len() as u64)
    }

    async fn truncate(&self, path: &str, len: u64) -> Result<(), StorageError> {
        self.check_writable()?;
        let mut files = self.files.write().await;
        match files.get_mut(normalize(path)) {
            Some(file) => {
                file.truncate(len as usize);
                Ok(())
            }
            None => Err(StorageError::Io(std::io::Error::new(
                IoErrorKind::NotFound,
                format!("{} does not exist", path),
            ))),
        }
    }

    async fn exists(&self, path: &str) -> Result<bool, StorageError> {
        let files = self.files.read().await;
        let prefix = dir_prefix(path);
        Ok(files.contains_key(normalize(path)) || files.keys().any(|k| k.starts_with(&prefix)))
    }

    async fn list_dirs(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let prefix = dir_prefix(prefix);
        let files = self.files.read().await;
        let dirs: BTreeSet<String> = files
            .keys()
            .filter_map(|key| key.strip_prefix(&prefix))
            .filter_map(|rest| rest.split_once('/').map(|(dir, _)| dir.to_string()))
            .collect();
        Ok(dirs.into_iter().collect())
    }

    async fn remove_dir(&self, path: &str) -> Result<(), StorageError> {
        self.check_writable()?;
        let prefix = dir_prefix(path);
        self.files
            .write()
            .await
            .retain(|key, _| !key.starts_with(&prefix));
        Ok(())
    }
}
