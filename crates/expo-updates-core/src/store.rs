use std::collections::{BTreeMap, BTreeSet};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use tokio::io::AsyncRead;
use tokio::sync::RwLock;

use crate::error::StoreError;

pub type FileReader = Pin<Box<dyn AsyncRead + Send + Unpin>>;

/// Read-only view over the published update bundles.
///
/// Layout: `<root>/<runtimeVersion>/<createdAt>/{metadata.json, expoConfig.json, rollback?, ...}`.
#[async_trait]
pub trait BundleStore: Send + Sync {
    /// Names of the immediate subdirectories of a runtime version directory.
    /// Returns [`StoreError::NotFound`] when the runtime version is unknown.
    async fn list_bundle_versions(&self, runtime_version: &str) -> Result<Vec<String>, StoreError>;

    fn bundle_path(&self, runtime_version: &str, name: &str) -> PathBuf;

    async fn read_file(&self, path: &Path) -> Result<Vec<u8>, StoreError>;

    async fn open_file(&self, path: &Path) -> Result<FileReader, StoreError>;

    /// Creation time, or modification time where the filesystem does not
    /// record creation.
    async fn created_at(&self, path: &Path) -> Result<SystemTime, StoreError>;

    async fn exists(&self, path: &Path) -> bool {
        self.created_at(path).await.is_ok()
    }
}

/// Bundle store backed by a directory tree on disk.
#[derive(Debug, Clone)]
pub struct FsBundleStore {
    root: PathBuf,
}

impl FsBundleStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl BundleStore for FsBundleStore {
    async fn list_bundle_versions(&self, runtime_version: &str) -> Result<Vec<String>, StoreError> {
        let dir = self.root.join(runtime_version);
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|err| StoreError::from_io(&dir, err))?;

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|err| StoreError::from_io(&dir, err))?
        {
            let is_dir = entry
                .file_type()
                .await
                .map(|kind| kind.is_dir())
                .unwrap_or(false);
            if !is_dir {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }

    fn bundle_path(&self, runtime_version: &str, name: &str) -> PathBuf {
        self.root.join(runtime_version).join(name)
    }

    async fn read_file(&self, path: &Path) -> Result<Vec<u8>, StoreError> {
        tokio::fs::read(path)
            .await
            .map_err(|err| StoreError::from_io(path, err))
    }

    async fn open_file(&self, path: &Path) -> Result<FileReader, StoreError> {
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|err| StoreError::from_io(path, err))?;
        Ok(Box::pin(file))
    }

    async fn created_at(&self, path: &Path) -> Result<SystemTime, StoreError> {
        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|err| StoreError::from_io(path, err))?;
        meta.created()
            .or_else(|_| meta.modified())
            .map_err(|err| StoreError::from_io(path, err))
    }

    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }
}

#[derive(Debug, Clone)]
struct MemoryFile {
    bytes: Arc<Vec<u8>>,
    created_at: SystemTime,
}

#[derive(Debug, Default)]
struct MemoryTree {
    dirs: BTreeSet<PathBuf>,
    files: BTreeMap<PathBuf, MemoryFile>,
}

/// In-memory adapter for tests and fixtures.
#[derive(Debug)]
pub struct InMemoryBundleStore {
    root: PathBuf,
    tree: RwLock<MemoryTree>,
}

impl InMemoryBundleStore {
    pub fn new(root: impl Into<PathBuf>) -> Arc<Self> {
        Arc::new(Self {
            root: root.into(),
            tree: RwLock::new(MemoryTree::default()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates a directory (and its ancestors) without any files in it.
    pub async fn insert_dir(&self, path: impl AsRef<Path>) {
        let mut tree = self.tree.write().await;
        for ancestor in path.as_ref().ancestors() {
            if ancestor.as_os_str().is_empty() {
                break;
            }
            tree.dirs.insert(ancestor.to_path_buf());
        }
    }

    pub async fn insert_file(&self, path: impl AsRef<Path>, bytes: impl Into<Vec<u8>>) {
        self.insert_file_at(path, bytes, SystemTime::now()).await;
    }

    pub async fn insert_file_at(
        &self,
        path: impl AsRef<Path>,
        bytes: impl Into<Vec<u8>>,
        created_at: SystemTime,
    ) {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            self.insert_dir(parent).await;
        }
        self.tree.write().await.files.insert(
            path.to_path_buf(),
            MemoryFile {
                bytes: Arc::new(bytes.into()),
                created_at,
            },
        );
    }

    async fn file(&self, path: &Path) -> Result<MemoryFile, StoreError> {
        self.tree
            .read()
            .await
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(path.to_path_buf()))
    }
}

#[async_trait]
impl BundleStore for InMemoryBundleStore {
    async fn list_bundle_versions(&self, runtime_version: &str) -> Result<Vec<String>, StoreError> {
        let dir = self.root.join(runtime_version);
        let tree = self.tree.read().await;
        if !tree.dirs.contains(&dir) {
            return Err(StoreError::NotFound(dir));
        }
        Ok(tree
            .dirs
            .iter()
            .filter(|candidate| candidate.parent() == Some(dir.as_path()))
            .filter_map(|candidate| candidate.file_name()?.to_str().map(str::to_string))
            .collect())
    }

    fn bundle_path(&self, runtime_version: &str, name: &str) -> PathBuf {
        self.root.join(runtime_version).join(name)
    }

    async fn read_file(&self, path: &Path) -> Result<Vec<u8>, StoreError> {
        Ok(self.file(path).await?.bytes.as_ref().clone())
    }

    async fn open_file(&self, path: &Path) -> Result<FileReader, StoreError> {
        let file = self.file(path).await?;
        Ok(Box::pin(Cursor::new(file.bytes.as_ref().clone())))
    }

    async fn created_at(&self, path: &Path) -> Result<SystemTime, StoreError> {
        Ok(self.file(path).await?.created_at)
    }
}
