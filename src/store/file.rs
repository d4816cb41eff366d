use super::{Store, StoreError, StoreResult};
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// One JSON file per key under a data directory.
///
/// `team:alice` lives at `<root>/team/alice.json`. Writes go to a temp file
/// and are renamed into place so readers never see a torn record.
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    /// Serializes read-compare-write sequences within this process
    cas_lock: Mutex<()>,
}

const EXT: &str = "json";

impl FileStore {
    pub async fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| StoreError::io(format!("cannot create {}", root.display()), e))?;
        tracing::info!("File store opened at {}", root.display());
        Ok(Self {
            root,
            cas_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> StoreResult<PathBuf> {
        let Some((namespace, name)) = key.split_once(':') else {
            return Err(StoreError::InvalidKey(key.to_string()));
        };
        let valid = |part: &str| {
            !part.is_empty() && part != "." && part != ".." && !part.contains(['/', '\\', ':'])
        };
        if !valid(namespace) || !valid(name) {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(namespace).join(format!("{name}.{EXT}")))
    }

    async fn read(&self, path: &Path) -> StoreResult<Option<Value>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map(Some).map_err(|e| {
                StoreError::Unavailable {
                    message: format!("corrupt record at {}", path.display()),
                    source: Some(Box::new(e)),
                }
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io(format!("read {}", path.display()), e)),
        }
    }

    async fn write(&self, path: &Path, record: &Value) -> StoreResult<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::io(format!("mkdir {}", parent.display()), e))?;
        }
        let bytes = serde_json::to_vec_pretty(record)?;
        let tmp = path.with_extension(format!("{EXT}.{}.tmp", ulid::Ulid::new()));
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| StoreError::io(format!("write {}", tmp.display()), e))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| StoreError::io(format!("rename into {}", path.display()), e))
    }
}

#[async_trait]
impl Store for FileStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        let path = self.path_for(key)?;
        self.read(&path).await
    }

    async fn put(&self, key: &str, record: Value) -> StoreResult<()> {
        let path = self.path_for(key)?;
        self.write(&path, &record).await
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::io(format!("delete {}", path.display()), e)),
        }
    }

    async fn list_keys(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut namespaces = match tokio::fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(keys),
            Err(e) => return Err(StoreError::io("list store root", e)),
        };

        while let Some(ns) = namespaces
            .next_entry()
            .await
            .map_err(|e| StoreError::io("list store root", e))?
        {
            let Some(namespace) = ns.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if !ns.path().is_dir() {
                continue;
            }
            let mut files = tokio::fs::read_dir(ns.path())
                .await
                .map_err(|e| StoreError::io(format!("list {namespace}"), e))?;
            while let Some(file) = files
                .next_entry()
                .await
                .map_err(|e| StoreError::io(format!("list {namespace}"), e))?
            {
                let file_name = file.file_name();
                let Some(name) = file_name
                    .to_str()
                    .and_then(|n| n.strip_suffix(".json"))
                else {
                    continue;
                };
                let key = format!("{namespace}:{name}");
                if key.starts_with(prefix) {
                    keys.push(key);
                }
            }
        }

        keys.sort();
        Ok(keys)
    }

    async fn compare_and_put(
        &self,
        key: &str,
        expected: &Value,
        record: Value,
    ) -> StoreResult<bool> {
        let path = self.path_for(key)?;
        let _guard = self.cas_lock.lock().await;
        match self.read(&path).await? {
            Some(current) if &current == expected => {
                self.write(&path, &record).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
