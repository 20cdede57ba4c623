//! Durable key-value storage the poster store is persisted in.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::error::{PosterError, Result};

/// Whole-value reads and writes under string keys. No transactions: a write
/// replaces whatever was stored, last writer wins.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    async fn set(&self, key: &str, value: Value) -> Result<()>;
}

/// Process-local store, for tests and hosts without durable storage.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    values: RwLock<HashMap<String, Value>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.values.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.values.write().insert(key.to_string(), value);
        Ok(())
    }
}

/// One JSON file per key under `root`, replaced atomically (tmp + rename).
#[derive(Clone, Debug)]
pub struct FileKvStore {
    root: PathBuf,
}

impl FileKvStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn is_valid_key(key: &str) -> bool {
        !key.is_empty()
            && key
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_'))
    }

    pub fn path_for_key(&self, key: &str) -> Result<PathBuf> {
        if !Self::is_valid_key(key) {
            return Err(PosterError::Storage(format!("invalid storage key: {key:?}")));
        }
        Ok(self.root.join(format!("{key}.json")))
    }

    async fn ensure_root(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.root).await.map_err(|err| {
            PosterError::Storage(format!(
                "failed to create storage dir {:?}: {err}",
                self.root
            ))
        })
    }
}

#[async_trait]
impl KeyValueStore for FileKvStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let path = self.path_for_key(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(PosterError::Storage(format!(
                "failed to read {:?}: {err}",
                path
            ))),
        }
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.ensure_root().await?;
        let path = self.path_for_key(key)?;
        let bytes = serde_json::to_vec(&value)?;

        let tmp = self
            .root
            .join(format!("{key}.tmp-{}", Uuid::new_v4().simple()));

        let moved = match write_temp(&tmp, &bytes).await {
            Ok(()) => tokio::fs::rename(&tmp, &path).await.map_err(|err| {
                PosterError::Storage(format!(
                    "failed to move {:?} -> {:?}: {err}",
                    tmp, path
                ))
            }),
            Err(err) => Err(err),
        };
        if moved.is_err() {
            let _ = tokio::fs::remove_file(&tmp).await;
        }
        moved
    }
}

async fn write_temp(tmp: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = tokio::fs::File::create(tmp).await.map_err(|err| {
        PosterError::Storage(format!("failed to create temp file {:?}: {err}", tmp))
    })?;
    file.write_all(bytes).await.map_err(|err| {
        PosterError::Storage(format!("failed to write temp file {:?}: {err}", tmp))
    })?;
    file.flush().await.map_err(|err| {
        PosterError::Storage(format!("failed to flush temp file {:?}: {err}", tmp))
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn file_store_round_trips_and_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileKvStore::new(dir.path().join("store"));

        assert_eq!(store.get("customPosters").await.unwrap(), None);

        store.set("customPosters", json!({"alice": {}})).await.unwrap();
        store
            .set("customPosters", json!({"alice": {"dune-2021": "https://img/x.jpg"}}))
            .await
            .unwrap();

        assert_eq!(
            store.get("customPosters").await.unwrap(),
            Some(json!({"alice": {"dune-2021": "https://img/x.jpg"}}))
        );
        assert_eq!(temp_files(store.root()), 0);
    }

    fn temp_files(root: &Path) -> usize {
        std::fs::read_dir(root)
            .unwrap()
            .filter(|entry| {
                entry
                    .as_ref()
                    .map(|e| e.file_name().to_string_lossy().contains(".tmp-"))
                    .unwrap_or(false)
            })
            .count()
    }

    #[tokio::test]
    async fn failed_rename_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileKvStore::new(dir.path().to_path_buf());
        // A directory where the value file should go makes the rename fail.
        std::fs::create_dir(dir.path().join("customPosters.json")).unwrap();

        let result = store.set("customPosters", json!({"alice": {}})).await;
        assert!(matches!(result, Err(PosterError::Storage(_))));
        assert_eq!(temp_files(store.root()), 0);
    }

    #[tokio::test]
    async fn file_store_rejects_path_like_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileKvStore::new(dir.path().to_path_buf());
        assert!(store.set("../escape", json!(1)).await.is_err());
    }
}
