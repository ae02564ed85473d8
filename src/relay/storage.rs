//! Durable key/value storage scoped to a relay endpoint.

use crate::error::{Error, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

#[async_trait]
pub trait KeyValueStorage: Send + Sync {
    async fn get_item(&self, key: &str) -> Result<Option<Value>>;
    async fn set_item(&self, key: &str, value: Value) -> Result<()>;
    async fn remove_item(&self, key: &str) -> Result<()>;
    async fn keys(&self) -> Result<Vec<String>>;
}

/// Process-local storage. Tests substitute this for the durable store.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: RwLock<BTreeMap<String, Value>>,
}

impl MemoryStorage {
    pub fn new() -> Self { Self::default() }
}

#[async_trait]
impl KeyValueStorage for MemoryStorage {
    async fn get_item(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.items.read().await.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: Value) -> Result<()> {
        self.items.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        self.items.write().await.remove(key);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self.items.read().await.keys().cloned().collect())
    }
}

#[cfg(feature = "native")]
pub use file::FileStorage;

#[cfg(feature = "native")]
mod file {
    use super::*;
    use std::path::{Path, PathBuf};

    /// JSON file under `$CARDANO_WC_ROOT/{app}/data/storage.json`
    /// (falls back to the platform data dir). Loaded once, written through.
    #[derive(Debug)]
    pub struct FileStorage {
        path: PathBuf,
        items: RwLock<BTreeMap<String, Value>>,
    }

    impl FileStorage {
        pub fn open(app: &str) -> Result<Self> {
            Self::open_at(storage_path(app))
        }

        pub fn open_at(path: impl Into<PathBuf>) -> Result<Self> {
            let path = path.into();
            let items = if path.exists() {
                let raw = std::fs::read_to_string(&path)
                    .map_err(|e| Error::Storage(format!("read {}: {e}", path.display())))?;
                serde_json::from_str(&raw).map_err(|e| Error::Storage(format!("storage json: {e}")))?
            } else {
                BTreeMap::new()
            };
            Ok(Self { path, items: RwLock::new(items) })
        }

        pub fn path(&self) -> &Path { &self.path }

        async fn flush(&self, items: &BTreeMap<String, Value>) -> Result<()> {
            if let Some(parent) = self.path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| Error::Storage(format!("storage mkdir: {e}")))?;
            }
            let raw = serde_json::to_string_pretty(items)?;
            tokio::fs::write(&self.path, raw)
                .await
                .map_err(|e| Error::Storage(format!("storage write: {e}")))
        }
    }

    #[async_trait]
    impl KeyValueStorage for FileStorage {
        async fn get_item(&self, key: &str) -> Result<Option<Value>> {
            Ok(self.items.read().await.get(key).cloned())
        }

        async fn set_item(&self, key: &str, value: Value) -> Result<()> {
            let mut items = self.items.write().await;
            items.insert(key.to_string(), value);
            self.flush(&items).await
        }

        async fn remove_item(&self, key: &str) -> Result<()> {
            let mut items = self.items.write().await;
            if items.remove(key).is_some() {
                self.flush(&items).await?;
            }
            Ok(())
        }

        async fn keys(&self) -> Result<Vec<String>> {
            Ok(self.items.read().await.keys().cloned().collect())
        }
    }

    fn storage_path(app: &str) -> PathBuf {
        let root = std::env::var("CARDANO_WC_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| dirs::data_local_dir().unwrap_or_else(|| PathBuf::from(".")).join("cardano-wc"));
        root.join(app).join("data").join("storage.json")
    }
}
