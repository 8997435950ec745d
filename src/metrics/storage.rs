//! Storage port for whole-document persistence
//!
//! Both the usage metrics and the optimization ledger are read entire and
//! written entire. There is no locking: two processes writing the same
//! document race and the last write wins.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{EvolutionError, Result};

/// Name of the usage metrics document
pub const METRICS_DOCUMENT: &str = "usage-metrics.json";
/// Name of the optimization ledger document
pub const OPTIMIZATION_DOCUMENT: &str = "optimization-data.json";

/// Reads named documents as raw bytes and writes them as whole strings.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentStorage: Send + Sync {
    /// Returns `None` when the document has never been written.
    async fn read(&self, name: &str) -> Result<Option<Vec<u8>>>;

    async fn write(&self, name: &str, contents: &str) -> Result<()>;
}

/// JSON files inside a cache directory
#[derive(Debug, Clone)]
pub struct JsonFileStorage {
    cache_dir: PathBuf,
}

impl JsonFileStorage {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.cache_dir.join(name)
    }
}

#[async_trait]
impl DocumentStorage for JsonFileStorage {
    async fn read(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(name);
        match tokio::fs::read(&path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(EvolutionError::persistence(name, e)),
        }
    }

    async fn write(&self, name: &str, contents: &str) -> Result<()> {
        tokio::fs::create_dir_all(&self.cache_dir)
            .await
            .map_err(|e| EvolutionError::persistence(name, e))?;
        let path = self.path_for(name);
        tokio::fs::write(&path, contents)
            .await
            .map_err(|e| EvolutionError::persistence(name, e))?;
        debug!("Wrote {:?}", path);
        Ok(())
    }
}

/// Load a document, substituting `default` when it is absent or unparseable.
/// Bytes that are not UTF-8 count as unparseable.
pub async fn load_or_default<T, F>(storage: &dyn DocumentStorage, name: &str, default: F) -> Result<T>
where
    T: DeserializeOwned,
    F: FnOnce() -> T,
{
    match storage.read(name).await? {
        None => Ok(default()),
        Some(contents) => match serde_json::from_slice(&contents) {
            Ok(document) => Ok(document),
            Err(e) => {
                warn!("Discarding unreadable {}: {}", name, e);
                Ok(default())
            }
        },
    }
}

/// Serialize and write a whole document.
pub async fn save_document<T: Serialize>(storage: &dyn DocumentStorage, name: &str, document: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(document).map_err(|e| {
        EvolutionError::persistence(name, std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    })?;
    storage.write(name, &json).await
}

/// In-memory documents, for tests and embedding
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    documents: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed or overwrite a raw document
    pub async fn insert(&self, name: &str, contents: &str) {
        self.documents
            .write()
            .await
            .insert(name.to_string(), contents.to_string());
    }

    pub async fn get(&self, name: &str) -> Option<String> {
        self.documents.read().await.get(name).cloned()
    }
}

#[async_trait]
impl DocumentStorage for MemoryStorage {
    async fn read(&self, name: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.get(name).await.map(String::into_bytes))
    }

    async fn write(&self, name: &str, contents: &str) -> Result<()> {
        self.insert(name, contents).await;
        Ok(())
    }
}
