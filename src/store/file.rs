/*!
 * File Store Backend
 * One JSON file per store, rewritten atomically after every mutation
 */

use super::memory::Table;
use super::traits::DocumentStore;
use super::types::*;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

#[derive(Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    #[serde(default)]
    documents: BTreeMap<String, Value>,
}

/// Durable store persisted as `<dir>/<name>.json`
#[derive(Debug)]
pub struct FileStore {
    config: StoreConfig,
    path: PathBuf,
    table: Mutex<Table>,
}

impl FileStore {
    /// Open (or create) the store file under `dir`
    pub async fn open(dir: impl AsRef<Path>, config: StoreConfig) -> StoreResult<Self> {
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(format!("{}.json", config.name));

        let table = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let file: StoreFile = serde_json::from_slice(&bytes)?;
                if file.version < config.version {
                    info!(
                        store = %config.name,
                        from = file.version,
                        to = config.version,
                        "Upgrading store layout"
                    );
                }
                Table {
                    docs: file.documents,
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Table::default(),
            Err(e) => return Err(e.into()),
        };

        debug!(store = %config.name, documents = table.docs.len(), "Store opened");
        Ok(Self {
            config,
            path,
            table: Mutex::new(table),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, table: &Table) -> StoreResult<()> {
        let file = StoreFile {
            version: self.config.version,
            documents: table.docs.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&file)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// Apply a mutation to a scratch copy and commit it only after the write lands
    async fn mutate<T>(
        &self,
        op: impl FnOnce(&mut Table) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut table = self.table.lock().await;
        let mut next = table.clone();
        let out = op(&mut next)?;
        self.persist(&next).await?;
        *table = next;
        Ok(out)
    }
}

#[async_trait]
impl DocumentStore for FileStore {
    fn config(&self) -> &StoreConfig {
        &self.config
    }

    async fn put(&self, doc: Value) -> StoreResult<()> {
        let config = &self.config;
        self.mutate(|table| table.put(config, doc)).await
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        Ok(self.table.lock().await.docs.get(key).cloned())
    }

    async fn get_all(&self) -> StoreResult<Vec<Value>> {
        Ok(self.table.lock().await.docs.values().cloned().collect())
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        if !self.table.lock().await.docs.contains_key(key) {
            return Ok(false);
        }
        self.mutate(|table| Ok(table.docs.remove(key).is_some())).await
    }

    async fn get_by_index(&self, index: &str, value: &Value) -> StoreResult<Vec<Value>> {
        self.table.lock().await.by_index(&self.config, index, value)
    }
}
