/*!
 * In-Memory Store Backend
 * Volatile document table, also the working set of the file backend
 */

use super::traits::DocumentStore;
use super::types::*;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeMap;

/// Document table with index enforcement
#[derive(Debug, Clone, Default)]
pub(crate) struct Table {
    pub(crate) docs: BTreeMap<String, Value>,
}

impl Table {
    pub(crate) fn key_of(config: &StoreConfig, doc: &Value) -> StoreResult<String> {
        doc.get(&config.key_path)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| StoreError::MissingKey(config.key_path.clone()))
    }

    /// Validate unique indexes and insert; the table is untouched on error
    pub(crate) fn put(&mut self, config: &StoreConfig, doc: Value) -> StoreResult<()> {
        let key = Self::key_of(config, &doc)?;

        for index in config.indexes.iter().filter(|i| i.unique) {
            let Some(value) = doc.get(&index.key_path) else {
                continue;
            };
            let clash = self
                .docs
                .iter()
                .any(|(k, other)| *k != key && other.get(&index.key_path) == Some(value));
            if clash {
                return Err(StoreError::ConstraintViolation {
                    index: index.name.clone(),
                    value: value.to_string(),
                });
            }
        }

        self.docs.insert(key, doc);
        Ok(())
    }

    pub(crate) fn by_index(
        &self,
        config: &StoreConfig,
        index: &str,
        value: &Value,
    ) -> StoreResult<Vec<Value>> {
        let spec = config
            .index(index)
            .ok_or_else(|| StoreError::UnknownIndex(index.to_string()))?;
        Ok(self
            .docs
            .values()
            .filter(|doc| doc.get(&spec.key_path) == Some(value))
            .cloned()
            .collect())
    }
}

/// Volatile store for tests and ephemeral sessions
#[derive(Debug)]
pub struct MemoryStore {
    config: StoreConfig,
    table: RwLock<Table>,
}

impl MemoryStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            table: RwLock::new(Table::default()),
        }
    }

    pub fn len(&self) -> usize {
        self.table.read().docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn config(&self) -> &StoreConfig {
        &self.config
    }

    async fn put(&self, doc: Value) -> StoreResult<()> {
        self.table.write().put(&self.config, doc)
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        Ok(self.table.read().docs.get(key).cloned())
    }

    async fn get_all(&self) -> StoreResult<Vec<Value>> {
        Ok(self.table.read().docs.values().cloned().collect())
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        Ok(self.table.write().docs.remove(key).is_some())
    }

    async fn get_by_index(&self, index: &str, value: &Value) -> StoreResult<Vec<Value>> {
        self.table.read().by_index(&self.config, index, value)
    }
}
