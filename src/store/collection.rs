/*!
 * Typed Collection
 * serde view over a DocumentStore
 */

use super::traits::DocumentStore;
use super::types::{StoreError, StoreResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::warn;

/// Typed access to the documents of one store
pub struct Collection<T> {
    store: Arc<dyn DocumentStore>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            _marker: PhantomData,
        }
    }
}

impl<T: Serialize + DeserializeOwned> Collection<T> {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            _marker: PhantomData,
        }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub async fn put(&self, item: &T) -> StoreResult<()> {
        self.store.put(serde_json::to_value(item)?).await
    }

    pub async fn get(&self, key: &str) -> StoreResult<Option<T>> {
        match self.store.get(key).await? {
            Some(doc) => Ok(Some(serde_json::from_value(doc)?)),
            None => Ok(None),
        }
    }

    /// Every decodable document; malformed ones are skipped with a warning
    pub async fn get_all(&self) -> StoreResult<Vec<T>> {
        let docs = self.store.get_all().await?;
        let mut items = Vec::with_capacity(docs.len());
        for doc in docs {
            match serde_json::from_value(doc) {
                Ok(item) => items.push(item),
                Err(e) => warn!(
                    store = %self.store.config().name,
                    error = %e,
                    "Skipping malformed document"
                ),
            }
        }
        Ok(items)
    }

    pub async fn delete(&self, key: &str) -> StoreResult<bool> {
        self.store.delete(key).await
    }

    pub async fn update(&self, key: &str, patch: Value) -> StoreResult<bool> {
        if !patch.is_object() {
            return Err(StoreError::Serialization("patch must be an object".into()));
        }
        self.store.update(key, patch).await
    }

    pub async fn find_by(&self, index: &str, value: &Value) -> StoreResult<Vec<T>> {
        self.store
            .get_by_index(index, value)
            .await?
            .into_iter()
            .map(|doc| serde_json::from_value(doc).map_err(StoreError::from))
            .collect()
    }
}
