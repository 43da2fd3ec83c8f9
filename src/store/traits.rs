/*!
 * Store Traits
 * Document persistence abstraction
 */

use super::types::{StoreConfig, StoreResult};
use async_trait::async_trait;
use serde_json::Value;

/// Key/document persistence with secondary indexes
///
/// Documents are JSON objects keyed by the string field named in
/// [`StoreConfig::key_path`].
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Layout the store was opened with
    fn config(&self) -> &StoreConfig;

    /// Insert or replace a document
    async fn put(&self, doc: Value) -> StoreResult<()>;

    /// Fetch a document by primary key
    async fn get(&self, key: &str) -> StoreResult<Option<Value>>;

    /// Fetch every document, ordered by key
    async fn get_all(&self) -> StoreResult<Vec<Value>>;

    /// Delete a document; returns whether it existed
    async fn delete(&self, key: &str) -> StoreResult<bool>;

    /// Shallow-merge `patch` into an existing document
    ///
    /// Returns `false` without writing when the key is absent.
    async fn update(&self, key: &str, patch: Value) -> StoreResult<bool> {
        match self.get(key).await? {
            Some(mut doc) => {
                crate::core::serde::merge_shallow(&mut doc, patch);
                self.put(doc).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Fetch documents whose indexed field equals `value`
    async fn get_by_index(&self, index: &str, value: &Value) -> StoreResult<Vec<Value>>;
}
