/*!
 * Resource Catalog
 * Store-backed resource definitions with an id-keyed cache
 */

use super::presets::system_resources;
use super::types::Resource;
use crate::store::{Collection, DocumentStore, StoreResult};
use ahash::{AHashMap, AHashSet};
use std::sync::Arc;
use tracing::{debug, info};

/// Installable application definitions
///
/// The cache is only updated after the store accepted a write, so a failed
/// upsert leaves both sides untouched.
pub struct Catalog {
    store: Collection<Resource>,
    cache: AHashMap<String, Resource>,
    system_ids: AHashSet<String>,
}

impl Catalog {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store: Collection::new(store),
            cache: AHashMap::new(),
            system_ids: AHashSet::new(),
        }
    }

    /// Upsert by id
    pub async fn put(&mut self, resource: Resource) -> StoreResult<()> {
        self.store.put(&resource).await?;
        debug!(resource_id = %resource.id, "Resource stored");
        self.cache.insert(resource.id.clone(), resource);
        Ok(())
    }

    /// Cache-only lookup
    pub fn get(&self, id: &str) -> Option<&Resource> {
        self.cache.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.cache.contains_key(id)
    }

    /// Replace the cache with the store contents
    pub async fn load_all(&mut self) -> StoreResult<usize> {
        let all = self.store.get_all().await?;
        self.cache = all.into_iter().map(|r| (r.id.clone(), r)).collect();
        info!(count = self.cache.len(), "Resources loaded");
        Ok(self.cache.len())
    }

    pub async fn remove(&mut self, id: &str) -> StoreResult<bool> {
        let existed = self.store.delete(id).await?;
        self.cache.remove(id);
        Ok(existed)
    }

    /// Seed the built-in resources, overwriting stored copies
    pub async fn ensure_presets(&mut self) -> StoreResult<()> {
        for preset in system_resources() {
            self.system_ids.insert(preset.id.clone());
            self.put(preset).await?;
        }
        Ok(())
    }

    /// Whether `id` names a built-in resource
    pub fn is_system(&self, id: &str) -> bool {
        self.system_ids.contains(id)
    }

    /// Built-in resources in catalog order
    pub fn system_resources(&self) -> Vec<&Resource> {
        let mut presets: Vec<&Resource> = self
            .system_ids
            .iter()
            .filter_map(|id| self.cache.get(id))
            .collect();
        presets.sort_by(|a, b| a.id.cmp(&b.id));
        presets
    }

    /// Resources installed by users
    pub fn user_resources(&self) -> impl Iterator<Item = &Resource> {
        self.cache.values().filter(|r| !self.system_ids.contains(&r.id))
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}
