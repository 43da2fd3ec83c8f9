/*!
 * In-Memory Directory Backend
 * Volatile artifact directory for tests and headless hosts
 */

use super::traits::ArtifactDirectory;
use super::types::*;
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// In-memory artifact directory
///
/// Grants every request unless an artifact was scripted as denied with
/// [`MemDirectory::deny`].
#[derive(Debug, Clone, Default)]
pub struct MemDirectory {
    files: Arc<DashMap<String, String>>,
    grants: Arc<DashMap<String, PermissionMode>>,
    denied: Arc<DashSet<String>>,
    deny_access: Arc<AtomicBool>,
    requests: Arc<AtomicUsize>,
}

impl MemDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every future request for `name` with Denied
    pub fn deny(&self, name: impl Into<String>) {
        let name = name.into();
        self.grants.remove(&name);
        self.denied.insert(name);
    }

    /// Make `ensure_access` report Denied
    pub fn deny_directory(&self) {
        self.deny_access.store(true, Ordering::SeqCst);
    }

    /// Number of permission prompts issued so far
    pub fn permission_requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Names currently stored, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.files.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

#[async_trait]
impl ArtifactDirectory for MemDirectory {
    async fn ensure_access(&self) -> VfsResult<PermissionState> {
        if self.deny_access.load(Ordering::SeqCst) {
            return Ok(PermissionState::Denied);
        }
        Ok(PermissionState::Granted)
    }

    async fn list(&self) -> VfsResult<Vec<ArtifactEntry>> {
        let mut entries: Vec<ArtifactEntry> = self
            .files
            .iter()
            .map(|e| ArtifactEntry {
                name: e.key().clone(),
                size: e.value().len() as u64,
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn read(&self, name: &str) -> VfsResult<String> {
        validate_name(name)?;
        self.files
            .get(name)
            .map(|text| text.value().clone())
            .ok_or_else(|| VfsError::NotFound(name.to_string()))
    }

    async fn write(&self, name: &str, text: &str) -> VfsResult<()> {
        validate_name(name)?;
        self.files.insert(name.to_string(), text.to_string());
        Ok(())
    }

    async fn remove(&self, name: &str) -> VfsResult<()> {
        validate_name(name)?;
        self.grants.remove(name);
        self.files
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| VfsError::NotFound(name.to_string()))
    }

    async fn exists(&self, name: &str) -> bool {
        self.files.contains_key(name)
    }

    fn query_permission(&self, name: &str, mode: PermissionMode) -> PermissionState {
        if self.denied.contains(name) {
            return PermissionState::Denied;
        }
        match self.grants.get(name) {
            Some(granted) if granted.covers(mode) => PermissionState::Granted,
            _ => PermissionState::Prompt,
        }
    }

    async fn request_permission(&self, name: &str, mode: PermissionMode) -> PermissionState {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if self.denied.contains(name) {
            return PermissionState::Denied;
        }
        self.grants.insert(name.to_string(), mode);
        PermissionState::Granted
    }

    fn name(&self) -> &str {
        "memory"
    }
}
