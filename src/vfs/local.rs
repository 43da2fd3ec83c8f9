/*!
 * Local Directory Backend
 * Wraps tokio::fs for a host directory of launcher artifacts
 */

use super::traits::{ArtifactDirectory, AutoGrant, PermissionPrompt};
use super::types::*;
use async_trait::async_trait;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Host directory rooted at a fixed path
#[derive(Clone)]
pub struct LocalDirectory {
    root: PathBuf,
    label: String,
    readonly: bool,
    prompt: Arc<dyn PermissionPrompt>,
    /// Per-artifact decisions, filled lazily
    grants: Arc<DashMap<String, (PermissionMode, PermissionState)>>,
}

impl LocalDirectory {
    /// Create a directory that grants every request
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self::with_prompt(root, Arc::new(AutoGrant))
    }

    /// Create a directory that consults `prompt` for each artifact
    pub fn with_prompt<P: Into<PathBuf>>(root: P, prompt: Arc<dyn PermissionPrompt>) -> Self {
        let root = root.into();
        Self {
            label: root.display().to_string(),
            root,
            readonly: false,
            prompt,
            grants: Arc::new(DashMap::new()),
        }
    }

    pub fn readonly(mut self) -> Self {
        self.readonly = true;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve an artifact name to a path that cannot escape the root
    fn resolve(&self, name: &str) -> VfsResult<PathBuf> {
        validate_name(name)?;
        Ok(self.root.join(name))
    }

    fn check_write(&self) -> VfsResult<()> {
        if self.readonly {
            return Err(VfsError::ReadOnly);
        }
        Ok(())
    }

    /// Convert std::io::Error to VfsError
    fn io_error(e: std::io::Error, context: impl Into<String>) -> VfsError {
        use std::io::ErrorKind;
        match e.kind() {
            ErrorKind::NotFound => VfsError::NotFound(context.into()),
            ErrorKind::PermissionDenied => VfsError::PermissionDenied(context.into()),
            _ => VfsError::IoError(format!("{}: {}", context.into(), e)),
        }
    }
}

#[async_trait]
impl ArtifactDirectory for LocalDirectory {
    async fn ensure_access(&self) -> VfsResult<PermissionState> {
        let mode = if self.readonly {
            PermissionMode::Read
        } else {
            PermissionMode::ReadWrite
        };
        let state = self.prompt.request(&self.label, mode).await;
        if state.is_granted() && !self.readonly {
            tokio::fs::create_dir_all(&self.root)
                .await
                .map_err(|e| Self::io_error(e, format!("create {}", self.label)))?;
        }
        Ok(state)
    }

    async fn list(&self) -> VfsResult<Vec<ArtifactEntry>> {
        let mut dir = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| Self::io_error(e, format!("list {}", self.label)))?;

        let mut entries = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| Self::io_error(e, format!("list {}", self.label)))?
        {
            let metadata = match entry.metadata().await {
                Ok(md) => md,
                Err(e) => {
                    warn!(entry = ?entry.file_name(), error = %e, "Skipping unreadable entry");
                    continue;
                }
            };
            if !metadata.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                entries.push(ArtifactEntry {
                    name: name.to_string(),
                    size: metadata.len(),
                });
            }
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn read(&self, name: &str) -> VfsResult<String> {
        let path = self.resolve(name)?;
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| Self::io_error(e, format!("read {}", name)))
    }

    async fn write(&self, name: &str, text: &str) -> VfsResult<()> {
        self.check_write()?;
        let path = self.resolve(name)?;
        tokio::fs::write(&path, text)
            .await
            .map_err(|e| Self::io_error(e, format!("write {}", name)))?;
        debug!(artifact = %name, bytes = text.len(), "Artifact written");
        Ok(())
    }

    async fn remove(&self, name: &str) -> VfsResult<()> {
        self.check_write()?;
        let path = self.resolve(name)?;
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| Self::io_error(e, format!("remove {}", name)))?;
        self.grants.remove(name);
        Ok(())
    }

    async fn exists(&self, name: &str) -> bool {
        match self.resolve(name) {
            Ok(path) => tokio::fs::metadata(&path).await.is_ok(),
            Err(_) => false,
        }
    }

    fn query_permission(&self, name: &str, mode: PermissionMode) -> PermissionState {
        match self.grants.get(name) {
            Some(entry) => {
                let (granted_mode, state) = *entry;
                match state {
                    PermissionState::Granted if granted_mode.covers(mode) => {
                        PermissionState::Granted
                    }
                    PermissionState::Denied => PermissionState::Denied,
                    _ => PermissionState::Prompt,
                }
            }
            None => PermissionState::Prompt,
        }
    }

    async fn request_permission(&self, name: &str, mode: PermissionMode) -> PermissionState {
        let state = self.prompt.request(name, mode).await;
        self.grants.insert(name.to_string(), (mode, state));
        state
    }

    fn name(&self) -> &str {
        &self.label
    }
}
