/*!
 * VFS Traits
 * Host directory boundary for launcher artifacts
 */

use super::types::*;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Directory granting enumerate/read/write/delete of individual artifacts
///
/// Access to each artifact is requested lazily; a directory may answer
/// [`PermissionState::Prompt`] until the host decides.
#[async_trait]
pub trait ArtifactDirectory: Send + Sync {
    /// Ask for read/write access to the directory itself
    async fn ensure_access(&self) -> VfsResult<PermissionState>;

    /// List artifacts (files only)
    async fn list(&self) -> VfsResult<Vec<ArtifactEntry>>;

    /// Read an artifact as UTF-8 text
    async fn read(&self, name: &str) -> VfsResult<String>;

    /// Create or overwrite an artifact
    async fn write(&self, name: &str, text: &str) -> VfsResult<()>;

    /// Delete an artifact
    async fn remove(&self, name: &str) -> VfsResult<()>;

    /// Check whether an artifact exists
    async fn exists(&self, name: &str) -> bool;

    /// Current permission for an artifact, without prompting
    fn query_permission(&self, name: &str, mode: PermissionMode) -> PermissionState;

    /// Prompt the host for permission on an artifact
    async fn request_permission(&self, name: &str, mode: PermissionMode) -> PermissionState;

    /// Directory name for logs
    fn name(&self) -> &str;
}

/// Host-side decision maker for permission prompts
#[async_trait]
pub trait PermissionPrompt: Send + Sync {
    async fn request(&self, artifact: &str, mode: PermissionMode) -> PermissionState;
}

/// Prompt that grants everything
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoGrant;

#[async_trait]
impl PermissionPrompt for AutoGrant {
    async fn request(&self, _artifact: &str, _mode: PermissionMode) -> PermissionState {
        PermissionState::Granted
    }
}

/// Reference to one physical artifact inside a directory
#[derive(Clone)]
pub struct ArtifactHandle {
    name: String,
    directory: Arc<dyn ArtifactDirectory>,
}

impl ArtifactHandle {
    pub fn new(name: impl Into<String>, directory: Arc<dyn ArtifactDirectory>) -> Self {
        Self {
            name: name.into(),
            directory,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn query_permission(&self, mode: PermissionMode) -> PermissionState {
        self.directory.query_permission(&self.name, mode)
    }

    pub async fn request_permission(&self, mode: PermissionMode) -> PermissionState {
        self.directory.request_permission(&self.name, mode).await
    }

    /// Read the artifact, prompting for read access when not yet granted
    pub async fn read_with_permission(&self) -> VfsResult<String> {
        if !self.query_permission(PermissionMode::Read).is_granted()
            && !self.request_permission(PermissionMode::Read).await.is_granted()
        {
            return Err(VfsError::PermissionDenied(self.name.clone()));
        }
        self.directory.read(&self.name).await
    }

    pub async fn read(&self) -> VfsResult<String> {
        self.directory.read(&self.name).await
    }

    pub async fn remove(&self) -> VfsResult<()> {
        self.directory.remove(&self.name).await
    }
}

impl fmt::Debug for ArtifactHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArtifactHandle")
            .field("name", &self.name)
            .field("directory", &self.directory.name())
            .finish()
    }
}
