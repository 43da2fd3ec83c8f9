/*!
 * VFS Types
 * Shared types for the artifact directory boundary
 */

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// VFS operation result
pub type VfsResult<T> = Result<T, VfsError>;

/// VFS errors
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum VfsError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Invalid artifact name: {0}")]
    InvalidName(String),

    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Read-only directory")]
    ReadOnly,
}

/// Access mode requested for an artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionMode {
    Read,
    ReadWrite,
}

impl PermissionMode {
    /// Whether a grant for `self` also covers `requested`
    pub fn covers(self, requested: PermissionMode) -> bool {
        matches!(
            (self, requested),
            (PermissionMode::ReadWrite, _) | (PermissionMode::Read, PermissionMode::Read)
        )
    }
}

/// Host answer to a permission query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionState {
    Granted,
    Denied,
    /// Not decided yet; a request will ask the host
    Prompt,
}

impl PermissionState {
    pub fn is_granted(self) -> bool {
        self == PermissionState::Granted
    }
}

/// Directory entry for a physical artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactEntry {
    pub name: String,
    pub size: u64,
}

/// Reject names that are not a single plain path component
pub fn validate_name(name: &str) -> VfsResult<()> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0');
    if bad {
        return Err(VfsError::InvalidName(name.to_string()));
    }
    Ok(())
}
