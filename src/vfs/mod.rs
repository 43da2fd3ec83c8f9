/*!
 * Artifact Directory Module
 * Host directory abstraction for launcher artifacts
 */

pub mod local;
pub mod memory;
pub mod traits;
pub mod types;

// Re-exports
pub use local::LocalDirectory;
pub use memory::MemDirectory;
pub use traits::{ArtifactDirectory, ArtifactHandle, AutoGrant, PermissionPrompt};
pub use types::{
    validate_name, ArtifactEntry, PermissionMode, PermissionState, VfsError, VfsResult,
};
