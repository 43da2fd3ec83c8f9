/*!
 * Error Types
 * Centralized error handling with thiserror and miette
 */

use super::types::{Pid, ResourceId};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use crate::codec::DecodeError;
pub use crate::sandbox::{CompileError, RuntimeError};
pub use crate::store::StoreError;
pub use crate::vfs::VfsError;

/// Reasons a cold start can fail
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum LaunchError {
    #[error("Resource {0} not found in catalog")]
    #[diagnostic(
        code(launch::resource_missing),
        help("The app references a resource that was deleted. Reinstall the app.")
    )]
    ResourceMissing(ResourceId),

    #[error("Artifact for {0} is unavailable")]
    #[diagnostic(
        code(launch::artifact_missing),
        help("Run reconciliation to refresh artifact handles.")
    )]
    ArtifactMissing(Pid),

    #[error("Artifact unreadable: {0}")]
    #[diagnostic(code(launch::artifact_unreadable))]
    ArtifactUnreadable(String),

    #[error("Artifact could not be decoded: {0}")]
    #[diagnostic(code(launch::artifact_malformed))]
    ArtifactMalformed(String),

    #[error("Compile failed: {0}")]
    #[diagnostic(
        code(launch::compile_failed),
        help("Fix the application logic source and upload it again.")
    )]
    Compile(String),

    #[error("Program failed to load: {0}")]
    #[diagnostic(code(launch::load_failed))]
    Load(String),
}

/// Unified kernel error type with miette diagnostics
#[derive(Error, Debug, Diagnostic)]
pub enum KernelError {
    #[error("Permission denied: {0}")]
    #[diagnostic(
        code(kernel::permission_denied),
        help("The host declined access. Grant access to the apps directory and retry.")
    )]
    PermissionDenied(String),

    #[error("Launch of {pid} failed: {source}")]
    #[diagnostic(code(kernel::launch_error))]
    Launch {
        pid: Pid,
        #[source]
        source: LaunchError,
    },

    #[error("Security violation: {0}")]
    #[diagnostic(
        code(kernel::security_violation),
        help("Applications must use the injected capabilities instead of ambient host APIs.")
    )]
    SecurityViolation(String),

    #[error("Decode error: {0}")]
    #[diagnostic(code(kernel::decode_error))]
    Decode(#[from] DecodeError),

    #[error("Store error: {0}")]
    #[diagnostic(
        code(kernel::store_error),
        help("In-memory state stays authoritative; the write is retried at the next save point.")
    )]
    Store(#[from] StoreError),

    #[error("Filesystem error: {0}")]
    #[diagnostic(code(kernel::vfs_error))]
    Vfs(#[from] VfsError),

    #[error("Runtime error: {0}")]
    #[diagnostic(code(kernel::runtime_error))]
    Runtime(RuntimeError),

    #[error("App {0} not found")]
    #[diagnostic(
        code(kernel::not_found),
        help("The app may have been deleted or never registered. Check the pid.")
    )]
    NotFound(Pid),

    #[error("App {0} has no live execution context")]
    #[diagnostic(code(kernel::not_running), help("Start the app before dispatching to it."))]
    NotRunning(Pid),

    #[error("Resource {0} is a system resource and cannot be deleted")]
    #[diagnostic(code(kernel::not_deletable))]
    NotDeletable(ResourceId),

    #[error("Resource {0} is a system resource and cannot be overwritten")]
    #[diagnostic(
        code(kernel::not_overwritable),
        help("Upload under a different name or seed to get a fresh resource id.")
    )]
    NotOverwritable(ResourceId),

    #[error("Invalid resource: {0}")]
    #[diagnostic(code(kernel::invalid_resource))]
    InvalidResource(String),

    #[error("Kernel has shut down")]
    #[diagnostic(code(kernel::shutdown))]
    Shutdown,
}

impl KernelError {
    pub fn launch(pid: impl Into<Pid>, source: LaunchError) -> Self {
        KernelError::Launch {
            pid: pid.into(),
            source,
        }
    }
}

impl From<RuntimeError> for KernelError {
    fn from(err: RuntimeError) -> Self {
        match err {
            RuntimeError::SecurityViolation(msg) => KernelError::SecurityViolation(msg),
            other => KernelError::Runtime(other),
        }
    }
}

impl From<CompileError> for LaunchError {
    fn from(err: CompileError) -> Self {
        LaunchError::Compile(err.to_string())
    }
}

impl From<DecodeError> for LaunchError {
    fn from(err: DecodeError) -> Self {
        LaunchError::ArtifactMalformed(err.to_string())
    }
}
