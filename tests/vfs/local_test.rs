/*!
 * Local Directory Tests
 * Host directory backend against a temporary directory
 */

use async_trait::async_trait;
use desk_kernel::vfs::{
    ArtifactDirectory, ArtifactHandle, LocalDirectory, PermissionMode, PermissionPrompt,
    PermissionState, VfsError,
};
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

/// Prompt that declines every artifact whose name contains "secret"
#[derive(Default)]
struct Picky {
    asked: AtomicUsize,
}

#[async_trait]
impl PermissionPrompt for Picky {
    async fn request(&self, artifact: &str, _mode: PermissionMode) -> PermissionState {
        self.asked.fetch_add(1, Ordering::SeqCst);
        if artifact.contains("secret") {
            PermissionState::Denied
        } else {
            PermissionState::Granted
        }
    }
}

#[tokio::test]
async fn test_write_list_read_remove() {
    let tmp = TempDir::new().unwrap();
    let dir = LocalDirectory::new(tmp.path().join("apps"));
    assert!(dir.ensure_access().await.unwrap().is_granted());

    dir.write("uuid-b.launcher", "bb").await.unwrap();
    dir.write("uuid-a.launcher", "a").await.unwrap();
    tokio::fs::create_dir(tmp.path().join("apps/nested")).await.unwrap();

    let names: Vec<String> = dir.list().await.unwrap().into_iter().map(|e| e.name).collect();
    assert_eq!(names, vec!["uuid-a.launcher", "uuid-b.launcher"]);
    assert_eq!(dir.read("uuid-b.launcher").await.unwrap(), "bb");

    dir.remove("uuid-a.launcher").await.unwrap();
    assert!(!dir.exists("uuid-a.launcher").await);
    assert!(matches!(
        dir.read("uuid-a.launcher").await,
        Err(VfsError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_names_cannot_escape_root() {
    let tmp = TempDir::new().unwrap();
    let dir = LocalDirectory::new(tmp.path());
    assert!(matches!(
        dir.write("../escape.launcher", "x").await,
        Err(VfsError::InvalidName(_))
    ));
    assert!(!dir.exists("../escape.launcher").await);
}

#[tokio::test]
async fn test_readonly_rejects_writes() {
    let tmp = TempDir::new().unwrap();
    let dir = LocalDirectory::new(tmp.path()).readonly();
    assert!(matches!(
        dir.write("uuid-a.launcher", "x").await,
        Err(VfsError::ReadOnly)
    ));
}

#[tokio::test]
async fn test_lazy_per_artifact_permission() {
    let tmp = TempDir::new().unwrap();
    let prompt = Arc::new(Picky::default());
    let dir = Arc::new(LocalDirectory::with_prompt(tmp.path(), prompt.clone()));
    dir.write("uuid-open.launcher", "open").await.unwrap();
    dir.write("uuid-secret.launcher", "hidden").await.unwrap();

    let open = ArtifactHandle::new("uuid-open.launcher", dir.clone());
    assert_eq!(open.query_permission(PermissionMode::Read), PermissionState::Prompt);
    assert_eq!(open.read_with_permission().await.unwrap(), "open");
    assert_eq!(open.read_with_permission().await.unwrap(), "open");

    let secret = ArtifactHandle::new("uuid-secret.launcher", dir.clone());
    assert!(matches!(
        secret.read_with_permission().await,
        Err(VfsError::PermissionDenied(_))
    ));
    assert_eq!(
        dir.query_permission("uuid-secret.launcher", PermissionMode::Read),
        PermissionState::Denied
    );
    // One prompt per artifact; the directory-level prompt never ran
    assert_eq!(prompt.asked.load(Ordering::SeqCst), 2);
}
