/*!
 * File Store Tests
 * Durability, index enforcement and typed collections on disk
 */

use desk_kernel::process::{AppRecord, AppStatus};
use desk_kernel::store::{Collection, DocumentStore, FileStore, StoreError};
use desk_kernel::KernelConfig;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

async fn registry(dir: &TempDir) -> FileStore {
    FileStore::open(dir.path(), KernelConfig::registry_store())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_documents_survive_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let store = registry(&dir).await;
        store.put(json!({"name": "a", "pid": "p1"})).await.unwrap();
        store.put(json!({"name": "b", "pid": "p2"})).await.unwrap();
        assert!(store.delete("b").await.unwrap());
    }

    let store = registry(&dir).await;
    assert!(store.path().ends_with("registry.json"));
    let all = store.get_all().await.unwrap();
    assert_eq!(all, vec![json!({"name": "a", "pid": "p1"})]);
}

#[tokio::test]
async fn test_failed_write_leaves_file_untouched() {
    let dir = TempDir::new().unwrap();
    let store = registry(&dir).await;
    store.put(json!({"name": "a", "pid": "p1"})).await.unwrap();

    let err = store
        .put(json!({"name": "b", "pid": "p1"}))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::ConstraintViolation { .. }));

    let reopened = registry(&dir).await;
    assert_eq!(reopened.get_all().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_update_merges_top_level_fields() {
    let dir = TempDir::new().unwrap();
    let store = registry(&dir).await;
    store
        .put(json!({"name": "a", "pid": "p1", "status": "INSTALLED"}))
        .await
        .unwrap();

    assert!(store.update("a", json!({"status": "RUNNING"})).await.unwrap());
    assert!(!store.update("zzz", json!({"status": "RUNNING"})).await.unwrap());

    let found = store.get_by_index("status", &json!("RUNNING")).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0]["pid"], json!("p1"));
}

#[tokio::test]
async fn test_typed_collection_of_records() {
    let dir = TempDir::new().unwrap();
    let store: Arc<dyn DocumentStore> = Arc::new(registry(&dir).await);
    let records: Collection<AppRecord> = Collection::new(store);

    let mut record = AppRecord::new("p1", "uuid-Notes.launcher", "app-1");
    record.status = AppStatus::Running;
    record.saved_state_mut().app = Some(json!({"count": 3}));
    records.put(&record).await.unwrap();

    let loaded = records.get("uuid-Notes.launcher").await.unwrap().unwrap();
    assert_eq!(loaded.pid, "p1");
    assert_eq!(loaded.status, AppStatus::Running);
    assert_eq!(loaded.saved_app(), Some(&json!({"count": 3})));
    assert!(loaded.handle.is_none());

    let running = records.find_by("status", &json!("RUNNING")).await.unwrap();
    assert_eq!(running.len(), 1);
}
