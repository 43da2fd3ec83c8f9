/*!
 * Reconciliation Tests
 * Zombie artifacts, orphan entries and idempotence
 */

use crate::common::*;
use desk_kernel::catalog::presets::START_ID;
use desk_kernel::catalog::{Catalog, Resource, ResourceContent};
use desk_kernel::vfs::ArtifactDirectory;
use desk_kernel::{encode, AppStatus, KernelConfig};
use pretty_assertions::assert_eq;
use serde_json::json;

fn resource(id: &str, name: &str) -> Resource {
    Resource {
        id: id.to_string(),
        name: name.to_string(),
        is_bundle: false,
        content: ResourceContent::Single(COUNTER_VIEW.to_string()),
        logic: Some(COUNTER_LOGIC.to_string()),
        meta_info: Default::default(),
    }
}

#[tokio::test]
async fn test_second_pass_is_quiet() {
    let harness = Harness::new();
    let kernel = harness.boot().await.unwrap();
    install_counter(&kernel, "Notes").await;
    install_counter(&kernel, "Todo").await;

    let first = kernel.reconcile().await.unwrap();
    let apps_before = kernel.list_apps().await.unwrap().len();
    let second = kernel.reconcile().await.unwrap();

    assert!(first.is_quiet());
    assert!(second.is_quiet());
    assert_eq!(second.refreshed.len(), 2);
    assert_eq!(kernel.list_apps().await.unwrap().len(), apps_before);
}

#[tokio::test]
async fn test_zombie_with_known_resource_is_registered() {
    let harness = Harness::with_config(KernelConfig::default().with_materialize_on_boot(false));
    let mut catalog = Catalog::new(harness.resources.clone());
    catalog.put(resource("app-1", "Notes")).await.unwrap();
    harness
        .directory
        .write("uuid-Copy.launcher", &encode(&resource("app-1", "Notes")))
        .await
        .unwrap();

    let kernel = harness.boot().await.unwrap();
    let app = kernel
        .list_apps()
        .await
        .unwrap()
        .into_iter()
        .find(|a| a.resource_id == "app-1")
        .unwrap();
    assert_eq!(app.name, "uuid-Copy.launcher");
    assert_eq!(app.status, AppStatus::Installed);
    assert_eq!(app.meta_info.name.as_deref(), Some("Notes"));
    assert!(!app.is_system_app);
}

#[tokio::test]
async fn test_materialize_then_register_at_boot() {
    let harness = Harness::new();
    let mut catalog = Catalog::new(harness.resources.clone());
    catalog.put(resource("app-1", "Notes")).await.unwrap();

    let kernel = harness.boot().await.unwrap();
    assert!(harness.directory.exists("uuid-Notes.launcher").await);
    let pid = pid_of(&kernel, "app-1").await;

    kernel.start(&pid, None).await.unwrap();
    wait_for_state(&kernel, &pid, |s| s["count"] == json!(0)).await;
}

#[tokio::test]
async fn test_garbage_artifact_is_removed() {
    let harness = Harness::new();
    harness
        .directory
        .write("uuid-Junk.launcher", "not a launcher")
        .await
        .unwrap();
    harness.directory.write("notes.txt", "ignored").await.unwrap();

    let kernel = harness.boot().await.unwrap();
    assert!(!harness.directory.exists("uuid-Junk.launcher").await);
    assert!(harness.directory.exists("notes.txt").await);
    assert!(kernel.list_apps().await.unwrap().iter().all(|a| a.is_system_app));
}

#[tokio::test]
async fn test_unknown_resource_removed_without_auto_register() {
    let harness = Harness::with_config(KernelConfig::default().with_auto_register(false));
    harness
        .directory
        .write("uuid-Stray.launcher", &encode(&resource("app-9", "Stray")))
        .await
        .unwrap();

    let kernel = harness.boot().await.unwrap();
    assert!(!harness.directory.exists("uuid-Stray.launcher").await);
    assert!(kernel.get_resource("app-9").await.unwrap().is_none());
}

#[tokio::test]
async fn test_unknown_resource_adopted_with_auto_register() {
    let harness = Harness::new();
    harness
        .directory
        .write("uuid-Stray.launcher", &encode(&resource("app-9", "Stray")))
        .await
        .unwrap();

    let kernel = harness.boot().await.unwrap();
    let adopted = kernel.get_resource("app-9").await.unwrap().unwrap();
    assert_eq!(adopted.name, "Stray");
    assert_eq!(adopted.logic.as_deref(), Some(COUNTER_LOGIC.trim()));

    let pid = pid_of(&kernel, "app-9").await;
    kernel.start(&pid, None).await.unwrap();
    wait_for_state(&kernel, &pid, |s| s["count"] == json!(0)).await;
}

#[tokio::test]
async fn test_system_resource_artifacts_are_never_adopted() {
    let harness = Harness::new();
    let bootstrap = harness.boot().await.unwrap();
    let start = bootstrap.get_resource(START_ID).await.unwrap().unwrap();
    bootstrap.shutdown().await.unwrap();

    harness
        .directory
        .write("uuid-Start.launcher", &encode(&start))
        .await
        .unwrap();
    let kernel = harness.boot().await.unwrap();
    assert!(!harness.directory.exists("uuid-Start.launcher").await);
    assert!(kernel.list_apps().await.unwrap().iter().all(|a| a.is_system_app));
}

#[tokio::test]
async fn test_external_delete_purges_entry_and_context() {
    let harness = Harness::new();
    let kernel = harness.boot().await.unwrap();
    let pid = install_counter(&kernel, "Notes").await;
    kernel.start(&pid, None).await.unwrap();
    wait_for_state(&kernel, &pid, |s| s["count"] == json!(0)).await;

    harness.directory.remove("uuid-Notes.launcher").await.unwrap();
    let report = kernel.reconcile().await.unwrap();

    assert_eq!(report.purged, vec!["uuid-Notes.launcher".to_string()]);
    assert!(kernel.list_apps().await.unwrap().iter().all(|a| a.pid != pid));
    assert!(kernel.cached_state(&pid).is_none());
    let stats = kernel.stats();
    assert_eq!(stats.contexts_terminated, 1);
    assert_eq!(stats.live_contexts, 0);
}

#[tokio::test]
async fn test_hostile_payload_length_does_not_stop_the_kernel() {
    let harness = Harness::new();
    let kernel = harness.boot().await.unwrap();
    let text = concat!(
        "const SYS_CONFIG = {\"resourceId\":\"app-7\",\"name\":\"Huge\",\"isBundle\":false,\"payloadBytes\":18446744073709551615};\n",
        "const ORIGIN_COMPONENT = \"x\";//resourceId:app-7;\n",
    );
    harness
        .directory
        .write("uuid-Huge.launcher", text)
        .await
        .unwrap();

    kernel.reconcile().await.unwrap();
    let adopted = kernel.get_resource("app-7").await.unwrap().unwrap();
    assert_eq!(adopted.name, "Huge");
    assert!(kernel.list_apps().await.unwrap().iter().any(|a| a.resource_id == "app-7"));
}
