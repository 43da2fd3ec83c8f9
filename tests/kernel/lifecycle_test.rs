/*!
 * Lifecycle Tests
 * start / hibernate / kill / delete transitions through the kernel handle
 */

use crate::common::*;
use desk_kernel::catalog::presets::START_ID;
use desk_kernel::core::system_pid;
use desk_kernel::vfs::ArtifactDirectory;
use desk_kernel::{AppStatus, KernelError, ProcessEvent, WindowRect};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;

async fn status_of(kernel: &desk_kernel::Kernel, pid: &str) -> AppStatus {
    kernel
        .list_apps()
        .await
        .unwrap()
        .into_iter()
        .find(|app| app.pid == pid)
        .map(|app| app.status)
        .unwrap()
}

#[tokio::test]
async fn test_boot_registers_system_apps_first() {
    let harness = Harness::new();
    let kernel = harness.boot().await.unwrap();
    install_counter(&kernel, "Notes").await;

    let apps = kernel.list_apps().await.unwrap();
    let first_user = apps.iter().position(|a| !a.is_system_app).unwrap();
    assert!(apps[..first_user].iter().all(|a| a.is_system_app));
    assert!(apps.iter().any(|a| a.pid == system_pid(START_ID)));
    assert!(kernel.is_system_app(&system_pid(START_ID)).await.unwrap());
}

#[tokio::test]
async fn test_cold_start_broadcasts_initial_state() {
    let harness = Harness::new();
    let kernel = harness.boot().await.unwrap();
    let pid = install_counter(&kernel, "Notes").await;

    kernel.start(&pid, None).await.unwrap();
    let state = wait_for_state(&kernel, &pid, |s| s["count"] == json!(0)).await;
    assert_eq!(state["config"]["name"], json!("Notes"));
    assert_eq!(status_of(&kernel, &pid).await, AppStatus::Running);

    let stats = kernel.stats();
    assert_eq!(stats.contexts_spawned, 1);
    assert_eq!(stats.init_messages, 1);
}

#[tokio::test]
async fn test_hibernate_then_start_reuses_context() {
    let harness = Harness::new();
    let kernel = harness.boot().await.unwrap();
    let pid = install_counter(&kernel, "Notes").await;

    kernel.start(&pid, None).await.unwrap();
    wait_for_state(&kernel, &pid, |s| s["count"] == json!(0)).await;
    kernel.dispatch(&pid, json!({"type": "INC"})).await.unwrap();
    wait_for_state(&kernel, &pid, |s| s["count"] == json!(1)).await;

    kernel.hibernate(&pid).await.unwrap();
    assert_eq!(status_of(&kernel, &pid).await, AppStatus::Hibernated);
    assert_eq!(kernel.hibernated_apps().await.unwrap().len(), 1);

    kernel.start(&pid, None).await.unwrap();
    assert_eq!(status_of(&kernel, &pid).await, AppStatus::Running);
    assert_eq!(kernel.cached_state(&pid).unwrap()["count"], json!(1));

    let stats = kernel.stats();
    assert_eq!(stats.contexts_spawned, 1);
    assert_eq!(stats.init_messages, 1);
    assert_eq!(stats.live_contexts, 1);
}

#[tokio::test]
async fn test_start_is_idempotent_while_running() {
    let harness = Harness::new();
    let kernel = harness.boot().await.unwrap();
    let pid = install_counter(&kernel, "Notes").await;

    kernel.start(&pid, None).await.unwrap();
    kernel.start(&pid, None).await.unwrap();
    assert_eq!(kernel.stats().contexts_spawned, 1);
    assert_eq!(kernel.running_apps().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_force_kill_resets_to_installed() {
    let harness = Harness::new();
    let kernel = harness.boot().await.unwrap();
    let pid = install_counter(&kernel, "Notes").await;

    kernel.start(&pid, None).await.unwrap();
    kernel.dispatch(&pid, json!({"type": "INC"})).await.unwrap();
    wait_for_state(&kernel, &pid, |s| s["count"] == json!(1)).await;
    settle().await;

    kernel.force_kill(&pid).await.unwrap();
    let app = kernel
        .list_apps()
        .await
        .unwrap()
        .into_iter()
        .find(|a| a.pid == pid)
        .unwrap();
    assert_eq!(app.status, AppStatus::Installed);
    assert!(app.saved_state.is_none());
    assert!(kernel.cached_state(&pid).is_none());
    assert_eq!(kernel.stats().live_contexts, 0);

    // Killing an idle pid is still fine
    kernel.force_kill(&pid).await.unwrap();
}

#[tokio::test]
async fn test_restart_restores_saved_state() {
    let harness = Harness::new();
    let kernel = harness.boot().await.unwrap();
    let pid = install_counter(&kernel, "Notes").await;

    kernel.start(&pid, None).await.unwrap();
    kernel.dispatch(&pid, json!({"type": "INC"})).await.unwrap();
    kernel.dispatch(&pid, json!({"type": "INC"})).await.unwrap();
    wait_for_state(&kernel, &pid, |s| s["count"] == json!(2)).await;
    kernel.shutdown().await.unwrap();

    let kernel = harness.boot().await.unwrap();
    let state = wait_for_state(&kernel, &pid, |s| s["count"] == json!(2)).await;
    assert_eq!(state["config"]["name"], json!("Notes"));
    let stats = kernel.stats();
    assert_eq!(stats.restore_messages, 1);
    assert_eq!(stats.init_messages, 0);
}

#[tokio::test]
async fn test_subscribe_receives_updates_until_dropped() {
    let harness = Harness::new();
    let kernel = harness.boot().await.unwrap();
    let pid = install_counter(&kernel, "Notes").await;

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let subscription = kernel.subscribe(&pid, move |event| sink.lock().push(event.clone()));

    kernel.start(&pid, None).await.unwrap();
    wait_for_state(&kernel, &pid, |s| s["count"] == json!(0)).await;
    assert!(matches!(seen.lock().first(), Some(ProcessEvent::State(_))));

    subscription.unsubscribe();
    let before = seen.lock().len();
    kernel.dispatch(&pid, json!({"type": "INC"})).await.unwrap();
    wait_for_state(&kernel, &pid, |s| s["count"] == json!(1)).await;
    assert_eq!(seen.lock().len(), before);
}

#[tokio::test]
async fn test_delete_app_removes_everything() {
    let harness = Harness::new();
    let kernel = harness.boot().await.unwrap();
    let pid = install_counter(&kernel, "Notes").await;
    let resource_id = kernel
        .list_apps()
        .await
        .unwrap()
        .into_iter()
        .find(|a| a.pid == pid)
        .map(|a| a.resource_id)
        .unwrap();
    kernel.start(&pid, None).await.unwrap();

    kernel.delete_app(&pid, &resource_id).await.unwrap();
    assert!(kernel.list_apps().await.unwrap().iter().all(|a| a.pid != pid));
    assert!(kernel.get_resource(&resource_id).await.unwrap().is_none());
    assert!(!harness.directory.exists("uuid-Notes.launcher").await);
    assert_eq!(kernel.stats().live_contexts, 0);
}

#[tokio::test]
async fn test_system_apps_cannot_be_deleted() {
    let harness = Harness::new();
    let kernel = harness.boot().await.unwrap();
    let err = kernel
        .delete_app(&system_pid(START_ID), START_ID)
        .await
        .unwrap_err();
    assert!(matches!(err, KernelError::NotDeletable(_)));
}

#[tokio::test]
async fn test_declined_read_is_permission_denied() {
    let harness = Harness::new();
    let kernel = harness.boot().await.unwrap();
    let pid = install_counter(&kernel, "Notes").await;
    harness.directory.deny("uuid-Notes.launcher");

    let err = kernel.start(&pid, None).await.unwrap_err();
    assert!(matches!(err, KernelError::PermissionDenied(_)));
    assert_eq!(status_of(&kernel, &pid).await, AppStatus::Installed);
    assert_eq!(kernel.stats().live_contexts, 0);
}

#[tokio::test]
async fn test_broken_logic_is_launch_error() {
    let harness = Harness::new();
    let kernel = harness.boot().await.unwrap();
    let id = kernel
        .upload_resource(upload("Broken", "b1", "fn ("))
        .await
        .unwrap();
    let pid = pid_of(&kernel, &id).await;

    let err = kernel.start(&pid, None).await.unwrap_err();
    assert!(matches!(err, KernelError::Launch { .. }));
    assert_eq!(status_of(&kernel, &pid).await, AppStatus::Installed);
}

#[tokio::test]
async fn test_unknown_pid_is_not_found() {
    let harness = Harness::new();
    let kernel = harness.boot().await.unwrap();
    assert!(matches!(
        kernel.start("nope", None).await,
        Err(KernelError::NotFound(_))
    ));
    assert!(matches!(
        kernel.dispatch("nope", json!({"type": "X"})).await,
        Err(KernelError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_window_geometry_is_persisted() {
    let harness = Harness::new();
    let kernel = harness.boot().await.unwrap();
    let pid = install_counter(&kernel, "Notes").await;

    assert_eq!(
        kernel.window_geometry(&pid).await.unwrap(),
        harness.config.default_window
    );

    let rect = WindowRect::new(10.0, 20.0, 640.0, 480.0);
    kernel.save_window_geometry(&pid, rect).await.unwrap();
    kernel.shutdown().await.unwrap();

    let kernel = harness.boot().await.unwrap();
    let app = kernel
        .list_apps()
        .await
        .unwrap()
        .into_iter()
        .find(|a| a.pid == pid)
        .unwrap();
    assert_eq!(app.saved_state.and_then(|s| s.window), Some(rect));
    assert_eq!(kernel.window_geometry(&pid).await.unwrap(), rect);
}

#[tokio::test]
async fn test_calls_after_shutdown_fail() {
    let harness = Harness::new();
    let kernel = harness.boot().await.unwrap();
    kernel.shutdown().await.unwrap();
    settle().await;
    assert!(matches!(kernel.list_apps().await, Err(KernelError::Shutdown)));
}

#[tokio::test]
async fn test_queries_and_registry_changes() {
    let harness = Harness::new();
    let kernel = harness.boot().await.unwrap();

    let changes = Arc::new(Mutex::new(0usize));
    let counter = Arc::clone(&changes);
    let subscription = kernel.subscribe_registry_changes(move || *counter.lock() += 1);

    let mut request = upload("Locked", "seed-locked", COUNTER_LOGIC);
    request.meta_info.custom.insert("blockEd".to_string(), json!(true));
    kernel.upload_resource(request).await.unwrap();
    let pid = install_counter(&kernel, "Notes").await;
    kernel.start(&pid, None).await.unwrap();
    assert!(*changes.lock() >= 3);

    let blocked = kernel.blocked_apps().await.unwrap();
    assert_eq!(blocked.len(), 1);
    assert!(blocked[0].meta_info.custom_flag("blockEd"));
    assert_eq!(kernel.apps_of_type("system").await.unwrap().len(), 4);
    assert_eq!(kernel.running_apps().await.unwrap()[0].pid, pid);

    subscription.unsubscribe();
    let seen = *changes.lock();
    kernel.force_kill(&pid).await.unwrap();
    assert_eq!(*changes.lock(), seen);
}
