/*!
 * Runaway App Tests
 * App code that never finishes must not stall the supervisor
 */

use crate::common::*;
use desk_kernel::{AppStatus, KernelError, ResourceContent};
use serde_json::json;
use std::time::Duration;
use tokio::time::timeout;

const RUNAWAY_TOP_LEVEL: &str = "fn f(n) { if (n > 0) { f(n - 1); f(n - 1); } } f(40);";

const LIMIT: Duration = Duration::from_secs(3);

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
async fn test_runaway_load_leaves_kernel_responsive() {
    let harness = Harness::new();
    let kernel = harness.boot().await.unwrap();
    let id = kernel
        .upload_resource(upload("Runaway", "r1", RUNAWAY_TOP_LEVEL))
        .await
        .unwrap();
    let pid = pid_of(&kernel, &id).await;

    let starter = kernel.clone();
    let start_pid = pid.clone();
    let start = tokio::spawn(async move { starter.start(&start_pid, None).await });
    settle().await;

    assert!(timeout(LIMIT, kernel.list_apps()).await.is_ok());
    timeout(LIMIT, kernel.force_kill(&pid))
        .await
        .expect("force_kill stalled")
        .unwrap();

    let err = timeout(LIMIT, start)
        .await
        .expect("start never answered")
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, KernelError::Launch { .. }));
    assert_eq!(status_of(&kernel, &pid).await, AppStatus::Installed);
    assert_eq!(kernel.stats().live_contexts, 0);
}

#[tokio::test]
async fn test_runaway_reducer_can_be_killed() {
    let harness = Harness::new();
    let kernel = harness.boot().await.unwrap();
    let logic = r#"
        let initialState = { n: 0 };
        fn spin(n) { if (n > 0) { spin(n - 1); spin(n - 1); } }
        fn reducer(state, action) { if (action.type == "GO") { spin(50); } return state; }
    "#;
    let id = kernel.upload_resource(upload("Spinner", "s1", logic)).await.unwrap();
    let pid = pid_of(&kernel, &id).await;
    kernel.start(&pid, None).await.unwrap();
    wait_for_state(&kernel, &pid, |s| s["n"] == json!(0)).await;

    kernel.dispatch(&pid, json!({"type": "GO"})).await.unwrap();
    settle().await;

    timeout(LIMIT, kernel.force_kill(&pid))
        .await
        .expect("force_kill stalled")
        .unwrap();
    assert_eq!(kernel.stats().live_contexts, 0);

    // A fresh context comes up while the old thread unwinds
    timeout(LIMIT, kernel.start(&pid, None))
        .await
        .expect("restart stalled")
        .unwrap();
    wait_for_state(&kernel, &pid, |s| s["n"] == json!(0)).await;
}

#[tokio::test]
async fn test_slow_view_mount_runs_off_the_supervisor() {
    let harness = Harness::new();
    let kernel = harness.boot().await.unwrap();
    let view = format!(
        "{}\nexport default fn(props) {{ return h(\"p\", null, 1); }};",
        RUNAWAY_TOP_LEVEL
    );
    let mut request = upload("SlowView", "v1", COUNTER_LOGIC);
    request.content = ResourceContent::Single(view);
    let id = kernel.upload_resource(request).await.unwrap();
    let pid = pid_of(&kernel, &id).await;

    // Abandoning the mount cancels the view's code
    assert!(timeout(Duration::from_millis(200), kernel.mount_view(&pid))
        .await
        .is_err());
    assert!(timeout(LIMIT, kernel.list_apps()).await.is_ok());
    timeout(LIMIT, kernel.start(&pid, None))
        .await
        .expect("start stalled")
        .unwrap();
}
