/*!
 * Supervisor Call Tests
 * KERNEL_CALL interception, evoke and capability violations
 */

use crate::common::*;
use desk_kernel::catalog::presets::{DEVELOPER_ID, NOTEBOOK_ID, START_ID};
use desk_kernel::core::system_pid;
use desk_kernel::{KernelError, ProcessEvent};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;

fn call(method: &str, args: serde_json::Value) -> serde_json::Value {
    json!({ "type": "KERNEL_CALL", "payload": { "method": method, "args": args } })
}

#[tokio::test]
async fn test_privileged_list_apps_replies_to_caller() {
    let harness = Harness::new();
    let kernel = harness.boot().await.unwrap();
    let pid = system_pid(START_ID);

    kernel.start(&pid, None).await.unwrap();
    wait_for_state(&kernel, &pid, |s| s["apps"] == json!([])).await;
    kernel.dispatch(&pid, call("LIST_APPS", json!({}))).await.unwrap();

    let state = wait_for_state(&kernel, &pid, |s| {
        s["apps"].as_array().map_or(false, |apps| !apps.is_empty())
    })
    .await;
    let apps = state["apps"].as_array().unwrap();
    assert!(apps.iter().any(|a| a["pid"] == json!(pid) && a["isRunning"] == json!(true)));

    let stats = kernel.stats();
    assert_eq!(stats.kernel_calls, 1);
    // The reply is routed, the call itself never is
    assert_eq!(stats.routed, 0);
}

#[tokio::test]
async fn test_upload_through_developer_center() {
    let harness = Harness::new();
    let kernel = harness.boot().await.unwrap();
    let pid = system_pid(DEVELOPER_ID);
    kernel.start(&pid, None).await.unwrap();

    let args = json!({
        "name": "Notes",
        "content": COUNTER_VIEW,
        "logic": COUNTER_LOGIC,
        "metaInfo": { "authorId": "dev", "seed": "abc" }
    });
    kernel.dispatch(&pid, call("UPLOAD_RESOURCE", args)).await.unwrap();

    let state = wait_for_state(&kernel, &pid, |s| s["message"].is_string()).await;
    assert_eq!(state["message"], json!("installed app-dev-abc"));
    assert!(kernel.get_resource("app-dev-abc").await.unwrap().is_some());
    pid_of(&kernel, "app-dev-abc").await;
}

#[tokio::test]
async fn test_user_apps_cannot_make_privileged_calls() {
    let harness = Harness::new();
    let kernel = harness.boot().await.unwrap();
    let pid = install_counter(&kernel, "Notes").await;
    kernel.start(&pid, None).await.unwrap();

    let warnings = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&warnings);
    let _subscription = kernel.subscribe(&pid, move |event| {
        if let ProcessEvent::Warning(message) = event {
            sink.lock().push(message.clone());
        }
    });

    let apps_before = kernel.list_apps().await.unwrap().len();
    let args = json!({
        "name": "Sneaky",
        "content": COUNTER_VIEW,
        "metaInfo": { "seed": "s" }
    });
    kernel.dispatch(&pid, call("UPLOAD_RESOURCE", args)).await.unwrap();

    assert_eq!(warnings.lock().len(), 1);
    assert!(warnings.lock()[0].contains("UPLOAD_RESOURCE"));
    assert_eq!(kernel.list_apps().await.unwrap().len(), apps_before);
}

#[tokio::test]
async fn test_evoke_starts_target_with_tagged_payload() {
    let harness = Harness::new();
    let kernel = harness.boot().await.unwrap();
    let from = install_counter(&kernel, "Notes").await;
    kernel.start(&from, None).await.unwrap();
    let target = system_pid(NOTEBOOK_ID);

    let args = json!({ "pid": target, "interactInfo": { "openType": "wr", "fileId": "f-1" } });
    kernel.dispatch(&from, call("EVOKE_APP", args)).await.unwrap();

    let state = wait_for_state(&kernel, &target, |s| s["fileId"] == json!("f-1")).await;
    assert_eq!(state["openType"], json!("wr"));
    assert_eq!(kernel.stats().contexts_spawned, 2);
}

#[tokio::test]
async fn test_evoke_unknown_target() {
    let harness = Harness::new();
    let kernel = harness.boot().await.unwrap();
    let err = kernel
        .evoke("missing", &system_pid(START_ID), json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, KernelError::NotFound(_)));
}

#[tokio::test]
async fn test_dispatch_to_installed_app_is_not_running() {
    let harness = Harness::new();
    let kernel = harness.boot().await.unwrap();
    let pid = install_counter(&kernel, "Notes").await;
    assert!(matches!(
        kernel.dispatch(&pid, json!({"type": "INC"})).await,
        Err(KernelError::NotRunning(_))
    ));
}

#[tokio::test]
async fn test_blocked_fetch_surfaces_warning() {
    let harness = Harness::new();
    let kernel = harness.boot().await.unwrap();
    let logic = r#"
        let initialState = { n: 1 };
        fn reducer(state, action) {
            if (action.type == "PING") { fetch("https://example.com"); }
            return state;
        }
    "#;
    let id = kernel.upload_resource(upload("Pinger", "p1", logic)).await.unwrap();
    let pid = pid_of(&kernel, &id).await;

    let warnings = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&warnings);
    let _subscription = kernel.subscribe(&pid, move |event| {
        if let ProcessEvent::Warning(message) = event {
            sink.lock().push(message.clone());
        }
    });

    kernel.start(&pid, None).await.unwrap();
    wait_for_state(&kernel, &pid, |s| s["n"] == json!(1)).await;
    kernel.dispatch(&pid, json!({"type": "PING"})).await.unwrap();
    settle().await;

    assert_eq!(warnings.lock().len(), 1);
    assert_eq!(kernel.stats().security_violations, 1);
    // The context survives the violation
    assert_eq!(kernel.stats().live_contexts, 1);
    assert!(harness.transport.requests().is_empty());
}

#[tokio::test]
async fn test_upload_without_seed_is_invalid() {
    let harness = Harness::new();
    let kernel = harness.boot().await.unwrap();
    let mut request = upload("Notes", "x", COUNTER_LOGIC);
    request.meta_info.seed = None;
    assert!(matches!(
        kernel.upload_resource(request).await,
        Err(KernelError::InvalidResource(_))
    ));
}

#[tokio::test]
async fn test_mounted_view_renders_state_and_fetches_with_identity() {
    let harness = Harness::new();
    let kernel = harness.boot().await.unwrap();
    let view = r#"
        export default fn(props) {
            let res = sdk.API.fetch("https://example.com/data");
            return h("p", { ok: res.ok }, props.state.count);
        };
        export let styles = ".title { color: red; }";
    "#;
    let mut request = upload("Viewer", "v1", COUNTER_LOGIC);
    request.content = desk_kernel::ResourceContent::Single(view.to_string());
    let id = kernel.upload_resource(request).await.unwrap();
    let pid = pid_of(&kernel, &id).await;

    let host = kernel.mount_view(&pid).await.unwrap();
    assert!(host.styles().contains(&format!("#proc-{} .title", pid)));

    let tree = host
        .render(&json!({"count": 7}), kernel.dispatcher(&pid))
        .unwrap();
    assert_eq!(tree["props"]["id"], json!(format!("proc-{}", pid)));
    assert_eq!(tree["children"][0]["tag"], json!("p"));
    assert_eq!(tree["children"][0]["props"]["ok"], json!(true));

    let requests = harness.transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].headers.get(desk_kernel::sandbox::transport::PROCESS_ID_HEADER),
        Some(&pid)
    );
}
