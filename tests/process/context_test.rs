/*!
 * Execution Context Tests
 * Spawned contexts, message ordering and lease ownership
 */

use desk_kernel::catalog::{Resource, ResourceContent};
use desk_kernel::encode;
use desk_kernel::process::{ContextEvent, ContextMessage, ExecutionContext, LeaseTable};
use desk_kernel::sandbox::Engine;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const COUNTER: &str = r#"
let initialState = { count: 0 };
fn reducer(state, action) {
    if (action.type == "INC") { return { ...state, count: state.count + 1 }; }
    if (action.by) { return { ...state, count: state.count + action.by }; }
    return state;
}
"#;

fn artifact(name: &str) -> String {
    artifact_with(name, COUNTER)
}

fn artifact_with(name: &str, logic: &str) -> String {
    encode(&Resource {
        id: format!("app-{}", name),
        name: name.into(),
        is_bundle: false,
        content: ResourceContent::Single("export default fn() { return null; };".into()),
        logic: Some(logic.into()),
        meta_info: Default::default(),
    })
}

#[tokio::test]
async fn test_messages_are_handled_in_order() {
    let leases = Arc::new(LeaseTable::new());
    let lease = leases.lease(artifact("Counter"));
    let (mut ctx, mut events) =
        ExecutionContext::spawn("p1", lease, Arc::clone(&leases), Arc::new(Engine::new())).unwrap();

    assert!(ctx.send(ContextMessage::Init));
    assert!(ctx.send(ContextMessage::UiAction(json!({"type": "INC"}))));
    assert!(ctx.send(ContextMessage::AppInteract(json!({"by": 5}))));
    assert!(ctx.send(ContextMessage::SaveState));
    ctx.close();
    assert!(!ctx.send(ContextMessage::SaveState));

    let mut saves = Vec::new();
    while let Some(event) = events.recv().await {
        if let ContextEvent::SaveState(state) = event {
            saves.push(state);
        }
    }
    assert_eq!(
        saves,
        vec![json!({"count": 1}), json!({"count": 6}), json!({"count": 6})]
    );
    assert_eq!(leases.len(), 1);
}

#[tokio::test]
async fn test_contexts_hold_separate_leases() {
    let leases = Arc::new(LeaseTable::new());
    let engine = Arc::new(Engine::new());
    let (a, _a_events) = ExecutionContext::spawn(
        "a",
        leases.lease(artifact("A")),
        Arc::clone(&leases),
        Arc::clone(&engine),
    )
    .unwrap();
    let (b, mut b_events) = ExecutionContext::spawn(
        "b",
        leases.lease(artifact("B")),
        Arc::clone(&leases),
        Arc::clone(&engine),
    )
    .unwrap();
    assert_ne!(a.lease().key(), b.lease().key());
    assert_eq!(leases.len(), 2);

    a.terminate();
    assert_eq!(leases.len(), 1);

    assert!(b.send(ContextMessage::Init));
    assert_eq!(b_events.recv().await, Some(ContextEvent::Ready));
    match b_events.recv().await {
        Some(ContextEvent::StateUpdate(state)) => {
            assert_eq!(state["config"]["name"], json!("B"));
        }
        other => panic!("unexpected event: {:?}", other),
    }
    // Same logic source compiles once for both contexts
    assert_eq!(engine.stats().compilations, 1);
}

#[tokio::test]
async fn test_terminate_frees_a_spinning_reducer() {
    let logic = r#"
let initialState = {};
fn spin(n) { if (n > 0) { spin(n - 1); spin(n - 1); } }
fn reducer(state, action) { spin(60); return state; }
"#;
    let leases = Arc::new(LeaseTable::new());
    let lease = leases.lease(artifact_with("Spinner", logic));
    let (ctx, mut events) =
        ExecutionContext::spawn("p1", lease, Arc::clone(&leases), Arc::new(Engine::new())).unwrap();

    assert!(ctx.send(ContextMessage::Init));
    assert!(ctx.send(ContextMessage::UiAction(json!({"type": "GO"}))));
    assert_eq!(events.recv().await, Some(ContextEvent::Ready));
    assert!(matches!(events.recv().await, Some(ContextEvent::StateUpdate(_))));

    tokio::time::sleep(Duration::from_millis(50)).await;
    ctx.terminate();

    // The thread drops its event sender once it leaves the reducer
    let drained = tokio::time::timeout(Duration::from_secs(5), async {
        while events.recv().await.is_some() {}
    })
    .await;
    assert!(drained.is_ok(), "context thread still running after terminate");
    assert!(leases.is_empty());
}

#[tokio::test]
async fn test_terminate_during_a_spinning_top_level() {
    let logic = "fn spin(n) { if (n > 0) { spin(n - 1); spin(n - 1); } } spin(60);";
    let leases = Arc::new(LeaseTable::new());
    let lease = leases.lease(artifact_with("Loader", logic));
    let (ctx, mut events) =
        ExecutionContext::spawn("p1", lease, Arc::clone(&leases), Arc::new(Engine::new())).unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    ctx.terminate();

    let first = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("load never gave up");
    assert!(matches!(first, Some(ContextEvent::LoadFailed(_))));
}
