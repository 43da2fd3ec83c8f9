/*!
 * View Host Tests
 * Mounting, routing and effects of compiled views
 */

use desk_kernel::catalog::{system_resources, Resource, ResourceContent};
use desk_kernel::sandbox::{create_capability_scope, DispatchFn, Engine, RecordingTransport, ViewHost};
use desk_kernel::LaunchError;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

const LAYOUT: &str = r#"
export default fn(props) {
    return h("main", null, h(props.PageComponent, { state: props.state }));
};
export let styles = "main { padding: 0; }";
"#;

const HOME: &str = r#"
export default fn(props) {
    let clicks = use_state(0);
    use_effect(fn() { clicks[1](clicks[0] + 1); }, []);
    return h("p", { clicks: clicks[0] }, "home");
};
"#;

fn single(id: &str, view: &str) -> Resource {
    Resource {
        id: id.into(),
        name: id.into(),
        is_bundle: false,
        content: ResourceContent::Single(view.into()),
        logic: None,
        meta_info: Default::default(),
    }
}

fn bundle() -> Resource {
    Resource {
        id: "app-bundle".into(),
        name: "Bundle".into(),
        is_bundle: true,
        content: ResourceContent::Bundle(BTreeMap::from([
            ("layout".to_string(), LAYOUT.to_string()),
            ("home".to_string(), HOME.to_string()),
        ])),
        logic: None,
        meta_info: Default::default(),
    }
}

fn collecting() -> (DispatchFn, Arc<Mutex<Vec<Value>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    (Arc::new(move |action| sink.lock().push(action)), seen)
}

fn mount(
    engine: &Engine,
    resource: &Resource,
    pid: &str,
    privileged: bool,
) -> Result<(ViewHost, DispatchFn, Arc<Mutex<Vec<Value>>>), LaunchError> {
    let (dispatch, seen) = collecting();
    let caps = create_capability_scope(
        Arc::clone(&dispatch),
        pid,
        privileged,
        Arc::new(RecordingTransport::new()),
    );
    let host = ViewHost::mount(engine, resource, pid, caps)?;
    Ok((host, dispatch, seen))
}

#[test]
fn test_bundle_routes_to_page_and_runs_effects() {
    let (host, dispatch, _) = mount(&Engine::new(), &bundle(), "p1", false).unwrap();
    assert_eq!(host.styles(), "#proc-p1 main { padding: 0; }");

    let state = json!({"router": {"path": "home"}});
    let tree = host.render(&state, Arc::clone(&dispatch)).unwrap();
    let main = &tree["children"][0];
    assert_eq!(main["tag"], json!("main"));
    assert_eq!(main["children"][0]["tag"], json!("p"));
    assert_eq!(main["children"][0]["props"]["clicks"], json!(0));

    // The mount effect bumped the hook slot after the first render
    let tree = host.render(&state, dispatch).unwrap();
    assert_eq!(tree["children"][0]["children"][0]["props"]["clicks"], json!(1));
}

#[test]
fn test_unknown_route_renders_not_found() {
    let (host, dispatch, _) = mount(&Engine::new(), &bundle(), "p1", false).unwrap();
    let tree = host
        .render(&json!({"router": {"path": "about"}}), dispatch)
        .unwrap();
    assert_eq!(
        tree["children"][0]["children"][0]["children"],
        json!(["404: about"])
    );
}

#[test]
fn test_view_dispatch_and_navigate_reach_sink() {
    let view = r#"export default fn(props) { props.dispatch({ type: "INC" }); props.navigate("x"); return null; };"#;
    let (host, dispatch, seen) = mount(&Engine::new(), &single("app-d", view), "p2", false).unwrap();

    host.render(&json!({}), dispatch).unwrap();
    assert_eq!(
        *seen.lock(),
        vec![json!({"type": "INC"}), json!({"type": "NAVIGATE", "payload": "x"})]
    );
}

#[test]
fn test_missing_default_export_fails_mount() {
    let result = mount(&Engine::new(), &single("app-e", "let x = 1;"), "p3", false);
    assert!(matches!(result, Err(LaunchError::Load(_))));
}

#[test]
fn test_window_fetch_is_a_security_violation() {
    let view = r#"export default fn(props) { return window.fetch("http://example.com"); };"#;
    let (host, dispatch, _) = mount(&Engine::new(), &single("app-f", view), "p4", false).unwrap();
    let err = host.render(&json!({}), dispatch).unwrap_err();
    assert!(err.is_security_violation(), "unexpected error: {}", err);
}

#[test]
fn test_remounts_share_compiled_modules() {
    let engine = Engine::new();
    let resource = bundle();
    mount(&engine, &resource, "a", false).unwrap();
    mount(&engine, &resource, "b", false).unwrap();

    let stats = engine.stats();
    assert_eq!(stats.compilations, 2);
    assert!(stats.cache_hits >= 2);
}

#[test]
fn test_presets_mount_with_privileges() {
    let engine = Engine::new();
    for preset in system_resources() {
        let (host, dispatch, _) = mount(&engine, &preset, "sys", true)
            .unwrap_or_else(|e| panic!("{} failed to mount: {}", preset.id, e));
        let state = json!({"apps": [], "message": null, "fileId": null});
        assert!(host.render(&state, dispatch).is_ok(), "{} failed to render", preset.id);
    }
}
