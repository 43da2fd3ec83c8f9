/*!
 * Built-in Resources
 * System applications seeded into the catalog at every boot
 */

use super::types::{MetaInfo, Resource, ResourceContent};
use serde_json::{json, Map, Value};

pub const START_ID: &str = "sys-start-demo";
pub const DEVELOPER_ID: &str = "sys-developer-demo";
pub const FILE_MANAGER_ID: &str = "sys-fileSystem-demo";
pub const NOTEBOOK_ID: &str = "sys-notebook-demo";

const START_VIEW: &str = r#"
export default fn(props) {
  let Start = sdk.Components.Start;
  use_effect(fn() {
    props.dispatch({ type: "KERNEL_CALL", payload: { method: "LIST_APPS", args: {} } });
  }, []);
  return h("div", { style: { height: "100%", width: "100%", display: "flex", flexDirection: "column" } },
    h(Start, { apps: props.state.apps }));
};
"#;

const START_LOGIC: &str = r#"
let initialState = { apps: [], message: null };

fn reducer(state, action) {
  if (action.type == "APPS") {
    return { ...state, apps: action.payload };
  }
  if (action.type == "MSG") {
    return { ...state, message: action.payload };
  }
  return state;
}
"#;

const DEVELOPER_VIEW: &str = r#"
export default fn(props) {
  let Developer = sdk.Components.Developer;
  return h("div", { style: { height: "100%", width: "100%", display: "flex", flexDirection: "column" } },
    h(Developer, { message: props.state.message, dispatch: props.dispatch, seed: sdk.API.root_seed }));
};
"#;

const DEVELOPER_LOGIC: &str = r#"
let initialState = { message: null };

fn reducer(state, action) {
  if (action.type == "MSG") {
    return { ...state, message: action.payload };
  }
  return state;
}
"#;

const FILE_MANAGER_VIEW: &str = r#"
export default fn(props) {
  let FileSystem = sdk.Components.FileSystem;
  return h("div", { style: { height: "100%", width: "100%", display: "flex", flexDirection: "column" } },
    h(FileSystem, { open: sdk.API.open_directory }));
};
"#;

const NOTEBOOK_VIEW: &str = r#"
export default fn(props) {
  let NoteBook = sdk.Components.NoteBook;
  return h("div", { style: { height: "100%", width: "100%", display: "flex", flexDirection: "column" } },
    h(NoteBook, { state: props.state }));
};
"#;

const NOTEBOOK_LOGIC: &str = r#"
let initialState = {
  fileId: null,
  openType: "r",
  router: { path: "home" }
};

// Interactions from other apps carry { openType, fileId, from }
fn reducer(state, action) {
  if (action.type == "NAVIGATE") {
    return { ...state, router: { ...state.router, path: action.payload } };
  }
  if (action.openType == "wr" || action.openType == "r") {
    return {
      ...state,
      fileId: action.fileId,
      openType: action.openType,
      router: { ...state.router, path: "home" }
    };
  }
  return state;
}
"#;

fn meta(app_type: &str, expose_state: bool, custom: Value) -> MetaInfo {
    let custom = match custom {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    MetaInfo {
        version: Some("v1".into()),
        icon: Some("/logo.jpg".into()),
        app_type: Some(app_type.into()),
        expose_state: Some(expose_state),
        custom,
        ..MetaInfo::default()
    }
}

fn preset(id: &str, name: &str, view: &str, logic: Option<&str>, meta_info: MetaInfo) -> Resource {
    Resource {
        id: id.into(),
        name: name.into(),
        is_bundle: false,
        content: ResourceContent::Single(view.trim().to_string()),
        logic: logic.map(|l| l.trim().to_string()),
        meta_info,
    }
}

/// The built-in system applications
pub fn system_resources() -> Vec<Resource> {
    vec![
        preset(
            DEVELOPER_ID,
            "Developer Center",
            DEVELOPER_VIEW,
            Some(DEVELOPER_LOGIC),
            meta("system", false, json!({"hasShortcut": true})),
        ),
        preset(
            FILE_MANAGER_ID,
            "File Manager",
            FILE_MANAGER_VIEW,
            None,
            meta("system", false, json!({"hasShortcut": true})),
        ),
        preset(
            NOTEBOOK_ID,
            "Notebook",
            NOTEBOOK_VIEW,
            Some(NOTEBOOK_LOGIC),
            meta("editor", true, json!({"hasShortcut": true})),
        ),
        preset(
            START_ID,
            "Start",
            START_VIEW,
            Some(START_LOGIC),
            meta("system", false, json!({"hasShortcut": false, "blockEd": true})),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::Engine;

    #[test]
    fn test_presets_compile() {
        let engine = Engine::new();
        for res in system_resources() {
            if let Some(src) = res.content.module("main") {
                assert!(engine.compile(src).is_ok(), "view of {} failed", res.id);
            }
            if let Some(logic) = &res.logic {
                assert!(engine.compile(logic).is_ok(), "logic of {} failed", res.id);
            }
        }
    }

    #[test]
    fn test_start_is_blocked_from_shortcuts() {
        let start = system_resources()
            .into_iter()
            .find(|r| r.id == START_ID)
            .unwrap();
        assert!(start.meta_info.custom_flag("blockEd"));
    }
}
