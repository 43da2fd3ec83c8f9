/*!
 * View Host
 * Mounts an app's view modules and renders state into a node tree
 */

use super::capability::DispatchFn;
use super::engine::{Engine, LoadedModule};
use super::types::{Cancellation, RuntimeResult};
use super::value::Value;
use crate::catalog::{Resource, ResourceContent};
use crate::core::errors::LaunchError;
use serde_json::Value as Json;
use std::collections::BTreeMap;
use tracing::debug;

pub const MAIN_MODULE: &str = "main";
pub const LAYOUT_MODULE: &str = "layout";
pub const DEFAULT_ROUTE: &str = "home";

/// Id of the element wrapping a pid's view
pub fn root_id(pid: &str) -> String {
    format!("proc-{}", pid)
}

/// Prefix every selector in `css` with `#proc-<pid>`
///
/// At-rule preludes are left alone; their nested selectors are scoped.
pub fn scope_css(css: &str, pid: &str) -> String {
    let prefix = format!("#{}", root_id(pid));
    let mut out = String::with_capacity(css.len() + 32);
    let mut segment = String::new();

    for ch in css.chars() {
        match ch {
            '{' => {
                out.push_str(&scope_selectors(&segment, &prefix));
                out.push('{');
                segment.clear();
            }
            '}' | ';' => {
                out.push_str(&segment);
                out.push(ch);
                segment.clear();
            }
            _ => segment.push(ch),
        }
    }
    out.push_str(&segment);
    out
}

fn scope_selectors(prelude: &str, prefix: &str) -> String {
    if prelude.trim_start().starts_with('@') {
        return prelude.to_string();
    }
    prelude
        .split(',')
        .map(|selector| {
            let trimmed = selector.trim_start();
            if trimmed.trim().is_empty() {
                return selector.to_string();
            }
            let lead = &selector[..selector.len() - trimmed.len()];
            format!("{}{} {}", lead, prefix, trimmed)
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// One mounted view for one pid
pub struct ViewHost {
    pid: String,
    is_bundle: bool,
    capabilities: Value,
    root: LoadedModule,
    pages: BTreeMap<String, LoadedModule>,
    styles: String,
}

impl ViewHost {
    /// Compile and load the resource's view modules
    ///
    /// Single-unit resources render `main`; bundles render `layout` with the
    /// routed page passed in as `PageComponent`.
    pub fn mount(
        engine: &Engine,
        resource: &Resource,
        pid: &str,
        capabilities: Value,
    ) -> Result<Self, LaunchError> {
        Self::mount_cancellable(engine, resource, pid, capabilities, Cancellation::new())
    }

    /// [`ViewHost::mount`] whose module code, including later renders, stops once `cancel` is set
    pub fn mount_cancellable(
        engine: &Engine,
        resource: &Resource,
        pid: &str,
        capabilities: Value,
        cancel: Cancellation,
    ) -> Result<Self, LaunchError> {
        let load = |name: &str, source: &str| -> Result<LoadedModule, LaunchError> {
            let factory = engine.compile(source)?;
            factory
                .load_cancellable(&capabilities, cancel.clone())
                .map_err(|e| LaunchError::Load(format!("{}: {}", name, e)))
        };

        let root_name = if resource.content.is_bundle() {
            LAYOUT_MODULE
        } else {
            MAIN_MODULE
        };
        let root_source = resource.content.module(root_name).ok_or_else(|| {
            LaunchError::Load(format!("{} has no {} module", resource.id, root_name))
        })?;
        let root = load(root_name, root_source)?;
        if !root.export("default").is_callable() {
            return Err(LaunchError::Load(format!(
                "{} module has no default export",
                root_name
            )));
        }

        let mut pages = BTreeMap::new();
        if let ResourceContent::Bundle(units) = &resource.content {
            for (name, source) in units.iter().filter(|(name, _)| *name != LAYOUT_MODULE) {
                pages.insert(name.clone(), load(name, source)?);
            }
        }

        let css: Vec<String> = std::iter::once(&root)
            .chain(pages.values())
            .filter_map(|module| module.export("styles").as_str().map(str::to_string))
            .collect();
        let styles = scope_css(&css.join("\n"), pid);

        debug!(pid = %pid, resource_id = %resource.id, pages = pages.len(), "View mounted");
        Ok(Self {
            pid: pid.to_string(),
            is_bundle: resource.content.is_bundle(),
            capabilities,
            root,
            pages,
            styles,
        })
    }

    pub fn pid(&self) -> &str {
        &self.pid
    }

    /// Scoped stylesheet of every mounted module
    pub fn styles(&self) -> &str {
        &self.styles
    }

    fn page_component(&self, state: &Json) -> Value {
        let path = state
            .pointer("/router/path")
            .and_then(Json::as_str)
            .unwrap_or(DEFAULT_ROUTE)
            .to_string();
        match self.pages.get(&path) {
            Some(page) => page.export("default"),
            None => Value::native("NotFound", move |_, _| {
                Ok(Value::object_from([
                    ("tag", Value::str("div")),
                    ("props", Value::empty_object()),
                    (
                        "children",
                        Value::array(vec![Value::str(format!("404: {}", path))]),
                    ),
                ]))
            }),
        }
    }

    /// Render `state` into a JSON node tree rooted at `#proc-<pid>`
    pub fn render(&self, state: &Json, dispatch: DispatchFn) -> RuntimeResult<Json> {
        let interp = self.root.interpreter();
        let ui = self.capabilities.field("UI");
        interp.call(&ui.field("__begin_render"), Vec::new())?;

        let dispatch = Value::native("dispatch", move |_, args| {
            dispatch(args.first().map(Value::to_json).unwrap_or(Json::Null));
            Ok(Value::Null)
        });
        let mut props = BTreeMap::new();
        props.insert("state".to_string(), Value::from_json(state));
        props.insert("pid".to_string(), Value::str(&self.pid));
        props.insert("dispatch".to_string(), dispatch);
        props.insert(
            "navigate".to_string(),
            self.capabilities.field("API").field("navigate"),
        );
        if self.is_bundle {
            props.insert("PageComponent".to_string(), self.page_component(state));
        }

        let tree = interp.call(&self.root.export("default"), vec![Value::object(props)])?;
        interp.call(&ui.field("__flush_effects"), Vec::new())?;

        Ok(serde_json::json!({
            "tag": "div",
            "props": { "id": root_id(&self.pid) },
            "children": [tree.to_json()],
        }))
    }
}
