/*!
 * Catalog Types
 * Installable application definitions
 */

use crate::core::serde::{is_empty_map, is_none};
use crate::core::{KernelError, KernelResult, ResourceId, WindowSize};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Source text of a resource: one unit, or named units for bundles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResourceContent {
    Single(String),
    Bundle(BTreeMap<String, String>),
}

impl ResourceContent {
    /// Source of a named module; single-unit content answers to every name
    pub fn module(&self, name: &str) -> Option<&str> {
        match self {
            ResourceContent::Single(src) => Some(src),
            ResourceContent::Bundle(units) => units.get(name).map(String::as_str),
        }
    }

    pub fn is_bundle(&self) -> bool {
        matches!(self, ResourceContent::Bundle(_))
    }
}

impl Default for ResourceContent {
    fn default() -> Self {
        ResourceContent::Single(String::new())
    }
}

/// Descriptive metadata carried alongside a resource
///
/// Unknown keys survive a store round trip through `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaInfo {
    #[serde(default, skip_serializing_if = "is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "is_none")]
    pub author_id: Option<String>,
    #[serde(default, skip_serializing_if = "is_none")]
    pub author_name: Option<String>,
    #[serde(default, skip_serializing_if = "is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "is_none")]
    pub initial_size: Option<WindowSize>,
    #[serde(default, skip_serializing_if = "is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "is_none")]
    pub app_type: Option<String>,
    #[serde(default, skip_serializing_if = "is_none")]
    pub expose_state: Option<bool>,
    /// Per-user flags such as `hasShortcut` or `blockEd`
    #[serde(default, skip_serializing_if = "is_empty_map")]
    pub custom: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MetaInfo {
    pub fn custom_flag(&self, key: &str) -> bool {
        self.custom.get(key).and_then(Value::as_bool).unwrap_or(false)
    }
}

/// A stored application definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub id: ResourceId,
    pub name: String,
    #[serde(default)]
    pub is_bundle: bool,
    #[serde(default)]
    pub content: ResourceContent,
    /// Reducer source defining `initialState`, `reducer` and optionally `init`
    #[serde(default)]
    pub logic: Option<String>,
    #[serde(default)]
    pub meta_info: MetaInfo,
}

/// Metadata accepted with an upload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadMeta {
    #[serde(default)]
    pub author_id: Option<String>,
    #[serde(default)]
    pub author_name: Option<String>,
    /// Random seed making the resource id unique per author
    #[serde(default)]
    pub seed: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub initial_size: Option<WindowSize>,
    #[serde(default)]
    pub custom: Map<String, Value>,
}

/// Descriptor handed to `upload_resource`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    pub name: String,
    #[serde(default)]
    pub is_bundle: bool,
    pub content: ResourceContent,
    #[serde(default)]
    pub logic: Option<String>,
    #[serde(default)]
    pub meta_info: UploadMeta,
}

impl UploadRequest {
    /// Resource id derived from author and seed
    pub fn resource_id(&self) -> KernelResult<ResourceId> {
        let seed = self
            .meta_info
            .seed
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| KernelError::InvalidResource("missing id seed".into()))?;
        let author = self.meta_info.author_id.as_deref().unwrap_or("anonymous");
        Ok(format!("app-{}-{}", author, seed))
    }

    /// Build the catalog resource, stamping creation time and clamping size
    pub fn into_resource(self, min_size: WindowSize) -> KernelResult<Resource> {
        if self.name.trim().is_empty() {
            return Err(KernelError::InvalidResource("empty name".into()));
        }
        let id = self.resource_id()?;
        let created_at = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .map_err(|e| KernelError::InvalidResource(e.to_string()))?;
        let initial_size = self
            .meta_info
            .initial_size
            .unwrap_or(min_size)
            .clamp_min(min_size);

        Ok(Resource {
            id,
            name: self.name,
            is_bundle: self.is_bundle,
            content: self.content,
            logic: self.logic,
            meta_info: MetaInfo {
                author_id: self.meta_info.author_id,
                author_name: self.meta_info.author_name,
                created_at: Some(created_at),
                icon: self.meta_info.icon,
                initial_size: Some(initial_size),
                custom: self.meta_info.custom,
                ..MetaInfo::default()
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn request(seed: Option<&str>) -> UploadRequest {
        UploadRequest {
            name: "Notes".into(),
            is_bundle: false,
            content: ResourceContent::Single("export default 1;".into()),
            logic: None,
            meta_info: UploadMeta {
                author_id: Some("u7".into()),
                seed: seed.map(str::to_string),
                initial_size: Some(WindowSize::new(200.0, 800.0)),
                ..UploadMeta::default()
            },
        }
    }

    #[test]
    fn test_upload_derives_id_and_clamps_size() {
        let res = request(Some("x1")).into_resource(WindowSize::default()).unwrap();
        assert_eq!(res.id, "app-u7-x1");
        assert_eq!(res.meta_info.initial_size, Some(WindowSize::new(500.0, 800.0)));
        assert!(res.meta_info.created_at.is_some());
    }

    #[test]
    fn test_upload_without_seed_is_rejected() {
        let err = request(None).into_resource(WindowSize::default()).unwrap_err();
        assert!(matches!(err, KernelError::InvalidResource(_)));
    }

    #[test]
    fn test_content_shapes() {
        let single: ResourceContent = serde_json::from_value(json!("src")).unwrap();
        assert_eq!(single, ResourceContent::Single("src".into()));

        let bundle: ResourceContent =
            serde_json::from_value(json!({"layout": "a", "home": "b"})).unwrap();
        assert_eq!(bundle.module("home"), Some("b"));
        assert_eq!(bundle.module("about"), None);
    }

    #[test]
    fn test_meta_info_keeps_unknown_keys() {
        let meta: MetaInfo = serde_json::from_value(json!({
            "appType": "editor",
            "custom": {"blockEd": true},
            "theme": "dark"
        }))
        .unwrap();
        assert!(meta.custom_flag("blockEd"));
        assert_eq!(meta.extra.get("theme"), Some(&json!("dark")));
        assert_eq!(serde_json::to_value(&meta).unwrap()["theme"], json!("dark"));
    }
}
