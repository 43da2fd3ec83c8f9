/*!
 * Artifact Encoder
 */

use super::types::*;
use crate::catalog::Resource;
use serde_json::json;

/// Serialize a resource into launcher artifact text
///
/// Layout, one assignment per line:
/// header, metadata, payload plus anchor, then the logic marker and the
/// reducer source verbatim.
pub fn encode(resource: &Resource) -> String {
    let payload = serde_json::to_string(&resource.content).unwrap_or_else(|_| "null".into());
    let header = json!({
        "resourceId": resource.id,
        "name": resource.name,
        "isBundle": resource.is_bundle,
        "payloadBytes": payload.len(),
    });
    let meta = serde_json::to_string(&resource.meta_info).unwrap_or_else(|_| "{}".into());
    let logic = resource.logic.as_deref().unwrap_or("");

    let mut out = String::with_capacity(payload.len() + logic.len() + meta.len() + 256);
    out.push_str(&format!("{} = {};\n", HEADER_DECL, header));
    out.push_str(&format!("{} = {};\n", META_DECL, meta));
    out.push_str(&format!(
        "{} = {}{}{};\n",
        PAYLOAD_DECL, payload, ANCHOR_PREFIX, resource.id
    ));
    out.push_str(LOGIC_MARKER);
    out.push('\n');
    out.push_str(logic);
    out.push('\n');
    out
}
