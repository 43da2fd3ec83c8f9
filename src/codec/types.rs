/*!
 * Codec Types
 * Launcher artifact header and decoded fields
 */

use crate::catalog::{MetaInfo, Resource, ResourceContent};
use crate::core::serde::is_none;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Assignment carrying the configuration header
pub const HEADER_DECL: &str = "const SYS_CONFIG";
/// Assignment carrying free-form metadata
pub const META_DECL: &str = "const APP_METAINFO";
/// Assignment carrying the frozen content payload
pub const PAYLOAD_DECL: &str = "const ORIGIN_COMPONENT";
/// Comment anchor that closes the payload: `;//resourceId:<id>;`
pub const ANCHOR_PREFIX: &str = ";//resourceId:";
/// Start of the reducer logic section
pub const LOGIC_MARKER: &str = "/* app logic */";
/// Reducer used when an artifact carries no logic section
pub const NOOP_LOGIC: &str = "let initialState = {}; fn reducer(s) { return s; }";

/// Codec result type
pub type DecodeResult<T> = Result<T, DecodeError>;

#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DecodeError {
    #[error("Configuration header missing or unparsable: {0}")]
    MissingHeader(String),
}

/// Machine-parsable configuration header
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactHeader {
    pub resource_id: String,
    #[serde(default, skip_serializing_if = "is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub is_bundle: bool,
    /// Exact byte length of the payload literal
    #[serde(default, skip_serializing_if = "is_none")]
    pub payload_bytes: Option<usize>,
}

impl ArtifactHeader {
    /// Anchor that must directly follow the payload
    pub fn anchor(&self) -> String {
        format!("{}{};", ANCHOR_PREFIX, self.resource_id)
    }
}

/// Which strategy located the payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadLocation {
    /// `payloadBytes` matched the anchor
    Exact,
    /// Scan for the id-specific anchor
    Anchored,
    /// Scan for any anchor
    BestEffort,
    Missing,
}

/// Fields recovered from a launcher artifact
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedArtifact {
    pub header: ArtifactHeader,
    pub meta_info: Option<MetaInfo>,
    pub content: Option<ResourceContent>,
    pub logic: Option<String>,
    pub location: PayloadLocation,
}

impl DecodedArtifact {
    pub fn resource_id(&self) -> &str {
        &self.header.resource_id
    }

    /// Rebuild a catalog resource; `None` when the header carries no name
    pub fn into_resource(self) -> Option<Resource> {
        let name = self.header.name.filter(|n| !n.is_empty())?;
        Some(Resource {
            id: self.header.resource_id,
            name,
            is_bundle: self.header.is_bundle,
            content: self.content.unwrap_or_default(),
            logic: self.logic,
            meta_info: self.meta_info.unwrap_or_default(),
        })
    }
}
