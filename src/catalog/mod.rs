/*!
 * Resource Catalog Module
 * Application definitions and built-in presets
 */

#[allow(clippy::module_inception)]
pub mod catalog;
pub mod presets;
pub mod types;

// Re-exports
pub use catalog::Catalog;
pub use presets::system_resources;
pub use types::{MetaInfo, Resource, ResourceContent, UploadMeta, UploadRequest};
