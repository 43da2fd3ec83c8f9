/*!
 * Kernel Configuration
 * Defaults, environment overrides, and fixed store layouts
 */

use super::types::{WindowRect, WindowSize};
use crate::store::{IndexSpec, StoreConfig};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Supervisor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct KernelConfig {
    /// Directory holding the durable stores
    pub data_dir: PathBuf,
    /// Directory holding launcher artifacts of user apps
    pub apps_dir: PathBuf,
    pub artifact_prefix: String,
    pub artifact_extension: String,
    /// Adopt well-formed artifacts whose resource is unknown to the catalog
    pub auto_register_unknown: bool,
    /// Write missing artifacts for catalog resources at boot
    pub materialize_on_boot: bool,
    pub default_window: WindowRect,
    pub min_window_size: WindowSize,
    pub trace_json: bool,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("/tmp/desk-kernel/data"),
            apps_dir: PathBuf::from("/tmp/desk-kernel/apps"),
            artifact_prefix: "uuid-".to_string(),
            artifact_extension: ".launcher".to_string(),
            auto_register_unknown: true,
            materialize_on_boot: true,
            default_window: WindowRect::default(),
            min_window_size: WindowSize::default(),
            trace_json: false,
        }
    }
}

impl KernelConfig {
    /// Build a configuration from `KERNEL_*` environment variables
    ///
    /// Environment variables:
    /// - KERNEL_DATA_DIR: store directory
    /// - KERNEL_APPS_DIR: launcher artifact directory
    /// - KERNEL_AUTO_REGISTER: adopt unknown artifacts (default: true)
    /// - KERNEL_TRACE_JSON: JSON log output (default: false)
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(dir) = std::env::var("KERNEL_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("KERNEL_APPS_DIR") {
            config.apps_dir = PathBuf::from(dir);
        }
        if let Some(flag) = env_flag("KERNEL_AUTO_REGISTER") {
            config.auto_register_unknown = flag;
        }
        if let Some(flag) = env_flag("KERNEL_TRACE_JSON") {
            config.trace_json = flag;
        }
        config
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn with_apps_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.apps_dir = dir.into();
        self
    }

    pub fn with_auto_register(mut self, enabled: bool) -> Self {
        self.auto_register_unknown = enabled;
        self
    }

    pub fn with_materialize_on_boot(mut self, enabled: bool) -> Self {
        self.materialize_on_boot = enabled;
        self
    }

    /// Physical artifact name for an app name
    pub fn artifact_name(&self, app_name: &str) -> String {
        format!("{}{}{}", self.artifact_prefix, app_name, self.artifact_extension)
    }

    /// Whether a directory entry looks like a launcher artifact
    pub fn is_artifact(&self, file_name: &str) -> bool {
        file_name.ends_with(&self.artifact_extension)
    }

    /// Layout of the resource store
    pub fn resource_store() -> StoreConfig {
        StoreConfig::new("resources", "id").with_index(IndexSpec::new("name"))
    }

    /// Layout of the registry store
    pub fn registry_store() -> StoreConfig {
        StoreConfig::new("registry", "name")
            .with_index(IndexSpec::new("pid").unique())
            .with_index(IndexSpec::new("status"))
    }
}

fn env_flag(key: &str) -> Option<bool> {
    std::env::var(key).ok().map(|v| v == "1" || v == "true")
}
