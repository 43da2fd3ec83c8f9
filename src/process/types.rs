/*!
 * Process Types
 * Registry records and the messages exchanged with execution contexts
 */

use crate::catalog::MetaInfo;
use crate::core::errors::LaunchError;
use crate::core::serde::is_false;
use crate::core::types::{Pid, ResourceId, WindowRect};
use crate::vfs::ArtifactHandle;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle status of a registered app
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppStatus {
    Installed,
    Running,
    /// Context alive in the background, window hidden
    Hibernated,
}

impl AppStatus {
    /// RUNNING or HIBERNATED; replayed at the next boot
    pub fn is_active(self) -> bool {
        matches!(self, AppStatus::Running | AppStatus::Hibernated)
    }
}

/// Last persisted app state and window geometry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SavedState {
    #[serde(default)]
    pub app: Option<Value>,
    #[serde(default)]
    pub window: Option<WindowRect>,
}

/// One registry entry
///
/// User entries are keyed by `name`, the artifact file name. System
/// entries live only in memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppRecord {
    pub pid: Pid,
    pub name: String,
    pub resource_id: ResourceId,
    #[serde(skip)]
    pub handle: Option<ArtifactHandle>,
    pub status: AppStatus,
    #[serde(default)]
    pub saved_state: Option<SavedState>,
    #[serde(default)]
    pub meta_info: MetaInfo,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_system_app: bool,
}

impl AppRecord {
    pub fn new(pid: impl Into<Pid>, name: impl Into<String>, resource_id: impl Into<ResourceId>) -> Self {
        Self {
            pid: pid.into(),
            name: name.into(),
            resource_id: resource_id.into(),
            handle: None,
            status: AppStatus::Installed,
            saved_state: None,
            meta_info: MetaInfo::default(),
            is_system_app: false,
        }
    }

    pub fn with_meta_info(mut self, meta_info: MetaInfo) -> Self {
        self.meta_info = meta_info;
        self
    }

    pub fn with_handle(mut self, handle: ArtifactHandle) -> Self {
        self.handle = Some(handle);
        self
    }

    pub fn system(mut self) -> Self {
        self.is_system_app = true;
        self
    }

    /// Saved app snapshot used for warm resume
    pub fn saved_app(&self) -> Option<&Value> {
        self.saved_state
            .as_ref()
            .and_then(|s| s.app.as_ref())
            .filter(|v| !v.is_null())
    }

    pub fn saved_state_mut(&mut self) -> &mut SavedState {
        self.saved_state.get_or_insert_with(SavedState::default)
    }
}

/// Event delivered to per-pid subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessEvent {
    /// Latest state broadcast by the app
    State(Value),
    /// User-visible warning, e.g. a blocked capability
    Warning(String),
}

/// Message into an execution context
#[derive(Debug, Clone, PartialEq)]
pub enum ContextMessage {
    Init,
    Restore(Value),
    UiAction(Value),
    AppInteract(Value),
    SaveState,
}

/// Message out of an execution context
#[derive(Debug, Clone, PartialEq)]
pub enum ContextEvent {
    /// Logic decoded, compiled and run to the end of its top level
    Ready,
    /// Loading failed; the context thread has already ended
    LoadFailed(LaunchError),
    /// State plus the artifact's `config` header
    StateUpdate(Value),
    /// Request to persist into `savedState.app`
    SaveState(Value),
    Fault { message: String, security: bool },
    /// Appended by the supervisor when the event stream ends
    Exited,
}
