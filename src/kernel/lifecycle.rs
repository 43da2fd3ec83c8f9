/*!
 * App Lifecycle
 * start / hibernate / kill / delete transitions per pid
 *
 * INSTALLED --start--> RUNNING --hibernate--> HIBERNATED --start--> RUNNING
 * RUNNING | HIBERNATED --kill--> INSTALLED --delete--> (removed)
 */

use super::actor::KernelState;
use super::types::{Command, Started, ViewMount};
use crate::codec::encode;
use crate::core::errors::{KernelError, LaunchError};
use crate::core::types::{KernelResult, WindowRect};
use crate::monitoring::span_operation;
use crate::process::{AppStatus, ContextMessage, ExecutionContext};
use crate::sandbox::{create_capability_scope, DispatchFn};
use crate::vfs::VfsError;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info, warn};

impl KernelState {
    /// Resume a live context or spawn a new one
    ///
    /// A freshly spawned context reports [`Started::Loading`]; its load
    /// outcome arrives later as a context event.
    pub(crate) async fn start(&mut self, pid: &str, payload: Option<Value>) -> KernelResult<Started> {
        let span = span_operation("start", pid);
        let status = self
            .apps
            .get(pid)
            .map(|r| r.status)
            .ok_or_else(|| KernelError::NotFound(pid.to_string()))?;

        if let Some(context) = self.contexts.get(pid) {
            if let Some(payload) = payload {
                context.send(ContextMessage::AppInteract(payload));
            }
            if status == AppStatus::Hibernated {
                self.set_status(pid, AppStatus::Running).await;
                info!(pid = %pid, "App resumed");
                self.subscribers.notify_cached(pid);
                self.subscribers.emit_change();
            } else {
                self.subscribers.notify_cached(pid);
            }
            span.record_result(true);
            if self.loading.contains_key(pid) {
                return Ok(Started::Loading);
            }
            return Ok(Started::Live);
        }

        match self.cold_start(pid, payload).await {
            Ok(()) => {
                span.record_result(true);
                self.subscribers.emit_change();
                Ok(Started::Loading)
            }
            Err(e) => {
                span.record_result(false);
                error!(pid = %pid, error = %e, "Cold start failed");
                self.kill_context(pid);
                if status != AppStatus::Installed {
                    self.reset_installed(pid, false).await;
                    self.subscribers.emit_change();
                }
                Err(e)
            }
        }
    }

    async fn cold_start(&mut self, pid: &str, payload: Option<Value>) -> KernelResult<()> {
        let text = self.artifact_text(pid).await?;
        let lease = self.leases.lease(text);
        let (context, events) =
            ExecutionContext::spawn(pid, lease, Arc::clone(&self.leases), Arc::clone(&self.engine))
                .map_err(|e| KernelError::launch(pid, e))?;
        self.loading.entry(pid.to_string()).or_default();

        match self.apps.get(pid).and_then(|r| r.saved_app().cloned()) {
            Some(saved) => {
                context.send(ContextMessage::Restore(saved));
                self.metrics.inc_restore();
            }
            None => {
                context.send(ContextMessage::Init);
                self.metrics.inc_init();
            }
        }
        if let Some(payload) = payload {
            context.send(ContextMessage::AppInteract(payload));
        }
        self.attach(context, events);

        self.set_status(pid, AppStatus::Running).await;
        info!(pid = %pid, "App started");
        Ok(())
    }

    /// Launcher text for a pid: synthesized for system apps, read for user apps
    async fn artifact_text(&self, pid: &str) -> KernelResult<String> {
        let record = self
            .apps
            .get(pid)
            .ok_or_else(|| KernelError::NotFound(pid.to_string()))?;
        let resource = self.catalog.get(&record.resource_id);

        if record.is_system_app {
            let resource = resource.ok_or_else(|| {
                KernelError::launch(pid, LaunchError::ResourceMissing(record.resource_id.clone()))
            })?;
            return Ok(encode(resource));
        }

        let handle = record
            .handle
            .as_ref()
            .ok_or_else(|| KernelError::launch(pid, LaunchError::ArtifactMissing(pid.to_string())))?;
        match handle.read_with_permission().await {
            Ok(text) => Ok(text),
            Err(VfsError::PermissionDenied(name)) => Err(KernelError::PermissionDenied(name)),
            Err(e) => Err(KernelError::launch(
                pid,
                LaunchError::ArtifactUnreadable(e.to_string()),
            )),
        }
    }

    pub(crate) async fn set_status(&mut self, pid: &str, status: AppStatus) {
        if let Some(record) = self.apps.get_mut(pid) {
            record.status = status;
            self.persist(pid, json!({ "status": status })).await;
        }
    }

    pub(crate) async fn hibernate(&mut self, pid: &str) -> KernelResult<()> {
        let record = self
            .apps
            .get_mut(pid)
            .ok_or_else(|| KernelError::NotFound(pid.to_string()))?;
        if record.status != AppStatus::Running {
            return Ok(());
        }
        record.status = AppStatus::Hibernated;
        let patch = json!({
            "status": AppStatus::Hibernated,
            "savedState": record.saved_state.clone(),
        });
        self.persist(pid, patch).await;
        info!(pid = %pid, "App hibernated");
        self.subscribers.emit_change();
        Ok(())
    }

    /// Destroy the context and reset to a fresh install; unknown pids are a no-op
    pub(crate) async fn force_kill(&mut self, pid: &str) -> KernelResult<()> {
        let killed = self.kill_context(pid);
        self.subscribers.clear_state(pid);
        if self.apps.contains_key(pid) {
            self.reset_installed(pid, true).await;
            info!(pid = %pid, killed, "App force-killed");
        }
        self.subscribers.emit_change();
        Ok(())
    }

    pub(crate) async fn delete_app(&mut self, pid: &str, resource_id: &str) -> KernelResult<()> {
        if self.catalog.is_system(resource_id) {
            return Err(KernelError::NotDeletable(resource_id.to_string()));
        }
        let record = self
            .apps
            .get(pid)
            .ok_or_else(|| KernelError::NotFound(pid.to_string()))?;
        if record.is_system_app {
            return Err(KernelError::NotDeletable(record.resource_id.clone()));
        }
        let name = record.name.clone();

        match self.directory.remove(&name).await {
            Ok(()) | Err(VfsError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }
        if self.contexts.contains_key(pid) || record.status != AppStatus::Installed {
            self.force_kill(pid).await?;
        }

        self.apps.remove(pid);
        self.dirty.remove(pid);
        self.registry.delete(&name).await?;

        let referenced = self.apps.values().any(|r| r.resource_id == resource_id);
        if !referenced {
            self.catalog.remove(resource_id).await?;
        }
        info!(pid = %pid, resource_id, resource_removed = !referenced, "App deleted");
        self.subscribers.emit_change();
        Ok(())
    }

    pub(crate) async fn save_window_geometry(&mut self, pid: &str, rect: WindowRect) -> KernelResult<()> {
        let Some(record) = self.apps.get_mut(pid) else {
            return Ok(());
        };
        let saved = record.saved_state_mut();
        saved.window = Some(rect);
        let patch = json!({ "savedState": saved.clone() });
        self.persist(pid, patch).await;
        Ok(())
    }

    /// Last saved geometry, or the configured default for a window never moved
    pub(crate) fn window_geometry(&self, pid: &str) -> KernelResult<WindowRect> {
        let record = self
            .apps
            .get(pid)
            .ok_or_else(|| KernelError::NotFound(pid.to_string()))?;
        Ok(record
            .saved_state
            .as_ref()
            .and_then(|saved| saved.window)
            .unwrap_or(self.config.default_window))
    }

    /// Ask every context for its state; replies arrive as save events
    pub(crate) async fn force_save_all_states(&mut self) {
        info!(contexts = self.contexts.len(), "Forcing state save");
        for context in self.contexts.values() {
            context.send(ContextMessage::SaveState);
        }
        self.retry_dirty().await;
    }

    /// Cross-app handoff; the payload is tagged with the caller
    pub(crate) async fn evoke(
        &mut self,
        target: &str,
        from: &str,
        payload: Value,
    ) -> KernelResult<Started> {
        if !self.apps.contains_key(target) {
            return Err(KernelError::NotFound(target.to_string()));
        }
        let mut payload = match payload {
            Value::Object(fields) => fields,
            Value::Null => serde_json::Map::new(),
            other => {
                let mut fields = serde_json::Map::new();
                fields.insert("payload".to_string(), other);
                fields
            }
        };
        payload.insert("from".to_string(), Value::String(from.to_string()));
        let payload = Value::Object(payload);

        if let Some(context) = self.contexts.get(target) {
            context.send(ContextMessage::AppInteract(payload));
            self.metrics.inc_routed();
            return Ok(Started::Live);
        }
        self.start(target, Some(payload)).await
    }

    /// Dispatch sink handed to a pid's capability scope
    pub(crate) fn dispatcher(&self, pid: &str) -> DispatchFn {
        let commands = self.commands.clone();
        let pid = pid.to_string();
        Arc::new(move |action| match commands.upgrade() {
            Some(tx) => {
                let _ = tx.send(Command::Dispatch {
                    pid: pid.clone(),
                    action,
                    reply: None,
                });
            }
            None => warn!(pid = %pid, "Dispatch after supervisor shutdown"),
        })
    }

    /// Gather a pid's view sources and capability scope; compiling happens off the actor
    pub(crate) fn prepare_view(&self, pid: &str) -> KernelResult<ViewMount> {
        let record = self
            .apps
            .get(pid)
            .ok_or_else(|| KernelError::NotFound(pid.to_string()))?;
        let resource = self.catalog.get(&record.resource_id).ok_or_else(|| {
            KernelError::launch(pid, LaunchError::ResourceMissing(record.resource_id.clone()))
        })?;
        let capabilities = create_capability_scope(
            self.dispatcher(pid),
            pid,
            record.is_system_app,
            Arc::clone(&self.transport),
        );
        Ok(ViewMount {
            pid: pid.to_string(),
            resource: resource.clone(),
            capabilities,
        })
    }
}
