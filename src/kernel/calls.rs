/*!
 * Supervisor Calls
 * Routing of app actions and the KERNEL_CALL dispatch tables
 */

use super::actor::KernelState;
use super::types::{KernelCall, KERNEL_CALL};
use crate::catalog::{Catalog, UploadRequest};
use crate::codec::encode;
use crate::core::errors::KernelError;
use crate::core::types::{KernelResult, ResourceId};
use crate::process::{ContextMessage, ProcessEvent};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

/// Uploads may replace user resources only
fn ensure_overwritable(catalog: &Catalog, id: &str) -> KernelResult<()> {
    if catalog.is_system(id) {
        return Err(KernelError::NotOverwritable(id.to_string()));
    }
    Ok(())
}

/// Reply posted back to a caller after a supervisor call
enum CallReply {
    Message(String),
    Apps(Value),
}

impl CallReply {
    fn into_action(self) -> Value {
        match self {
            CallReply::Message(text) => json!({ "type": "MSG", "payload": text }),
            CallReply::Apps(apps) => json!({ "type": "APPS", "payload": apps }),
        }
    }
}

impl KernelState {
    /// Route an action to a pid's context, intercepting supervisor calls
    pub(crate) async fn dispatch(&mut self, pid: &str, action: Value) -> KernelResult<()> {
        if !self.apps.contains_key(pid) {
            return Err(KernelError::NotFound(pid.to_string()));
        }

        let is_call = action.get("type").and_then(Value::as_str) == Some(KERNEL_CALL);
        if is_call {
            if let Some(payload) = action.get("payload").filter(|p| p.is_object()) {
                return self.kernel_call(pid, payload.clone()).await;
            }
        }

        let context = self
            .contexts
            .get(pid)
            .ok_or_else(|| KernelError::NotRunning(pid.to_string()))?;
        if !context.send(ContextMessage::UiAction(action)) {
            return Err(KernelError::NotRunning(pid.to_string()));
        }
        self.metrics.inc_routed();
        debug!(pid = %pid, "Action routed");
        Ok(())
    }

    /// Install a resource, write its artifact, then reconcile it into the registry
    pub(crate) async fn upload_resource(&mut self, request: UploadRequest) -> KernelResult<ResourceId> {
        let id = request.resource_id()?;
        ensure_overwritable(&self.catalog, &id)?;
        let resource = request.into_resource(self.config.min_window_size)?;
        let artifact = self.config.artifact_name(&resource.name);
        let text = encode(&resource);

        self.catalog.put(resource).await?;
        self.directory.write(&artifact, &text).await?;
        info!(resource_id = %id, artifact = %artifact, "Resource uploaded");

        let report = self.reconcile().await?;
        for (name, error) in &report.failures {
            warn!(artifact = %name, %error, "Reconciliation failure after upload");
        }
        self.subscribers.emit_change();
        Ok(id)
    }

    async fn kernel_call(&mut self, pid: &str, payload: Value) -> KernelResult<()> {
        self.metrics.inc_kernel_calls();
        let method = payload
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let args = payload.get("args").cloned().unwrap_or(Value::Null);
        let privileged = self.is_system_app(pid);

        let call = KernelCall::parse(&method).filter(|call| privileged || call.is_unprivileged());
        let Some(call) = call else {
            warn!(pid = %pid, method = %method, privileged, "No handler for supervisor call");
            self.subscribers.notify(
                pid,
                ProcessEvent::Warning(format!("no handler for {}", method)),
            );
            return Ok(());
        };
        info!(pid = %pid, ?call, "Supervisor call");

        let reply = match call {
            KernelCall::UploadResource => Some(self.call_upload(args).await),
            KernelCall::OpenDirectory => Some(self.call_open_directory().await),
            KernelCall::ListApps => Some(self.call_list_apps()),
            KernelCall::EvokeApp => {
                self.call_evoke(pid, args).await;
                None
            }
        };
        if let Some(reply) = reply {
            self.reply(pid, reply);
        }
        Ok(())
    }

    fn reply(&self, pid: &str, reply: CallReply) {
        match self.contexts.get(pid) {
            Some(context) => {
                context.send(ContextMessage::UiAction(reply.into_action()));
            }
            None => debug!(pid = %pid, "Caller has no context; reply dropped"),
        }
    }

    async fn call_upload(&mut self, args: Value) -> CallReply {
        let request: UploadRequest = match serde_json::from_value(args) {
            Ok(request) => request,
            Err(e) => return CallReply::Message(format!("error: invalid upload: {}", e)),
        };
        match self.upload_resource(request).await {
            Ok(id) => CallReply::Message(format!("installed {}", id)),
            Err(e) => CallReply::Message(format!("error: {}", e)),
        }
    }

    async fn call_open_directory(&mut self) -> CallReply {
        match self.directory.ensure_access().await {
            Ok(state) if state.is_granted() => {
                CallReply::Message(format!("opened {}", self.directory.name()))
            }
            Ok(_) => CallReply::Message("error: directory access declined".to_string()),
            Err(e) => CallReply::Message(format!("error: {}", e)),
        }
    }

    fn call_list_apps(&self) -> CallReply {
        let apps: Vec<Value> = self
            .list_apps()
            .into_iter()
            .map(|app| {
                let running = self.contexts.contains_key(&app.pid);
                let mut doc = serde_json::to_value(&app).unwrap_or(Value::Null);
                if let Value::Object(fields) = &mut doc {
                    fields.insert("isRunning".to_string(), Value::Bool(running));
                }
                doc
            })
            .collect();
        CallReply::Apps(Value::Array(apps))
    }

    async fn call_evoke(&mut self, from: &str, args: Value) {
        let Some(target) = args.get("pid").and_then(Value::as_str).map(str::to_string) else {
            self.subscribers
                .notify(from, ProcessEvent::Warning("evoke: missing target pid".to_string()));
            return;
        };
        let payload = args.get("interactInfo").cloned().unwrap_or(Value::Null);
        if let Err(e) = self.evoke(&target, from, payload).await {
            warn!(from = %from, target = %target, error = %e, "Evoke failed");
            self.subscribers
                .notify(from, ProcessEvent::Warning(format!("evoke failed: {}", e)));
        }
    }
}
