/*!
 * Kernel Types
 * Supervisor commands and reports
 */

use crate::catalog::{Resource, UploadRequest};
use crate::core::errors::{KernelError, LaunchError};
use crate::core::types::{KernelResult, Pid, ResourceId, WindowRect};
use crate::process::AppRecord;
use crate::sandbox::{spawn_isolated, Cancellation, Engine, Value as ScriptValue, ViewHost};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::oneshot;

pub(crate) type Reply<T> = oneshot::Sender<T>;

/// Outcome of a start that did not fail outright
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Started {
    /// The context had already loaded
    Live,
    /// The context thread is still loading; the reply waits for it
    Loading,
}

/// Everything a view needs, gathered on the actor and mounted elsewhere
pub(crate) struct ViewMount {
    pub(crate) pid: Pid,
    pub(crate) resource: Resource,
    pub(crate) capabilities: ScriptValue,
}

impl ViewMount {
    pub(crate) fn mount(self, engine: &Engine, cancel: Cancellation) -> KernelResult<ViewHost> {
        ViewHost::mount_cancellable(engine, &self.resource, &self.pid, self.capabilities, cancel)
            .map_err(|e| KernelError::launch(self.pid.as_str(), e))
    }

    /// Mount on a script thread so the caller's stack and runtime stay free
    ///
    /// Dropping the returned future before it resolves cancels the view's code.
    pub(crate) async fn mount_isolated(self, engine: Arc<Engine>) -> KernelResult<ViewHost> {
        let pid = self.pid.clone();
        let cancel = Cancellation::new();
        let mut abandoned = CancelOnDrop(Some(cancel.clone()));
        let (tx, rx) = oneshot::channel();
        spawn_isolated(format!("mount-{}", pid), move || {
            let _ = tx.send(self.mount(&engine, cancel));
        })
        .map_err(|e| KernelError::launch(pid.as_str(), LaunchError::Load(e.to_string())))?;
        let result = rx.await;
        abandoned.0 = None;
        result.map_err(|_| {
            KernelError::launch(pid.as_str(), LaunchError::Load("view thread panicked".into()))
        })?
    }
}

struct CancelOnDrop(Option<Cancellation>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if let Some(cancel) = self.0.take() {
            cancel.cancel();
        }
    }
}

pub(crate) enum Command {
    ListApps(Reply<Vec<AppRecord>>),
    Query(AppQuery, Reply<Vec<AppRecord>>),
    Start {
        pid: Pid,
        payload: Option<Value>,
        reply: Reply<KernelResult<()>>,
    },
    Hibernate {
        pid: Pid,
        reply: Reply<KernelResult<()>>,
    },
    ForceKill {
        pid: Pid,
        reply: Reply<KernelResult<()>>,
    },
    DeleteApp {
        pid: Pid,
        resource_id: ResourceId,
        reply: Reply<KernelResult<()>>,
    },
    /// `reply` is absent for fire-and-forget dispatches from app code
    Dispatch {
        pid: Pid,
        action: Value,
        reply: Option<Reply<KernelResult<()>>>,
    },
    Evoke {
        target: Pid,
        from: Pid,
        payload: Value,
        reply: Reply<KernelResult<()>>,
    },
    Upload {
        request: Box<UploadRequest>,
        reply: Reply<KernelResult<ResourceId>>,
    },
    SaveWindow {
        pid: Pid,
        rect: WindowRect,
        reply: Reply<KernelResult<()>>,
    },
    WindowGeometry(Pid, Reply<KernelResult<WindowRect>>),
    ForceSaveAll(Reply<()>),
    IsSystemApp(Pid, Reply<bool>),
    GetResource(ResourceId, Reply<Option<Resource>>),
    Reconcile(Reply<KernelResult<ReconcileReport>>),
    MountView(Pid, Reply<KernelResult<ViewMount>>),
    Shutdown(Reply<()>),
}
