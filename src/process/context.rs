/*!
 * Execution Context
 * One script thread per running app, driven only by messages
 *
 * The thread owns the app's state. It first loads the leased artifact and
 * reports the outcome, then runs the app's reducer for each inbound message;
 * changed states flow back out as broadcasts and save requests.
 */

use super::lease::{Lease, LeaseTable};
use super::types::{ContextEvent, ContextMessage};
use crate::codec::{decode, NOOP_LOGIC};
use crate::core::errors::LaunchError;
use crate::core::types::Pid;
use crate::sandbox::{spawn_isolated, Cancellation, Engine, LoadedModule, RuntimeError, Value};
use parking_lot::Mutex;
use serde_json::{json, Map, Value as Json};
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Route a bundle starts on
pub const HOME_ROUTE: &str = "home";

/// Live execution context
///
/// Dropping the sender ends the thread after its queued messages;
/// [`ExecutionContext::terminate`] also cancels whatever app code is running.
pub struct ExecutionContext {
    pid: Pid,
    sender: Option<mpsc::UnboundedSender<ContextMessage>>,
    worker: JoinHandle<()>,
    cancel: Cancellation,
    lease: Lease,
    leases: Arc<LeaseTable>,
}

impl ExecutionContext {
    /// Start the context thread for a leased artifact
    ///
    /// Decoding, compiling and the logic's top level run on that thread; the
    /// first event is [`ContextEvent::Ready`] or [`ContextEvent::LoadFailed`].
    /// Messages sent before then are queued.
    pub fn spawn(
        pid: &str,
        lease: Lease,
        leases: Arc<LeaseTable>,
        engine: Arc<Engine>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ContextEvent>), LaunchError> {
        let (sender, inbox) = mpsc::unbounded_channel();
        let (events, outbox) = mpsc::unbounded_channel();
        let cancel = Cancellation::new();

        let worker = {
            let pid = pid.to_string();
            let lease = lease.clone();
            let leases = Arc::clone(&leases);
            let cancel = cancel.clone();
            spawn_isolated(format!("context-{}", pid), move || {
                run_context(pid, lease, leases, engine, cancel, inbox, events)
            })
        };
        let worker = match worker {
            Ok(worker) => worker,
            Err(e) => {
                leases.revoke(&lease);
                return Err(LaunchError::Load(format!("context thread: {}", e)));
            }
        };
        info!(pid = %pid, lease = %lease.key(), "Execution context spawned");

        Ok((
            Self {
                pid: pid.to_string(),
                sender: Some(sender),
                worker,
                cancel,
                lease,
                leases,
            },
            outbox,
        ))
    }

    pub fn pid(&self) -> &str {
        &self.pid
    }

    pub fn lease(&self) -> &Lease {
        &self.lease
    }

    /// Queue a message; false when the context is gone
    pub fn send(&self, message: ContextMessage) -> bool {
        match &self.sender {
            Some(sender) => sender.send(message).is_ok(),
            None => false,
        }
    }

    /// Stop accepting messages and let the thread drain
    pub fn close(&mut self) {
        self.sender = None;
    }

    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Cancel running app code, revoke the lease and detach the thread
    ///
    /// The thread exits at the next call or loop iteration of app code.
    pub fn terminate(mut self) {
        self.close();
        self.cancel.cancel();
        self.leases.revoke(&self.lease);
        info!(pid = %self.pid, "Execution context terminated");
    }
}

fn run_context(
    pid: Pid,
    lease: Lease,
    leases: Arc<LeaseTable>,
    engine: Arc<Engine>,
    cancel: Cancellation,
    mut inbox: mpsc::UnboundedReceiver<ContextMessage>,
    events: mpsc::UnboundedSender<ContextEvent>,
) {
    let mut driver = match Driver::load(&pid, &lease, &leases, &engine, cancel.clone()) {
        Ok(driver) => driver,
        Err(e) => {
            leases.revoke(&lease);
            if cancel.is_cancelled() {
                debug!(pid = %pid, "Load cancelled");
            } else {
                warn!(pid = %pid, error = %e, "Context failed to load");
            }
            let _ = events.send(ContextEvent::LoadFailed(e));
            return;
        }
    };
    if events.send(ContextEvent::Ready).is_err() {
        return;
    }

    while let Some(message) = inbox.blocking_recv() {
        if cancel.is_cancelled() {
            break;
        }
        for event in driver.handle(message) {
            if events.send(event).is_err() {
                return;
            }
        }
    }
    debug!(pid = %pid, "Context inbox closed");
}

/// What runs inside a context
struct Driver {
    pid: Pid,
    /// `{resourceId, name, isBundle}` from the artifact header
    config: Json,
    is_bundle: bool,
    module: LoadedModule,
    state: Json,
    /// Actions raised through the `dispatch` handed to `init`
    pending: Arc<Mutex<Vec<Json>>>,
}

impl Driver {
    fn load(
        pid: &str,
        lease: &Lease,
        leases: &LeaseTable,
        engine: &Engine,
        cancel: Cancellation,
    ) -> Result<Self, LaunchError> {
        let text = leases
            .resolve(lease)
            .ok_or_else(|| LaunchError::ArtifactUnreadable(format!("lease {} revoked", lease.key())))?;
        let artifact = decode(&text)?;
        let logic = artifact.logic.as_deref().unwrap_or(NOOP_LOGIC);
        let factory = engine.compile(logic)?;
        // Logic gets no capabilities; only views talk to the host
        let module = factory
            .load_cancellable(&Value::empty_object(), cancel)
            .map_err(|e| LaunchError::Load(e.to_string()))?;

        let header = artifact.header;
        Ok(Self {
            pid: pid.to_string(),
            config: json!({
                "resourceId": header.resource_id,
                "name": header.name,
                "isBundle": header.is_bundle,
            }),
            is_bundle: header.is_bundle,
            module,
            state: Json::Null,
            pending: Arc::new(Mutex::new(Vec::new())),
        })
    }

    fn handle(&mut self, message: ContextMessage) -> Vec<ContextEvent> {
        let mut out = Vec::new();
        match message {
            ContextMessage::Init => self.init(&mut out),
            ContextMessage::Restore(state) => {
                self.state = state;
                out.push(self.broadcast());
            }
            ContextMessage::UiAction(action) | ContextMessage::AppInteract(action) => {
                self.apply(action, &mut out);
            }
            ContextMessage::SaveState => out.push(ContextEvent::SaveState(self.state.clone())),
        }
        self.drain(&mut out);
        out
    }

    fn init(&mut self, out: &mut Vec<ContextEvent>) {
        let mut base = match self.module.binding("initialState") {
            Some(value) if !value.is_null() => value.to_json(),
            _ => Json::Object(Map::new()),
        };
        if self.is_bundle {
            if let Json::Object(fields) = &mut base {
                fields
                    .entry("router")
                    .or_insert_with(|| json!({ "path": HOME_ROUTE }));
            }
        }
        self.state = base;

        if let Some(init) = self.module.binding("init").filter(Value::is_callable) {
            let pending = Arc::clone(&self.pending);
            let dispatch = Value::native("dispatch", move |_, args| {
                pending
                    .lock()
                    .push(args.first().map(Value::to_json).unwrap_or(Json::Null));
                Ok(Value::Null)
            });
            let state = Value::from_json(&self.state);
            if let Err(e) = self.module.call(&init, vec![dispatch, state]) {
                out.push(self.fault("init", e));
            }
            self.drain(out);
        }
        out.push(self.broadcast());
    }

    /// Run queued `dispatch` actions raised from inside app code
    fn drain(&mut self, out: &mut Vec<ContextEvent>) {
        loop {
            let queued = std::mem::take(&mut *self.pending.lock());
            if queued.is_empty() {
                break;
            }
            for action in queued {
                self.apply(action, out);
            }
        }
    }

    fn apply(&mut self, action: Json, out: &mut Vec<ContextEvent>) {
        let mut next = match self.module.binding("reducer").filter(Value::is_callable) {
            Some(reducer) => {
                let args = vec![Value::from_json(&self.state), Value::from_json(&action)];
                match self.module.call(&reducer, args) {
                    Ok(value) => value.to_json(),
                    Err(e) => {
                        out.push(self.fault("reducer", e));
                        return;
                    }
                }
            }
            None => self.state.clone(),
        };

        if self.is_bundle && action.get("type").and_then(Json::as_str) == Some("NAVIGATE") {
            let path = action.get("payload").cloned().unwrap_or(Json::Null);
            if let Json::Object(fields) = &mut next {
                let router = fields
                    .entry("router")
                    .or_insert_with(|| json!({ "path": HOME_ROUTE }));
                match router {
                    Json::Object(router) => {
                        router.insert("path".to_string(), path);
                    }
                    other => *other = json!({ "path": path }),
                }
            }
        }

        if next != self.state {
            self.state = next;
            out.push(self.broadcast());
            out.push(ContextEvent::SaveState(self.state.clone()));
        }
    }

    fn broadcast(&self) -> ContextEvent {
        let mut payload = match &self.state {
            Json::Object(fields) => fields.clone(),
            _ => Map::new(),
        };
        payload.insert("config".to_string(), self.config.clone());
        ContextEvent::StateUpdate(Json::Object(payload))
    }

    fn fault(&self, stage: &str, error: RuntimeError) -> ContextEvent {
        let security = error.is_security_violation();
        warn!(pid = %self.pid, stage, error = %error, security, "App code failed");
        ContextEvent::Fault {
            message: error.to_string(),
            security,
        }
    }
}
