/*!
 * Supervisor Actor
 * Single task owning the registry, contexts and their event streams
 */

use super::subscribers::Subscribers;
use super::types::{AppQuery, Command, Reply, Started};
use crate::catalog::Catalog;
use crate::core::config::KernelConfig;
use crate::core::errors::{KernelError, LaunchError};
use crate::core::types::{KernelResult, Pid};
use crate::monitoring::KernelMetrics;
use crate::process::{AppRecord, AppStatus, ContextEvent, ExecutionContext, LeaseTable, ProcessEvent};
use crate::sandbox::{Engine, Transport};
use crate::store::Collection;
use crate::vfs::ArtifactDirectory;
use ahash::{AHashMap, AHashSet};
use serde_json::Value;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::{Stream, StreamExt, StreamMap};
use tracing::{debug, error, info, warn};

pub(crate) type EventStream = Pin<Box<dyn Stream<Item = ContextEvent> + Send + Sync>>;

/// How long shutdown waits for contexts to flush their last state
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Everything the supervisor owns
pub(crate) struct KernelState {
    pub(crate) config: KernelConfig,
    pub(crate) catalog: Catalog,
    pub(crate) registry: Collection<AppRecord>,
    pub(crate) directory: Arc<dyn ArtifactDirectory>,
    pub(crate) engine: Arc<Engine>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) leases: Arc<LeaseTable>,
    pub(crate) apps: AHashMap<Pid, AppRecord>,
    pub(crate) contexts: AHashMap<Pid, ExecutionContext>,
    pub(crate) streams: StreamMap<Pid, EventStream>,
    pub(crate) subscribers: Arc<Subscribers>,
    pub(crate) metrics: Arc<KernelMetrics>,
    /// Contexts still loading, with the start replies waiting on them
    pub(crate) loading: AHashMap<Pid, Vec<Reply<KernelResult<()>>>>,
    /// User pids whose last flush failed
    pub(crate) dirty: AHashSet<Pid>,
    /// Loop-back for dispatches raised by app views
    pub(crate) commands: mpsc::WeakUnboundedSender<Command>,
}

impl KernelState {
    /// Main loop: commands and context events, one at a time
    pub(crate) async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        info!(apps = self.apps.len(), "Supervisor loop started");
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown(reply)) => {
                        self.shutdown().await;
                        let _ = reply.send(());
                        break;
                    }
                    Some(command) => self.handle(command).await,
                    None => {
                        self.shutdown().await;
                        break;
                    }
                },
                Some((pid, event)) = self.streams.next(), if !self.streams.is_empty() => {
                    self.on_event(pid, event).await;
                }
            }
        }
        info!("Supervisor loop stopped");
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::ListApps(reply) => {
                let _ = reply.send(self.list_apps());
            }
            Command::Query(query, reply) => {
                let _ = reply.send(self.query(&query));
            }
            Command::Start {
                pid,
                payload,
                reply,
            } => {
                let started = self.start(&pid, payload).await;
                self.reply_started(&pid, started, reply);
            }
            Command::Hibernate { pid, reply } => {
                let _ = reply.send(self.hibernate(&pid).await);
            }
            Command::ForceKill { pid, reply } => {
                let _ = reply.send(self.force_kill(&pid).await);
            }
            Command::DeleteApp {
                pid,
                resource_id,
                reply,
            } => {
                let _ = reply.send(self.delete_app(&pid, &resource_id).await);
            }
            Command::Dispatch { pid, action, reply } => {
                let result = self.dispatch(&pid, action).await;
                match reply {
                    Some(reply) => {
                        let _ = reply.send(result);
                    }
                    None => {
                        if let Err(e) = result {
                            warn!(pid = %pid, error = %e, "Dispatch from app failed");
                        }
                    }
                }
            }
            Command::Evoke {
                target,
                from,
                payload,
                reply,
            } => {
                let started = self.evoke(&target, &from, payload).await;
                self.reply_started(&target, started, reply);
            }
            Command::Upload { request, reply } => {
                let _ = reply.send(self.upload_resource(*request).await);
            }
            Command::SaveWindow { pid, rect, reply } => {
                let _ = reply.send(self.save_window_geometry(&pid, rect).await);
            }
            Command::WindowGeometry(pid, reply) => {
                let _ = reply.send(self.window_geometry(&pid));
            }
            Command::ForceSaveAll(reply) => {
                self.force_save_all_states().await;
                let _ = reply.send(());
            }
            Command::IsSystemApp(pid, reply) => {
                let _ = reply.send(self.is_system_app(&pid));
            }
            Command::GetResource(id, reply) => {
                let _ = reply.send(self.catalog.get(&id).cloned());
            }
            Command::Reconcile(reply) => {
                let result = self.reconcile().await;
                if result.is_ok() {
                    self.subscribers.emit_change();
                }
                let _ = reply.send(result);
            }
            Command::MountView(pid, reply) => {
                let _ = reply.send(self.prepare_view(&pid));
            }
            Command::Shutdown(reply) => {
                let _ = reply.send(());
            }
        }
    }

    /// Answer now, or park the reply until the context finishes loading
    fn reply_started(
        &mut self,
        pid: &str,
        started: KernelResult<Started>,
        reply: Reply<KernelResult<()>>,
    ) {
        match (started, self.loading.get_mut(pid)) {
            (Ok(Started::Loading), Some(waiting)) => waiting.push(reply),
            (other, _) => {
                let _ = reply.send(other.map(|_| ()));
            }
        }
    }

    /// Answer every start waiting on `pid`'s load
    pub(crate) fn resolve_loading(&mut self, pid: &str, outcome: Result<(), LaunchError>) {
        let Some(waiting) = self.loading.remove(pid) else {
            return;
        };
        for reply in waiting {
            let result = outcome.clone().map_err(|e| KernelError::launch(pid, e));
            let _ = reply.send(result);
        }
    }

    /// Handle one message coming back from a context
    pub(crate) async fn on_event(&mut self, pid: Pid, event: ContextEvent) {
        match event {
            ContextEvent::Ready => {
                debug!(pid = %pid, "Context loaded");
                self.resolve_loading(&pid, Ok(()));
            }
            ContextEvent::LoadFailed(e) => {
                error!(pid = %pid, error = %e, "Cold start failed");
                self.resolve_loading(&pid, Err(e));
                self.kill_context(&pid);
                self.subscribers.clear_state(&pid);
                self.reset_installed(&pid, false).await;
                self.subscribers.emit_change();
            }
            ContextEvent::StateUpdate(state) => {
                debug!(pid = %pid, "State update");
                self.subscribers.cache_state(&pid, state.clone());
                self.subscribers.notify(&pid, ProcessEvent::State(state));
            }
            ContextEvent::SaveState(state) => {
                let Some(record) = self.apps.get_mut(&pid) else {
                    return;
                };
                let saved = record.saved_state_mut();
                saved.app = Some(state);
                let patch = serde_json::json!({ "savedState": saved.clone() });
                self.persist(&pid, patch).await;
            }
            ContextEvent::Fault { message, security } => {
                if security {
                    self.metrics.inc_security_violations();
                    warn!(pid = %pid, %message, "Security violation in app code");
                }
                self.subscribers.notify(&pid, ProcessEvent::Warning(message));
            }
            ContextEvent::Exited => {
                self.resolve_loading(&pid, Err(LaunchError::Load("context exited while loading".into())));
                if let Some(context) = self.contexts.remove(&pid) {
                    warn!(pid = %pid, "Execution context exited on its own");
                    context.terminate();
                    self.metrics.inc_terminated();
                    self.subscribers.clear_state(&pid);
                    self.reset_installed(&pid, false).await;
                    self.subscribers.emit_change();
                }
            }
        }
    }

    /// Register a freshly spawned context and its event stream
    pub(crate) fn attach(
        &mut self,
        context: ExecutionContext,
        events: mpsc::UnboundedReceiver<ContextEvent>,
    ) {
        let pid = context.pid().to_string();
        let stream = tokio_stream::wrappers::UnboundedReceiverStream::new(events)
            .chain(tokio_stream::once(ContextEvent::Exited));
        self.streams.insert(pid.clone(), Box::pin(stream));
        self.contexts.insert(pid, context);
        self.metrics.inc_spawned();
    }

    /// Tear down a pid's context, if any; its stream goes with it
    pub(crate) fn kill_context(&mut self, pid: &str) -> bool {
        self.resolve_loading(pid, Err(LaunchError::Load("stopped before it finished loading".into())));
        self.streams.remove(pid);
        match self.contexts.remove(pid) {
            Some(context) => {
                context.terminate();
                self.metrics.inc_terminated();
                true
            }
            None => false,
        }
    }

    /// Flush a patch for a user app; failures are retried later
    pub(crate) async fn persist(&mut self, pid: &str, patch: Value) {
        self.retry_dirty().await;
        let Some(record) = self.apps.get(pid) else {
            return;
        };
        if record.is_system_app {
            return;
        }
        let name = record.name.clone();
        match self.registry.update(&name, patch).await {
            Ok(true) => {}
            Ok(false) => {
                // Record vanished from the store; write it whole
                if let Err(e) = self.registry.put(record).await {
                    self.flush_failed(pid, &e.to_string());
                }
            }
            Err(e) => self.flush_failed(pid, &e.to_string()),
        }
    }

    fn flush_failed(&mut self, pid: &str, error: &str) {
        warn!(pid = %pid, error, "Registry flush failed; will retry");
        self.metrics.inc_failed_flushes();
        self.dirty.insert(pid.to_string());
    }

    /// Rewrite every record whose earlier flush failed
    pub(crate) async fn retry_dirty(&mut self) {
        if self.dirty.is_empty() {
            return;
        }
        let pending: Vec<Pid> = self.dirty.drain().collect();
        for pid in pending {
            let Some(record) = self.apps.get(&pid) else {
                continue;
            };
            match self.registry.put(record).await {
                Ok(()) => debug!(pid = %pid, "Retried flush succeeded"),
                Err(e) => {
                    warn!(pid = %pid, error = %e, "Retried flush failed");
                    self.metrics.inc_failed_flushes();
                    self.dirty.insert(pid);
                }
            }
        }
    }

    /// Put a record back to INSTALLED, optionally dropping its saved state
    pub(crate) async fn reset_installed(&mut self, pid: &str, clear_state: bool) {
        let Some(record) = self.apps.get_mut(pid) else {
            return;
        };
        record.status = AppStatus::Installed;
        if clear_state {
            record.saved_state = None;
        }
        let patch = serde_json::json!({
            "status": AppStatus::Installed,
            "savedState": record.saved_state.clone(),
        });
        self.persist(pid, patch).await;
    }

    pub(crate) fn is_system_app(&self, pid: &str) -> bool {
        self.apps.get(pid).map_or(false, |r| r.is_system_app)
    }

    /// System entries first, then user entries, each sorted by name
    pub(crate) fn list_apps(&self) -> Vec<AppRecord> {
        let mut apps: Vec<AppRecord> = self.apps.values().cloned().collect();
        apps.sort_by(|a, b| {
            b.is_system_app
                .cmp(&a.is_system_app)
                .then_with(|| a.name.cmp(&b.name))
        });
        apps
    }

    pub(crate) fn query(&self, query: &AppQuery) -> Vec<AppRecord> {
        self.list_apps()
            .into_iter()
            .filter(|app| match query {
                AppQuery::Running => app.status == AppStatus::Running,
                AppQuery::Hibernated => app.status == AppStatus::Hibernated,
                AppQuery::Blocked => app.meta_info.custom_flag("blockEd"),
                AppQuery::OfType(kind) => app.meta_info.app_type.as_deref() == Some(kind.as_str()),
            })
            .collect()
    }

    /// Close every context, collect their final events, then abort stragglers
    async fn shutdown(&mut self) {
        info!(contexts = self.contexts.len(), "Supervisor shutting down");
        for context in self.contexts.values_mut() {
            context.send(crate::process::ContextMessage::SaveState);
            context.close();
        }

        let drain = async {
            while let Some((pid, event)) = self.streams.next().await {
                match event {
                    ContextEvent::Exited => {
                        if let Some(context) = self.contexts.remove(&pid) {
                            context.terminate();
                            self.metrics.inc_terminated();
                        }
                    }
                    ContextEvent::SaveState(_) => self.on_event(pid, event).await,
                    _ => {}
                }
            }
        };
        if tokio::time::timeout(DRAIN_TIMEOUT, drain).await.is_err() {
            warn!("Contexts did not drain in time; aborting");
        }

        let remaining: Vec<Pid> = self.contexts.keys().cloned().collect();
        for pid in remaining {
            self.kill_context(&pid);
        }
        self.retry_dirty().await;
    }
}
