/*!
 * Kernel Handle
 * Cloneable front door to the supervisor actor
 */

use super::actor::KernelState;
use super::subscribers::{ProcessCallback, RegistryCallback, Subscribers, Subscription};
use super::types::{AppQuery, Command, ReconcileReport, Reply};
use crate::catalog::{Catalog, Resource, UploadRequest};
use crate::core::config::KernelConfig;
use crate::core::errors::KernelError;
use crate::core::types::{KernelResult, ResourceId, WindowRect};
use crate::monitoring::{KernelMetrics, KernelStats};
use crate::process::{AppRecord, LeaseTable, ProcessEvent};
use crate::sandbox::{DispatchFn, Engine, EngineStats, HttpTransport, Transport, ViewHost};
use crate::store::{Collection, DocumentStore, MemoryStore};
use crate::vfs::{ArtifactDirectory, LocalDirectory};
use ahash::{AHashMap, AHashSet};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::StreamMap;
use tracing::{info, warn};

/// Handle to a running supervisor
///
/// Every method is a message to the actor; once the actor has stopped they
/// fail with [`KernelError::Shutdown`].
#[derive(Clone)]
pub struct Kernel {
    commands: mpsc::UnboundedSender<Command>,
    subscribers: Arc<Subscribers>,
    metrics: Arc<KernelMetrics>,
    engine: Arc<Engine>,
}

impl Kernel {
    pub fn builder(config: KernelConfig) -> KernelBuilder {
        KernelBuilder::new(config)
    }

    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> Command) -> KernelResult<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(build(tx))
            .map_err(|_| KernelError::Shutdown)?;
        rx.await.map_err(|_| KernelError::Shutdown)
    }

    /// Every registry entry, system apps first
    pub async fn list_apps(&self) -> KernelResult<Vec<AppRecord>> {
        self.request(Command::ListApps).await
    }

    pub async fn running_apps(&self) -> KernelResult<Vec<AppRecord>> {
        self.request(|reply| Command::Query(AppQuery::Running, reply))
            .await
    }

    pub async fn hibernated_apps(&self) -> KernelResult<Vec<AppRecord>> {
        self.request(|reply| Command::Query(AppQuery::Hibernated, reply))
            .await
    }

    pub async fn blocked_apps(&self) -> KernelResult<Vec<AppRecord>> {
        self.request(|reply| Command::Query(AppQuery::Blocked, reply))
            .await
    }

    pub async fn apps_of_type(&self, app_type: impl Into<String>) -> KernelResult<Vec<AppRecord>> {
        let app_type = app_type.into();
        self.request(|reply| Command::Query(AppQuery::OfType(app_type), reply))
            .await
    }

    /// Launch or resume a pid, optionally handing it an interaction payload
    pub async fn start(&self, pid: &str, payload: Option<Value>) -> KernelResult<()> {
        let pid = pid.to_string();
        self.request(|reply| Command::Start {
            pid,
            payload,
            reply,
        })
        .await?
    }

    pub async fn hibernate(&self, pid: &str) -> KernelResult<()> {
        let pid = pid.to_string();
        self.request(|reply| Command::Hibernate { pid, reply })
            .await?
    }

    pub async fn force_kill(&self, pid: &str) -> KernelResult<()> {
        let pid = pid.to_string();
        self.request(|reply| Command::ForceKill { pid, reply })
            .await?
    }

    pub async fn delete_app(&self, pid: &str, resource_id: &str) -> KernelResult<()> {
        let pid = pid.to_string();
        let resource_id = resource_id.to_string();
        self.request(|reply| Command::DeleteApp {
            pid,
            resource_id,
            reply,
        })
        .await?
    }

    /// Send an action to a pid; `KERNEL_CALL` actions are handled by the supervisor
    pub async fn dispatch(&self, pid: &str, action: Value) -> KernelResult<()> {
        let pid = pid.to_string();
        self.request(|reply| Command::Dispatch {
            pid,
            action,
            reply: Some(reply),
        })
        .await?
    }

    /// Hand a payload from one app to another, starting the target if needed
    pub async fn evoke(&self, target: &str, from: &str, payload: Value) -> KernelResult<()> {
        let target = target.to_string();
        let from = from.to_string();
        self.request(|reply| Command::Evoke {
            target,
            from,
            payload,
            reply,
        })
        .await?
    }

    pub async fn upload_resource(&self, request: UploadRequest) -> KernelResult<ResourceId> {
        self.request(|reply| Command::Upload {
            request: Box::new(request),
            reply,
        })
        .await?
    }

    pub async fn save_window_geometry(&self, pid: &str, rect: WindowRect) -> KernelResult<()> {
        let pid = pid.to_string();
        self.request(|reply| Command::SaveWindow { pid, rect, reply })
            .await?
    }

    pub async fn window_geometry(&self, pid: &str) -> KernelResult<WindowRect> {
        let pid = pid.to_string();
        self.request(|reply| Command::WindowGeometry(pid, reply))
            .await?
    }

    pub async fn force_save_all_states(&self) -> KernelResult<()> {
        self.request(Command::ForceSaveAll).await
    }

    pub async fn is_system_app(&self, pid: &str) -> KernelResult<bool> {
        let pid = pid.to_string();
        self.request(|reply| Command::IsSystemApp(pid, reply)).await
    }

    pub async fn get_resource(&self, resource_id: &str) -> KernelResult<Option<Resource>> {
        let id = resource_id.to_string();
        self.request(|reply| Command::GetResource(id, reply)).await
    }

    pub async fn reconcile(&self) -> KernelResult<ReconcileReport> {
        self.request(Command::Reconcile).await?
    }

    /// Compile a pid's view with its capability scope
    ///
    /// The actor only gathers the inputs; compiling and running the view's
    /// top level happen on a script thread.
    pub async fn mount_view(&self, pid: &str) -> KernelResult<ViewHost> {
        let pid = pid.to_string();
        let mount = self.request(|reply| Command::MountView(pid, reply)).await??;
        mount.mount_isolated(Arc::clone(&self.engine)).await
    }

    /// Flush every context and stop the actor
    pub async fn shutdown(&self) -> KernelResult<()> {
        self.request(Command::Shutdown).await
    }

    /// Observe state broadcasts and warnings of a pid
    pub fn subscribe<F>(&self, pid: &str, callback: F) -> Subscription
    where
        F: Fn(&ProcessEvent) + Send + Sync + 'static,
    {
        let callback: ProcessCallback = Arc::new(callback);
        self.subscribers.subscribe(pid, callback)
    }

    pub fn subscribe_registry_changes<F>(&self, callback: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        let callback: RegistryCallback = Arc::new(callback);
        self.subscribers.subscribe_registry(callback)
    }

    /// Last state broadcast by a pid
    pub fn cached_state(&self, pid: &str) -> Option<Value> {
        self.subscribers.cached(pid)
    }

    pub fn stats(&self) -> KernelStats {
        self.metrics.snapshot()
    }

    pub fn engine_stats(&self) -> EngineStats {
        self.engine.stats()
    }

    /// Dispatch sink for a view mounted outside the actor
    pub fn dispatcher(&self, pid: &str) -> DispatchFn {
        let commands = self.commands.clone();
        let pid = pid.to_string();
        Arc::new(move |action| {
            let sent = commands.send(Command::Dispatch {
                pid: pid.clone(),
                action,
                reply: None,
            });
            if sent.is_err() {
                warn!(pid = %pid, "Dispatch after supervisor shutdown");
            }
        })
    }
}

/// Assembles the supervisor's collaborators and boots it
pub struct KernelBuilder {
    config: KernelConfig,
    directory: Option<Arc<dyn ArtifactDirectory>>,
    resource_store: Option<Arc<dyn DocumentStore>>,
    registry_store: Option<Arc<dyn DocumentStore>>,
    transport: Option<Arc<dyn Transport>>,
    engine: Option<Arc<Engine>>,
}

impl KernelBuilder {
    pub fn new(config: KernelConfig) -> Self {
        Self {
            config,
            directory: None,
            resource_store: None,
            registry_store: None,
            transport: None,
            engine: None,
        }
    }

    /// Artifact directory (default: a local directory at `apps_dir`)
    pub fn with_directory(mut self, directory: Arc<dyn ArtifactDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    pub fn with_resource_store(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.resource_store = Some(store);
        self
    }

    pub fn with_registry_store(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.registry_store = Some(store);
        self
    }

    /// Network transport behind the capability `fetch`
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Share a compile cache between kernels
    pub fn with_engine(mut self, engine: Arc<Engine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Run the boot sequence and spawn the supervisor actor
    pub async fn boot(self) -> KernelResult<Kernel> {
        let config = self.config;
        let directory = self
            .directory
            .unwrap_or_else(|| Arc::new(LocalDirectory::new(config.apps_dir.clone())));
        let resource_store = self
            .resource_store
            .unwrap_or_else(|| Arc::new(MemoryStore::new(KernelConfig::resource_store())));
        let registry_store = self
            .registry_store
            .unwrap_or_else(|| Arc::new(MemoryStore::new(KernelConfig::registry_store())));
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(HttpTransport::new()));
        let engine = self.engine.unwrap_or_else(|| Arc::new(Engine::new()));

        let (tx, rx) = mpsc::unbounded_channel();
        let subscribers = Subscribers::new();
        let metrics = Arc::new(KernelMetrics::new());

        let mut state = KernelState {
            config,
            catalog: Catalog::new(resource_store),
            registry: Collection::new(registry_store),
            directory,
            engine: Arc::clone(&engine),
            transport,
            leases: Arc::new(LeaseTable::new()),
            apps: AHashMap::new(),
            contexts: AHashMap::new(),
            streams: StreamMap::new(),
            subscribers: Arc::clone(&subscribers),
            metrics: Arc::clone(&metrics),
            loading: AHashMap::new(),
            dirty: AHashSet::new(),
            commands: tx.downgrade(),
        };
        state.boot().await?;
        tokio::spawn(state.run(rx));
        info!("Kernel ready");

        Ok(Kernel {
            commands: tx,
            subscribers,
            metrics,
            engine,
        })
    }
}
