/*!
 * Kernel test harness
 * In-memory stores, directory and transport around a booted kernel
 */

#![allow(dead_code)]

use desk_kernel::catalog::{ResourceContent, UploadMeta, UploadRequest};
use desk_kernel::core::Pid;
use desk_kernel::store::DocumentStore;
use desk_kernel::{
    Kernel, KernelConfig, KernelResult, MemDirectory, MemoryStore, RecordingTransport,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

pub const COUNTER_VIEW: &str = r#"export default fn(props) { return h("p", null, props.state.count); };"#;

pub const COUNTER_LOGIC: &str = r#"
let initialState = { count: 0 };
fn reducer(state, action) {
    if (action.type == "INC") { return { ...state, count: state.count + 1 }; }
    return state;
}
"#;

/// Collaborators shared across kernel instances
#[derive(Clone)]
pub struct Harness {
    pub config: KernelConfig,
    pub directory: Arc<MemDirectory>,
    pub resources: Arc<MemoryStore>,
    pub registry: Arc<MemoryStore>,
    pub transport: Arc<RecordingTransport>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(KernelConfig::default())
    }

    pub fn with_config(config: KernelConfig) -> Self {
        Self {
            config,
            directory: Arc::new(MemDirectory::new()),
            resources: Arc::new(MemoryStore::new(KernelConfig::resource_store())),
            registry: Arc::new(MemoryStore::new(KernelConfig::registry_store())),
            transport: Arc::new(RecordingTransport::new().with_response(200, "{}")),
        }
    }

    pub async fn boot(&self) -> KernelResult<Kernel> {
        let resources: Arc<dyn DocumentStore> = self.resources.clone();
        let registry: Arc<dyn DocumentStore> = self.registry.clone();
        Kernel::builder(self.config.clone())
            .with_directory(self.directory.clone())
            .with_resource_store(resources)
            .with_registry_store(registry)
            .with_transport(self.transport.clone())
            .boot()
            .await
    }
}

pub fn upload(name: &str, seed: &str, logic: &str) -> UploadRequest {
    UploadRequest {
        name: name.to_string(),
        is_bundle: false,
        content: ResourceContent::Single(COUNTER_VIEW.to_string()),
        logic: Some(logic.to_string()),
        meta_info: UploadMeta {
            author_id: Some("tester".to_string()),
            seed: Some(seed.to_string()),
            ..UploadMeta::default()
        },
    }
}

/// Upload the counter app and return its pid
pub async fn install_counter(kernel: &Kernel, name: &str) -> Pid {
    let id = kernel
        .upload_resource(upload(name, &format!("seed-{}", name), COUNTER_LOGIC))
        .await
        .unwrap();
    pid_of(kernel, &id).await
}

pub async fn pid_of(kernel: &Kernel, resource_id: &str) -> Pid {
    kernel
        .list_apps()
        .await
        .unwrap()
        .into_iter()
        .find(|app| app.resource_id == resource_id && !app.is_system_app)
        .map(|app| app.pid)
        .expect("no registry entry for resource")
}

/// Poll the cached state until `check` accepts it
pub async fn wait_for_state<F>(kernel: &Kernel, pid: &str, check: F) -> Value
where
    F: Fn(&Value) -> bool,
{
    for _ in 0..200 {
        if let Some(state) = kernel.cached_state(pid) {
            if check(&state) {
                return state;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("state of {} never matched; last: {:?}", pid, kernel.cached_state(pid));
}

/// Give the actor and contexts a moment to settle
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
