/*!
 * Boot Sequence
 * Brings the registry up from the stores and the artifact directory
 */

use super::actor::KernelState;
use crate::codec::encode;
use crate::core::errors::KernelError;
use crate::core::types::{system_pid, KernelResult, Pid};
use crate::process::{AppRecord, AppStatus};
use tracing::{error, info, warn};

impl KernelState {
    /// Run every boot phase in order; only directory access and store reads are fatal
    pub(crate) async fn boot(&mut self) -> KernelResult<()> {
        let access = self.directory.ensure_access().await?;
        if !access.is_granted() {
            return Err(KernelError::PermissionDenied(self.directory.name().to_string()));
        }
        info!(directory = %self.directory.name(), "Directory access granted");

        self.catalog.ensure_presets().await?;
        self.catalog.load_all().await?;
        self.register_system_apps();
        self.load_user_apps().await?;

        if self.config.materialize_on_boot {
            self.materialize_artifacts().await;
        }

        let report = self.reconcile().await?;
        for (artifact, error) in &report.failures {
            warn!(artifact = %artifact, %error, "Reconciliation failure at boot");
        }

        self.restore_session().await;
        info!(apps = self.apps.len(), "Boot complete");
        Ok(())
    }

    fn register_system_apps(&mut self) {
        let records: Vec<AppRecord> = self
            .catalog
            .system_resources()
            .into_iter()
            .map(|resource| {
                let mut meta_info = resource.meta_info.clone();
                meta_info.name = Some(resource.name.clone());
                AppRecord::new(system_pid(&resource.id), resource.name.clone(), resource.id.clone())
                    .with_meta_info(meta_info)
                    .system()
            })
            .collect();
        for record in records {
            self.apps.insert(record.pid.clone(), record);
        }
    }

    async fn load_user_apps(&mut self) -> KernelResult<()> {
        let records = self.registry.get_all().await?;
        info!(count = records.len(), "User apps loaded");
        for record in records {
            if record.is_system_app {
                continue;
            }
            self.apps.insert(record.pid.clone(), record);
        }
        Ok(())
    }

    /// Write artifacts for user resources no entry points at
    async fn materialize_artifacts(&mut self) {
        let pending: Vec<(String, String)> = self
            .catalog
            .user_resources()
            .filter(|resource| !self.apps.values().any(|r| r.resource_id == resource.id))
            .map(|resource| (self.config.artifact_name(&resource.name), encode(resource)))
            .collect();

        for (name, text) in pending {
            if self.directory.exists(&name).await {
                continue;
            }
            match self.directory.write(&name, &text).await {
                Ok(()) => info!(artifact = %name, "Artifact materialized"),
                Err(e) => warn!(artifact = %name, error = %e, "Failed to materialize artifact"),
            }
        }
    }

    /// Replay `start` for every entry left RUNNING or HIBERNATED
    async fn restore_session(&mut self) {
        let mut active: Vec<(Pid, AppStatus)> = self
            .apps
            .values()
            .filter(|r| r.status.is_active())
            .map(|r| (r.pid.clone(), r.status))
            .collect();
        active.sort_by(|a, b| a.0.cmp(&b.0));

        for (pid, status) in active {
            if let Err(e) = self.start(&pid, None).await {
                error!(pid = %pid, error = %e, "Failed to restore app");
                continue;
            }
            // Background apps come back alive but stay hidden
            if status == AppStatus::Hibernated {
                if let Err(e) = self.hibernate(&pid).await {
                    error!(pid = %pid, error = %e, "Failed to re-hibernate app");
                }
            }
        }
    }
}
