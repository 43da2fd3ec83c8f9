/*!
 * Reconciliation
 * Aligns the registry, the catalog and the physical artifacts
 *
 * Safe to re-run: a consistent directory only refreshes handles.
 */

use super::actor::KernelState;
use super::types::ReconcileReport;
use crate::codec::{decode, decode_header};
use crate::core::errors::KernelError;
use crate::core::types::KernelResult;
use crate::process::AppRecord;
use crate::vfs::{ArtifactEntry, ArtifactHandle};
use ahash::AHashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// What to do with an artifact that no registry entry claims
enum Verdict {
    Register(AppRecord),
    Remove(String),
    Skip(String),
}

impl KernelState {
    pub(crate) async fn reconcile(&mut self) -> KernelResult<ReconcileReport> {
        let entries: Vec<ArtifactEntry> = self
            .directory
            .list()
            .await?
            .into_iter()
            .filter(|entry| self.config.is_artifact(&entry.name))
            .collect();

        let mut report = ReconcileReport::default();
        let mut observed = AHashSet::with_capacity(entries.len());
        let mut doomed = Vec::new();

        for entry in entries {
            observed.insert(entry.name.clone());
            let handle = ArtifactHandle::new(entry.name.clone(), Arc::clone(&self.directory));

            let known = self
                .apps
                .values_mut()
                .find(|r| !r.is_system_app && r.name == entry.name);
            if let Some(record) = known {
                record.handle = Some(handle);
                report.refreshed.push(entry.name);
                continue;
            }

            match self.inspect(&handle).await {
                Verdict::Register(record) => {
                    info!(artifact = %entry.name, pid = %record.pid, resource_id = %record.resource_id, "Artifact registered");
                    let pid = record.pid.clone();
                    if let Err(e) = self.registry.put(&record).await {
                        warn!(artifact = %entry.name, error = %e, "Registry write failed; will retry");
                        self.metrics.inc_failed_flushes();
                        self.dirty.insert(pid.clone());
                        report.failures.push((entry.name.clone(), e.to_string()));
                    }
                    self.apps.insert(pid, record);
                    report.registered.push(entry.name);
                }
                Verdict::Remove(reason) => {
                    debug!(artifact = %entry.name, %reason, "Artifact marked for removal");
                    doomed.push(entry.name);
                }
                Verdict::Skip(error) => {
                    warn!(artifact = %entry.name, %error, "Artifact skipped");
                    report.failures.push((entry.name, error));
                }
            }
        }

        let orphans: Vec<(String, String)> = self
            .apps
            .values()
            .filter(|r| !r.is_system_app && !observed.contains(&r.name))
            .map(|r| (r.pid.clone(), r.name.clone()))
            .collect();
        for (pid, name) in orphans {
            let killed = self.kill_context(&pid);
            self.subscribers.clear_state(&pid);
            self.apps.remove(&pid);
            self.dirty.remove(&pid);
            if let Err(e) = self.registry.delete(&name).await {
                warn!(pid = %pid, error = %e, "Failed to delete orphan record");
                report.failures.push((name.clone(), e.to_string()));
            }
            info!(pid = %pid, artifact = %name, killed, "Orphan entry purged");
            report.purged.push(name);
        }

        for name in doomed {
            match self.directory.remove(&name).await {
                Ok(()) => report.removed.push(name),
                Err(e) => {
                    warn!(artifact = %name, error = %e, "Failed to remove artifact");
                    report.failures.push((name, e.to_string()));
                }
            }
        }

        if !report.is_quiet() || !report.failures.is_empty() {
            info!(
                refreshed = report.refreshed.len(),
                registered = report.registered.len(),
                purged = report.purged.len(),
                removed = report.removed.len(),
                failures = report.failures.len(),
                "Reconciliation finished"
            );
        }
        Ok(report)
    }

    /// Classify an unclaimed artifact by its header
    async fn inspect(&mut self, handle: &ArtifactHandle) -> Verdict {
        let text = match handle.read().await {
            Ok(text) => text,
            Err(e) => return Verdict::Skip(e.to_string()),
        };
        let header = match decode_header(&text) {
            Ok(header) => header,
            Err(e) => return Verdict::Remove(e.to_string()),
        };
        let id = header.resource_id.as_str();

        if self.catalog.is_system(id) {
            return Verdict::Remove(format!("system resource {}", id));
        }
        if let Some(resource) = self.catalog.get(id) {
            let mut meta_info = resource.meta_info.clone();
            meta_info.name = Some(resource.name.clone());
            let record = AppRecord::new(Uuid::new_v4().to_string(), handle.name(), id)
                .with_meta_info(meta_info)
                .with_handle(handle.clone());
            return Verdict::Register(record);
        }
        if !self.config.auto_register_unknown {
            return Verdict::Remove(format!("unknown resource {}", id));
        }

        match self.adopt(&text, handle).await {
            Ok(record) => Verdict::Register(record),
            Err(e) => Verdict::Remove(e.to_string()),
        }
    }

    /// Decode a whole artifact into a new catalog resource and record
    async fn adopt(&mut self, text: &str, handle: &ArtifactHandle) -> KernelResult<AppRecord> {
        let resource = decode(text)?
            .into_resource()
            .ok_or_else(|| KernelError::InvalidResource("artifact header has no name".into()))?;
        let mut meta_info = resource.meta_info.clone();
        meta_info.name = Some(resource.name.clone());
        let record = AppRecord::new(Uuid::new_v4().to_string(), handle.name(), resource.id.clone())
            .with_meta_info(meta_info)
            .with_handle(handle.clone());
        info!(resource_id = %resource.id, artifact = %handle.name(), "Adopting unknown resource");
        self.catalog.put(resource).await?;
        Ok(record)
    }
}
