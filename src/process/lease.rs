/*!
 * Artifact Leases
 * Revocable references to the artifact text a context was started from
 */

use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

const LEASE_SCHEME: &str = "blob:";

/// Handle to one leased artifact text
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Lease {
    key: String,
}

impl Lease {
    pub fn key(&self) -> &str {
        &self.key
    }
}

/// Table of live leases shared by the supervisor and its contexts
#[derive(Debug, Default)]
pub struct LeaseTable {
    blobs: DashMap<String, Arc<str>>,
}

impl LeaseTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `text` under a fresh `blob:<uuid>` key
    pub fn lease(&self, text: impl Into<Arc<str>>) -> Lease {
        let key = format!("{}{}", LEASE_SCHEME, Uuid::new_v4());
        self.blobs.insert(key.clone(), text.into());
        Lease { key }
    }

    pub fn resolve(&self, lease: &Lease) -> Option<Arc<str>> {
        self.blobs.get(&lease.key).map(|text| Arc::clone(text.value()))
    }

    /// Drop a lease; later resolves fail
    pub fn revoke(&self, lease: &Lease) -> bool {
        let revoked = self.blobs.remove(&lease.key).is_some();
        if revoked {
            debug!(lease = %lease.key, "Lease revoked");
        }
        revoked
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}
