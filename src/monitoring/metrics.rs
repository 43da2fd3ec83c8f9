/*!
 * Kernel Metrics
 * Atomic counters for the supervisor hot paths
 */

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free supervisor counters
///
/// All operations use relaxed ordering; [`KernelMetrics::snapshot`]
/// gives a point-in-time copy.
#[derive(Debug, Default)]
pub struct KernelMetrics {
    contexts_spawned: AtomicU64,
    contexts_terminated: AtomicU64,
    init_messages: AtomicU64,
    restore_messages: AtomicU64,
    routed: AtomicU64,
    kernel_calls: AtomicU64,
    security_violations: AtomicU64,
    failed_flushes: AtomicU64,
}

/// Point-in-time copy of [`KernelMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelStats {
    pub contexts_spawned: u64,
    pub contexts_terminated: u64,
    pub live_contexts: u64,
    pub init_messages: u64,
    pub restore_messages: u64,
    pub routed: u64,
    pub kernel_calls: u64,
    pub security_violations: u64,
    pub failed_flushes: u64,
}

impl KernelMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline(always)]
    pub fn inc_spawned(&self) {
        self.contexts_spawned.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_terminated(&self) {
        self.contexts_terminated.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_init(&self) {
        self.init_messages.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_restore(&self) {
        self.restore_messages.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_routed(&self) {
        self.routed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_kernel_calls(&self) {
        self.kernel_calls.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_security_violations(&self) {
        self.security_violations.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_failed_flushes(&self) {
        self.failed_flushes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> KernelStats {
        let spawned = self.contexts_spawned.load(Ordering::Relaxed);
        let terminated = self.contexts_terminated.load(Ordering::Relaxed);
        KernelStats {
            contexts_spawned: spawned,
            contexts_terminated: terminated,
            live_contexts: spawned.saturating_sub(terminated),
            init_messages: self.init_messages.load(Ordering::Relaxed),
            restore_messages: self.restore_messages.load(Ordering::Relaxed),
            routed: self.routed.load(Ordering::Relaxed),
            kernel_calls: self.kernel_calls.load(Ordering::Relaxed),
            security_violations: self.security_violations.load(Ordering::Relaxed),
            failed_flushes: self.failed_flushes.load(Ordering::Relaxed),
        }
    }
}
