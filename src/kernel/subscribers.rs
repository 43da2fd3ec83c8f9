/*!
 * Subscribers
 * Per-pid state observers and registry-change listeners
 */

use crate::core::types::Pid;
use crate::process::ProcessEvent;
use ahash::AHashMap;
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

pub type ProcessCallback = Arc<dyn Fn(&ProcessEvent) + Send + Sync>;
pub type RegistryCallback = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Topic {
    Process(Pid),
    Registry,
}

/// Observer hub plus the last broadcast state of every pid
#[derive(Default)]
pub struct Subscribers {
    next_id: AtomicU64,
    process: RwLock<AHashMap<Pid, Vec<(u64, ProcessCallback)>>>,
    registry: RwLock<Vec<(u64, RegistryCallback)>>,
    cache: RwLock<AHashMap<Pid, Value>>,
}

impl Subscribers {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Observe a pid; the cached state, if any, is delivered immediately
    pub fn subscribe(self: &Arc<Self>, pid: &str, callback: ProcessCallback) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.process
            .write()
            .entry(pid.to_string())
            .or_default()
            .push((id, Arc::clone(&callback)));

        if let Some(state) = self.cached(pid) {
            callback(&ProcessEvent::State(state));
        }
        Subscription::new(id, Topic::Process(pid.to_string()), self)
    }

    pub fn subscribe_registry(self: &Arc<Self>, callback: RegistryCallback) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry.write().push((id, callback));
        Subscription::new(id, Topic::Registry, self)
    }

    /// Deliver an event to every observer of `pid`
    pub fn notify(&self, pid: &str, event: ProcessEvent) {
        // Callbacks run outside the lock so they may subscribe or unsubscribe
        let callbacks: Vec<ProcessCallback> = self
            .process
            .read()
            .get(pid)
            .map(|subs| subs.iter().map(|(_, cb)| Arc::clone(cb)).collect())
            .unwrap_or_default();
        for callback in callbacks {
            callback(&event);
        }
    }

    /// Replay the cached state to observers of `pid`
    pub fn notify_cached(&self, pid: &str) {
        if let Some(state) = self.cached(pid) {
            self.notify(pid, ProcessEvent::State(state));
        }
    }

    pub fn emit_change(&self) {
        let callbacks: Vec<RegistryCallback> =
            self.registry.read().iter().map(|(_, cb)| Arc::clone(cb)).collect();
        for callback in callbacks {
            callback();
        }
    }

    pub fn cache_state(&self, pid: &str, state: Value) {
        self.cache.write().insert(pid.to_string(), state);
    }

    pub fn cached(&self, pid: &str) -> Option<Value> {
        self.cache.read().get(pid).cloned()
    }

    pub fn clear_state(&self, pid: &str) {
        self.cache.write().remove(pid);
    }

    pub fn subscriber_count(&self, pid: &str) -> usize {
        self.process.read().get(pid).map_or(0, Vec::len)
    }

    fn remove(&self, id: u64, topic: &Topic) {
        match topic {
            Topic::Process(pid) => {
                let mut process = self.process.write();
                if let Some(subs) = process.get_mut(pid) {
                    subs.retain(|(sub, _)| *sub != id);
                    if subs.is_empty() {
                        process.remove(pid);
                    }
                }
            }
            Topic::Registry => self.registry.write().retain(|(sub, _)| *sub != id),
        }
    }
}

/// Live subscription; dropping it unsubscribes
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    topic: Topic,
    hub: Weak<Subscribers>,
}

impl Subscription {
    fn new(id: u64, topic: Topic, hub: &Arc<Subscribers>) -> Self {
        Self {
            id,
            topic,
            hub: Arc::downgrade(hub),
        }
    }

    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.remove(self.id, &self.topic);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .finish()
    }
}
