/*!
 * Lexical Environments
 */

use super::ast::FunctionDecl;
use super::types::{RuntimeError, RuntimeResult};
use super::value::{Closure, Value};
use ahash::AHashMap;
use parking_lot::RwLock;
use std::sync::{Arc, Weak};

/// Stored binding
///
/// A closure over the scope that holds it is kept as its declaration only,
/// so a scope never owns a strong reference to itself.
enum Slot {
    Value(Value),
    Own(Arc<FunctionDecl>),
}

/// One lexical scope with a link to its parent
pub struct Env {
    vars: RwLock<AHashMap<String, Slot>>,
    parent: Option<Arc<Env>>,
    this: Weak<Env>,
}

impl Env {
    pub fn root() -> Arc<Env> {
        Self::with_parent(None)
    }

    pub fn child(parent: &Arc<Env>) -> Arc<Env> {
        Self::with_parent(Some(Arc::clone(parent)))
    }

    fn with_parent(parent: Option<Arc<Env>>) -> Arc<Env> {
        Arc::new_cyclic(|this| Env {
            vars: RwLock::new(AHashMap::new()),
            parent,
            this: this.clone(),
        })
    }

    fn slot(&self, value: Value) -> Slot {
        match value {
            Value::Function(closure) if std::ptr::eq(Arc::as_ptr(&closure.env), self) => {
                Slot::Own(Arc::clone(&closure.decl))
            }
            other => Slot::Value(other),
        }
    }

    fn read(&self, slot: &Slot) -> Value {
        match slot {
            Slot::Value(value) => value.clone(),
            Slot::Own(decl) => match self.this.upgrade() {
                Some(env) => Value::Function(Arc::new(Closure {
                    decl: Arc::clone(decl),
                    env,
                })),
                None => Value::Null,
            },
        }
    }

    /// Bind in this scope, shadowing outer bindings
    pub fn define(&self, name: impl Into<String>, value: Value) {
        let slot = self.slot(value);
        self.vars.write().insert(name.into(), slot);
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(slot) = self.vars.read().get(name) {
            return Some(self.read(slot));
        }
        self.parent.as_ref().and_then(|p| p.get(name))
    }

    /// Binding in this scope only
    pub fn get_local(&self, name: &str) -> Option<Value> {
        self.vars.read().get(name).map(|slot| self.read(slot))
    }

    /// Update the nearest binding of `name`
    pub fn assign(&self, name: &str, value: Value) -> RuntimeResult<()> {
        {
            let mut vars = self.vars.write();
            if vars.contains_key(name) {
                let slot = self.slot(value);
                vars.insert(name.to_string(), slot);
                return Ok(());
            }
        }
        match &self.parent {
            Some(parent) => parent.assign(name, value),
            None => Err(RuntimeError::Reference(name.to_string())),
        }
    }

    /// Drop every binding of this scope
    ///
    /// Values stored here may still capture the scope through objects.
    pub fn clear(&self) {
        self.vars.write().clear();
    }
}
