/*!
 * Compile Engine
 * Source to reusable factories, cached by content fingerprint
 */

use super::ast::Program;
use super::env::Env;
use super::globals::ambient_scope;
use super::interpreter::Interpreter;
use super::parser::parse;
use super::types::{Cancellation, CompileResult, RuntimeResult};
use super::value::Value;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// UI primitives re-bound as bare names in the preamble scope
const UI_PRIMITIVES: [&str; 6] = ["h", "fragment", "use_state", "use_memo", "use_effect", "use_ref"];

/// Compile cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    pub compilations: u64,
    pub cache_hits: u64,
    pub cached: usize,
}

/// Compiler with a process-lifetime cache
///
/// Identical source text compiles at most once; failures are cached too.
#[derive(Default)]
pub struct Engine {
    cache: DashMap<[u8; 32], CompileResult<Arc<Factory>>>,
    compilations: AtomicU64,
    cache_hits: AtomicU64,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compile(&self, source: &str) -> CompileResult<Arc<Factory>> {
        let fingerprint = *blake3::hash(source.as_bytes()).as_bytes();
        if let Some(hit) = self.cache.get(&fingerprint) {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
            return hit.value().clone();
        }

        let result = self
            .cache
            .entry(fingerprint)
            .or_insert_with(|| {
                self.compilations.fetch_add(1, Ordering::Relaxed);
                match parse(source) {
                    Ok(program) => {
                        debug!(
                            fingerprint = %blake3::Hash::from(fingerprint).to_hex(),
                            statements = program.body.len(),
                            "Compiled source"
                        );
                        Ok(Arc::new(Factory { program }))
                    }
                    Err(e) => {
                        warn!(error = %e, "Compilation failed");
                        Err(e)
                    }
                }
            })
            .value()
            .clone();
        result
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            compilations: self.compilations.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cached: self.cache.len(),
        }
    }
}

/// A compiled program, runnable any number of times
#[derive(Debug)]
pub struct Factory {
    program: Program,
}

impl Factory {
    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Run the program with `capabilities` bound as `sdk`
    ///
    /// `module.exports` and the `exports` object both receive exports; a
    /// replaced `module.exports` wins. Setting `cancel` stops the top level
    /// and every later call made through the module.
    pub fn instantiate(
        &self,
        capabilities: &Value,
        module: &Value,
        exports: &Value,
        cancel: Cancellation,
    ) -> RuntimeResult<LoadedModule> {
        let fetch = capabilities.field("API").field("fetch");
        let ambient = ambient_scope(Some(fetch));

        let preamble = Env::child(&ambient);
        preamble.define("sdk", capabilities.clone());
        let ui = capabilities.field("UI");
        for name in UI_PRIMITIVES {
            preamble.define(name, ui.field(name));
        }

        let scope = Env::child(&preamble);
        scope.define("module", module.clone());
        scope.define("exports", exports.clone());

        Interpreter::with_ambient(Arc::clone(&ambient))
            .with_cancellation(cancel.clone())
            .run_program(&self.program, &scope, exports)?;

        let exports = match module.field("exports") {
            Value::Object(cell) => Value::Object(cell),
            _ => exports.clone(),
        };
        Ok(LoadedModule {
            exports,
            scope,
            ambient,
            cancel,
        })
    }

    /// Instantiate with fresh `module` / `exports` receptacles
    pub fn load(&self, capabilities: &Value) -> RuntimeResult<LoadedModule> {
        self.load_cancellable(capabilities, Cancellation::new())
    }

    pub fn load_cancellable(
        &self,
        capabilities: &Value,
        cancel: Cancellation,
    ) -> RuntimeResult<LoadedModule> {
        let exports = Value::empty_object();
        let module = Value::object_from([("exports", exports.clone())]);
        self.instantiate(capabilities, &module, &exports, cancel)
    }
}

/// An instantiated program: its exports and top-level bindings
pub struct LoadedModule {
    exports: Value,
    scope: Arc<Env>,
    ambient: Arc<Env>,
    cancel: Cancellation,
}

impl LoadedModule {
    pub fn exports(&self) -> &Value {
        &self.exports
    }

    /// Export by name, null when absent
    pub fn export(&self, name: &str) -> Value {
        self.exports.field(name)
    }

    /// Top-level binding such as `initialState` or `reducer`
    pub fn binding(&self, name: &str) -> Option<Value> {
        self.scope.get_local(name)
    }

    /// Interpreter sharing this module's ambient scope and stop flag
    pub fn interpreter(&self) -> Interpreter {
        Interpreter::with_ambient(Arc::clone(&self.ambient)).with_cancellation(self.cancel.clone())
    }

    pub fn call(&self, function: &Value, args: Vec<Value>) -> RuntimeResult<Value> {
        self.interpreter().call(function, args)
    }
}

impl Drop for LoadedModule {
    fn drop(&mut self) {
        // Top-level closures stored in objects point back at the scope
        self.scope.clear();
    }
}
