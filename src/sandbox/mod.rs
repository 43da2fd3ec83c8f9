/*!
 * Sandbox Module
 * Script dialect, compile cache, capability scope and view rendering
 *
 * App code never sees host globals: it runs below a preamble that binds
 * the injected capabilities, itself below an ambient scope whose network
 * names are shadowed.
 */

pub mod ast;
pub mod capability;
pub mod engine;
pub mod env;
pub mod globals;
pub mod interpreter;
pub mod isolate;
pub mod lexer;
pub mod parser;
pub mod render;
pub mod transport;
pub mod types;
pub mod value;

// Re-exports
pub use capability::{create_capability_scope, DispatchFn, SYSTEM_COMPONENTS};
pub use engine::{Engine, EngineStats, Factory, LoadedModule};
pub use isolate::{spawn_isolated, SCRIPT_STACK_SIZE};
pub use render::{scope_css, ViewHost};
pub use transport::{
    FetchRequest, FetchResponse, HttpTransport, RecordingTransport, Transport, PROCESS_ID_HEADER,
};
pub use types::{Cancellation, CompileError, CompileResult, RuntimeError, RuntimeResult, Span};
pub use value::Value;
