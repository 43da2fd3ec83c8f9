/*!
 * Desk Kernel Library
 * Supervisor for sandboxed desktop apps exposed as a library
 */

pub mod catalog;
pub mod codec;
pub mod core;
pub mod kernel;
pub mod monitoring;
pub mod process;
pub mod sandbox;
pub mod store;
pub mod vfs;

// Re-exports
pub use catalog::{Catalog, MetaInfo, Resource, ResourceContent, UploadMeta, UploadRequest};
pub use codec::{decode, decode_header, encode, DecodeError};
pub use crate::core::{
    KernelConfig, KernelError, KernelResult, LaunchError, Pid, ResourceId, WindowRect, WindowSize,
};
pub use kernel::{Kernel, KernelBuilder, ReconcileReport, Subscription};
pub use monitoring::{init_tracing, KernelMetrics, KernelStats};
pub use process::{AppRecord, AppStatus, ProcessEvent, SavedState};
pub use sandbox::{Engine, HttpTransport, RecordingTransport, Transport, ViewHost};
pub use store::{DocumentStore, FileStore, MemoryStore};
pub use vfs::{ArtifactDirectory, LocalDirectory, MemDirectory};
