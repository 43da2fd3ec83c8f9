/*!
 * Durable Store Module
 * Key/document persistence with secondary indexes
 */

pub mod collection;
pub mod file;
pub mod memory;
pub mod traits;
pub mod types;

// Re-exports
pub use collection::Collection;
pub use file::FileStore;
pub use memory::MemoryStore;
pub use traits::DocumentStore;
pub use types::{IndexSpec, StoreConfig, StoreError, StoreResult};
