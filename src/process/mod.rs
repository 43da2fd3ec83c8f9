/*!
 * Process Module
 * Registry records, execution contexts and artifact leases
 */

pub mod context;
pub mod lease;
pub mod types;

// Re-export for convenience
pub use context::ExecutionContext;
pub use lease::{Lease, LeaseTable};
pub use types::{AppRecord, AppStatus, ContextEvent, ContextMessage, ProcessEvent, SavedState};
