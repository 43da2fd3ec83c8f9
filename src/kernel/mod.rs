/*!
 * Kernel Module
 * Process supervisor: lifecycle, supervisor calls and reconciliation
 */

mod actor;
mod boot;
mod calls;
mod handle;
mod lifecycle;
mod reconcile;
pub mod subscribers;
pub mod types;

// Re-exports
pub use handle::{Kernel, KernelBuilder};
pub use subscribers::{ProcessCallback, RegistryCallback, Subscribers, Subscription};
pub use types::{AppQuery, KernelCall, ReconcileReport, KERNEL_CALL};
