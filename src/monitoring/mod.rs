/*!
 * Monitoring
 * Structured tracing and supervisor counters
 */

mod metrics;
mod tracer;

pub use metrics::{KernelMetrics, KernelStats};
pub use tracer::{generate_trace_id, init_tracing, span_operation, OperationSpan};
