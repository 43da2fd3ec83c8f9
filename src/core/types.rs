/*!
 * Core Types
 * Common types used across the kernel
 */

use serde::{Deserialize, Serialize};

/// Runtime identity of a registered application
pub type Pid = String;

/// Stable identity of a catalog resource
pub type ResourceId = String;

/// Common result type for kernel operations
pub type KernelResult<T> = Result<T, super::errors::KernelError>;

/// Prefix of the deterministic pid given to system apps
pub const SYSTEM_PID_PREFIX: &str = "system-pid-";

/// Derive the pid of a system app from its resource id
pub fn system_pid(resource_id: &str) -> Pid {
    format!("{}{}", SYSTEM_PID_PREFIX, resource_id)
}

/// Window geometry last reported by the presentation layer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowRect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl WindowRect {
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }
}

impl Default for WindowRect {
    fn default() -> Self {
        Self {
            x: 100.0,
            y: 100.0,
            w: 500.0,
            h: 400.0,
        }
    }
}

/// Width/height pair used for initial window sizes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowSize {
    pub w: f64,
    pub h: f64,
}

impl WindowSize {
    pub fn new(w: f64, h: f64) -> Self {
        Self { w, h }
    }

    /// Grow each dimension to at least the given minimum
    pub fn clamp_min(self, min: WindowSize) -> Self {
        Self {
            w: self.w.max(min.w),
            h: self.h.max(min.h),
        }
    }
}

impl Default for WindowSize {
    fn default() -> Self {
        Self { w: 500.0, h: 400.0 }
    }
}
