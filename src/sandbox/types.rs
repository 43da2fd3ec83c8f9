/*!
 * Sandbox Types
 * Compile and runtime errors of the script engine
 */

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Source position, 1-based
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Span {
    pub line: u32,
    pub col: u32,
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// Structured compile failure; cached like a successful compile
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CompileError {
    #[error("{at}: unexpected character '{ch}'")]
    UnexpectedChar { ch: char, at: Span },

    #[error("{at}: unterminated string literal")]
    UnterminatedString { at: Span },

    #[error("{at}: unterminated block comment")]
    UnterminatedComment { at: Span },

    #[error("{at}: expected {expected}, found {found}")]
    Unexpected {
        expected: String,
        found: String,
        at: Span,
    },

    #[error("{at}: {message}")]
    Invalid { message: String, at: Span },
}

impl CompileError {
    pub fn span(&self) -> Span {
        match self {
            CompileError::UnexpectedChar { at, .. }
            | CompileError::UnterminatedString { at }
            | CompileError::UnterminatedComment { at }
            | CompileError::Unexpected { at, .. }
            | CompileError::Invalid { at, .. } => *at,
        }
    }
}

pub type CompileResult<T> = Result<T, CompileError>;

/// Failure while running compiled code
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RuntimeError {
    /// Blocked ambient capability; callers must use the injected substitute
    #[error("Security violation: {0}")]
    SecurityViolation(String),

    #[error("{0} is not defined")]
    Reference(String),

    #[error("Type error: {0}")]
    Type(String),

    #[error("Cannot assign to '{0}' of a frozen object")]
    Frozen(String),

    #[error("Maximum call depth exceeded")]
    CallDepth,

    /// The owning context was torn down mid-evaluation
    #[error("Execution cancelled")]
    Cancelled,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("{0}")]
    Thrown(String),
}

impl RuntimeError {
    pub fn is_security_violation(&self) -> bool {
        matches!(self, RuntimeError::SecurityViolation(_))
    }
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Maximum nesting of script function calls
pub const MAX_CALL_DEPTH: usize = 64;

/// Shared stop flag polled by running code
///
/// Clones observe the same flag; once set it stays set.
#[derive(Debug, Clone, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub(crate) fn check(&self) -> RuntimeResult<()> {
        if self.is_cancelled() {
            Err(RuntimeError::Cancelled)
        } else {
            Ok(())
        }
    }
}
