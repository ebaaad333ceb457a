//! The typed failure value surfaced by the transfer lowering pass.
//!
//! Lowering is deterministic graph surgery: a failing input fails identically
//! on retry, so errors are returned to the orchestrating pass immediately and
//! never retried or masked. The only recoverable kind is *invalid argument*
//! (missing cluster/function context, unresolved device mesh); internal
//! invariant violations are asserts, not error values.

use std::fmt;

use serde::Serialize;

/// An error produced while lowering an abstract transfer op.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum LowerError {
    /// Required context was absent or malformed on the input program.
    InvalidArgument(String),
}

impl LowerError {
    /// Create an *invalid argument* error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}

impl fmt::Display for LowerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
        }
    }
}

impl std::error::Error for LowerError {}
