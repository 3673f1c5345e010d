//! Error taxonomy for the session and the marshaller.

use std::fmt;

use pyo3::prelude::*;
use thiserror::Error;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Which way a conversion was heading when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// `HostValue` → Python object.
    HostToPy,
    /// Python object → `HostValue`.
    PyToHost,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::HostToPy => f.write_str("the host value to a Python object"),
            Direction::PyToHost => f.write_str("the Python object to a host value"),
        }
    }
}

/// Everything that can go wrong while driving the interpreter.
#[derive(Debug, Error)]
pub enum Error {
    /// The interpreter could not be brought up.  The session is unusable.
    #[error("failed to initialize the Python interpreter: {0}")]
    Initialization(String),

    /// `get` on a name the namespace does not bind.
    #[error("name not found: {0}")]
    NotFound(String),

    /// `eval` input that does not parse as a single expression.
    #[error("failed to compile `{source_text}`\n{diagnostic}")]
    Compile { source_text: String, diagnostic: String },

    /// `eval` input that parsed but raised.
    #[error("failed to evaluate `{expression}`\n{diagnostic}")]
    Eval { expression: String, diagnostic: String },

    /// `exec` input that raised; `output` is what Python wrote to stderr.
    #[error("failed to execute: {code}\n{output}")]
    Execution { code: String, output: String },

    /// A value whose shape has no mapping across the boundary.
    #[error("cannot convert {direction}: {reason}\n\nvalue type tree\n{trace}")]
    Conversion {
        direction: Direction,
        reason: String,
        trace: String,
    },

    /// A binary payload longer than a 32-bit signed length.
    #[error("cannot convert because the length ({len} bytes) is larger than 2G")]
    Length { len: usize },

    /// The interpreter failed while the session was managing it (stream
    /// redirection, namespace binding).
    #[error("python error: {0}")]
    Python(String),

    /// The session was finalized; no further calls are defined.
    #[error("the Python session has been finalized")]
    Finalized,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// The diagnostic text Python produced, for the variants that carry one.
    pub fn diagnostic(&self) -> Option<&str> {
        match self {
            Error::Compile { diagnostic, .. } | Error::Eval { diagnostic, .. } => Some(diagnostic),
            Error::Execution { output, .. } => Some(output),
            _ => None,
        }
    }
}

/// Render a Python exception with its traceback, if it has one.
pub(crate) fn format_py_err(py: Python<'_>, err: &PyErr) -> String {
    let traceback = err
        .traceback_bound(py)
        .and_then(|tb| tb.format().ok())
        .unwrap_or_default();
    format!("{traceback}{err}")
}

// ── Tests ─────────────────────────────────────────────────────────────────────
