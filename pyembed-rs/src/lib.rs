//! Drive an embedded CPython interpreter from Rust.
//!
//! One process-wide [`Session`] owns the interpreter.  Host code binds
//! values into its namespace, runs statements, evaluates expressions and
//! reads results back as [`HostValue`]s:
//!
//! ```rust,no_run
//! use pyembed::{HostValue, Session};
//!
//! let py = Session::initialize()?;
//! py.put("xs", HostValue::list([3, 1, 2]))?;
//! assert_eq!(py.eval("sorted(xs)")?, HostValue::list([1, 2, 3]));
//! # Ok::<(), pyembed::Error>(())
//! ```
//!
//! Conversion failures carry a value type tree showing where in a nested
//! value the unsupported part sat; see [`trace`].
//!
//! # Features
//!
//! - `callable`: marshal [`HostValue::Callable`] closures into Python
//!   functions (see [`bridge`]).

#[cfg(feature = "callable")]
pub mod bridge;
pub mod cli;
pub mod config;
pub mod error;
pub mod marshal;
pub mod pip;
pub mod session;
pub mod trace;
pub mod value;

pub use config::SessionConfig;
pub use error::{Direction, Error, Result};
pub use pip::Pip;
pub use session::{Session, SessionState};
pub use trace::{TypeNode, TypeTree};
pub use value::{CallError, HostFn, HostValue, Opaque};
