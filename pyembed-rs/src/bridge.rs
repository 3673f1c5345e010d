//! Host closures callable from Python.
//!
//! Enabled with the `callable` Cargo feature:
//! ```text
//! cargo build --features callable
//! cargo test  --features callable
//! ```
//!
//! A [`HostValue::Callable`] marshals into a Python built-in function.  When
//! Python calls it, positional arguments are converted to host values, the
//! closure runs, and its result is converted back.  Failures of any kind
//! (conversion, closure `Err`, closure panic) surface in Python as a
//! `RuntimeError` and never unwind across the boundary.
//!
//! The closure runs with the GIL released, so it may block on the session
//! lock (or do slow host work) without stalling other Python threads.
//!
//! ```text
//! >>> add(2, 3)        # HostValue::callable(|args| ...)
//! 5
//! >>> add(2, object())
//! RuntimeError: cannot convert the Python object to a host value: ...
//!
//! value type tree
//!   (arguments)
//!     int
//!     object  <- unsupported
//! ```

use std::any::Any;
use std::ffi::CStr;
use std::panic::{self, AssertUnwindSafe};

use pyo3::exceptions::{PyRuntimeError, PyTypeError};
use pyo3::prelude::*;
use pyo3::types::{PyCFunction, PyDict, PyTuple};

use crate::marshal::{host_to_py, py_to_host};
use crate::trace::TypeTree;
use crate::value::{HostFn, HostValue};

const FUNCTION_NAME: &str = "host_function";
const FUNCTION_CNAME: &CStr = c"host_function";
const FUNCTION_DOC: &CStr = c"Host function exposed by pyembed.";

/// Wrap `f` as a Python callable.
pub fn wrap(py: Python<'_>, f: HostFn) -> PyResult<Bound<'_, PyCFunction>> {
    PyCFunction::new_closure_bound(
        py,
        Some(FUNCTION_CNAME),
        Some(FUNCTION_DOC),
        move |args: &Bound<'_, PyTuple>, kwargs: Option<&Bound<'_, PyDict>>| -> PyResult<PyObject> {
            if kwargs.is_some_and(|k| !k.is_empty()) {
                return Err(PyTypeError::new_err(format!(
                    "{FUNCTION_NAME}() takes positional arguments only"
                )));
            }
            call_host(&f, args).map_err(|msg| {
                tracing::warn!(error = %msg, "host function call failed");
                PyRuntimeError::new_err(msg)
            })
        },
    )
}

fn call_host(f: &HostFn, args: &Bound<'_, PyTuple>) -> Result<PyObject, String> {
    let py = args.py();

    let mut trace = TypeTree::rooted("(arguments)");
    let host_args = trace
        .nested(|trace| {
            args.iter()
                .map(|arg| py_to_host(&arg, trace))
                .collect::<crate::Result<Vec<HostValue>>>()
        })
        .map_err(|e| e.to_string())?;

    // The closure may call back into the session, which takes the session
    // lock before the GIL; holding the GIL here would invert that order.
    let result = py
        .allow_threads(|| panic::catch_unwind(AssertUnwindSafe(|| f.call(host_args))))
        .map_err(|payload| format!("host function panicked: {}", panic_message(&payload)))?
        .map_err(|e| format!("host function failed: {e}"))?;

    let mut trace = TypeTree::rooted("(return value)");
    let obj = trace
        .nested(|trace| host_to_py(py, &result, trace))
        .map_err(|e| e.to_string())?;
    Ok(obj.unbind())
}

fn panic_message(payload: &Box<dyn Any + Send>) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "<non-string panic payload>"
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
