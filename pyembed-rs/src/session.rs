//! The process-wide Python session.
//!
//! CPython cannot safely host two interpreters in one process (many
//! extension modules keep global state), so there is exactly one
//! [`Session`].  [`Session::initialize`] brings the interpreter up on first
//! use and hands out cheap clones of the same handle afterwards.
//!
//! # Namespace
//!
//! All operations share `__main__`'s globals.  Nothing is isolated: names
//! bound by [`Session::put`] or by code run through [`Session::exec`] stay
//! visible to every later call, from every thread.
//!
//! # Output capture
//!
//! `sys.stdout` and `sys.stderr` are `io.StringIO` buffers owned by the
//! session.  [`Session::exec`] starts each run with fresh buffers and
//! returns what was printed; when the code raises, the traceback is
//! written to the stderr buffer and returned in [`Error::Execution`].
//! An `exec` nested inside another (through a host closure) captures into
//! its own buffers and hands the outer ones back when it returns.
//!
//! # Locking
//!
//! Every operation holds one reentrant lock for its whole duration, and
//! takes it before the GIL.  Calls from different threads are serialized;
//! a host closure invoked from Python (feature `callable`) may call back
//! into the session on the same thread; host closures run with the GIL
//! released, so a callback from a Python thread waits for the lock like any
//! other caller.
//!
//! # Finalization
//!
//! The session finalizes exactly once: explicitly through
//! [`Session::finalize`], or automatically when the process exits.
//! Finalizing restores the interpreter's own standard streams and runs the
//! handlers registered with Python's `atexit`.
//!
//! ```rust,no_run
//! use pyembed::{HostValue, Session};
//!
//! let py = Session::initialize()?;
//! py.put("a", 5)?;
//! py.put("b", 3)?;
//! py.exec("v = a / b")?;
//! assert_eq!(py.get("v")?, HostValue::Float(5.0 / 3.0));
//! assert_eq!(py.exec("print('hi')")?, "hi\n");
//! # Ok::<(), pyembed::Error>(())
//! ```

use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use parking_lot::ReentrantMutex;
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyList};

use crate::config::SessionConfig;
use crate::error::{format_py_err, Error, Result};
use crate::marshal;
use crate::pip::Pip;
use crate::value::HostValue;

// Failure is remembered as text: a broken bootstrap is fatal and every
// later `initialize` reports the same reason.
static SESSION: OnceLock<std::result::Result<Session, String>> = OnceLock::new();

/// How long the exit hook waits for a thread still inside the session.
const EXIT_LOCK_TIMEOUT: Duration = Duration::from_secs(2);

/// Lifecycle of an initialized session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Ready,
    Finalized,
}

/// Handle to the single embedded interpreter.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

struct Inner {
    config: SessionConfig,
    interp: ReentrantMutex<Interp>,
}

/// Interpreter state guarded by the session lock.
struct Interp {
    globals: Py<PyDict>,
    string_io: Py<PyAny>,
    stdout: RefCell<Py<PyAny>>,
    stderr: RefCell<Py<PyAny>>,
    /// Number of `exec` calls in progress on the lock-holding thread.
    capture_depth: Cell<usize>,
    finalized: Cell<bool>,
}

/// Buffers an outer `exec` was capturing into, put back when a nested
/// `exec` returns.
struct SavedStreams {
    stdout: Py<PyAny>,
    stderr: Py<PyAny>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.inner.config)
            .field("state", &self.state())
            .finish()
    }
}

impl Session {
    /// Return the process's session, bringing the interpreter up with
    /// [`SessionConfig::from_env`] if this is the first call.
    pub fn initialize() -> Result<Session> {
        match SESSION.get() {
            Some(slot) => Self::from_slot(slot),
            None => Self::initialize_with(SessionConfig::from_env()),
        }
    }

    /// Like [`Session::initialize`] with an explicit configuration.  Only
    /// the first initialization in a process applies its configuration.
    pub fn initialize_with(config: SessionConfig) -> Result<Session> {
        let slot = SESSION.get_or_init(|| Self::bootstrap(&config));
        if let Ok(session) = slot {
            if session.inner.config != config {
                tracing::warn!("python session already initialized; ignoring new configuration");
            }
        }
        Self::from_slot(slot)
    }

    fn from_slot(slot: &std::result::Result<Session, String>) -> Result<Session> {
        slot.clone().map_err(Error::Initialization)
    }

    fn bootstrap(config: &SessionConfig) -> std::result::Result<Session, String> {
        // Initialise the interpreter exactly once (CPython limitation).
        pyo3::prepare_freethreaded_python();

        let interp = Python::with_gil(|py| {
            Interp::install(py, config).map_err(|e| format_py_err(py, &e))
        })?;
        // SAFETY: registers a plain `extern "C" fn` with no captured state.
        if unsafe { libc::atexit(finalize_at_exit) } != 0 {
            tracing::warn!("could not register exit-time finalization");
        }
        tracing::info!(
            program = %config.program_name,
            search_paths = config.search_paths.len(),
            "python session ready"
        );
        Ok(Session {
            inner: Arc::new(Inner { config: config.clone(), interp: ReentrantMutex::new(interp) }),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn state(&self) -> SessionState {
        if self.inner.interp.lock().finalized.get() {
            SessionState::Finalized
        } else {
            SessionState::Ready
        }
    }

    /// Package manager for the configured Python executable.
    pub fn pip(&self) -> Pip {
        Pip::new(self.inner.config.python_executable.clone())
    }

    /// Run `f` holding the session lock and the GIL.
    fn with_interp<R>(&self, f: impl FnOnce(Python<'_>, &Interp) -> Result<R>) -> Result<R> {
        let guard = self.inner.interp.lock();
        if guard.finalized.get() {
            return Err(Error::Finalized);
        }
        Python::with_gil(|py| f(py, &guard))
    }

    // ── Namespace ─────────────────────────────────────────────────────────

    /// Convert `value` and bind it to `name`, replacing any previous
    /// binding.  On a conversion failure the namespace is left untouched.
    #[tracing::instrument(level = "debug", skip(self, value))]
    pub fn put(&self, name: &str, value: impl Into<HostValue>) -> Result<()> {
        let value = value.into();
        self.with_interp(|py, interp| {
            let obj = marshal::to_py(py, &value)?;
            interp
                .globals
                .bind(py)
                .set_item(name, obj)
                .map_err(|e| Error::Python(format_py_err(py, &e)))
        })
    }

    /// Read the value bound to `name`.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn get(&self, name: &str) -> Result<HostValue> {
        self.with_interp(|py, interp| {
            let obj = interp
                .globals
                .bind(py)
                .get_item(name)
                .map_err(|e| Error::Python(format_py_err(py, &e)))?
                .ok_or_else(|| Error::NotFound(name.to_owned()))?;
            marshal::to_host(&obj)
        })
    }

    // ── Execution ─────────────────────────────────────────────────────────

    /// Evaluate a single Python expression against the namespace.
    ///
    /// The namespace is both the global and the local scope, so assignment
    /// expressions (`(x := 1)`) bind into it.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn eval(&self, expression: &str) -> Result<HostValue> {
        self.with_interp(|py, interp| {
            let obj = interp.eval(py, expression)?;
            marshal::to_host(&obj)
        })
    }

    /// Execute Python statements against the namespace and return what they
    /// printed to stdout.
    #[tracing::instrument(level = "debug", skip(self, code), fields(code_len = code.len()))]
    pub fn exec(&self, code: &str) -> Result<String> {
        self.with_interp(|py, interp| {
            let saved = interp.enter_capture(py).map_err(|e| Error::Python(format_py_err(py, &e)))?;
            let outcome = interp.run_captured(py, code);
            interp
                .leave_capture(py, saved)
                .map_err(|e| Error::Python(format_py_err(py, &e)))?;
            outcome
        })
    }

    /// Read a UTF-8 script from disk and [`exec`](Session::exec) it.
    pub fn run_file(&self, path: &Path) -> Result<String> {
        let code = std::fs::read_to_string(path)?;
        self.exec(&code)
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────

    /// Restore the interpreter's own standard streams, close the capture
    /// buffers and run Python's `atexit` handlers.  Every later operation
    /// fails with [`Error::Finalized`].  Calling it again is a no-op.
    ///
    /// This also happens on its own when the process exits, so calling it
    /// is only needed to finalize earlier.  The interpreter itself stays
    /// alive until the process exits.
    pub fn finalize(&self) -> Result<()> {
        let guard = self.inner.interp.lock();
        Self::finalize_locked(&guard)
    }

    fn finalize_locked(interp: &Interp) -> Result<()> {
        if interp.finalized.replace(true) {
            return Ok(());
        }
        Python::with_gil(|py| interp.shut_down(py).map_err(|e| Error::Python(format_py_err(py, &e))))?;
        tracing::info!("python session finalized");
        Ok(())
    }
}

extern "C" fn finalize_at_exit() {
    let Some(Ok(session)) = SESSION.get() else { return };
    // A thread stuck inside the session must not hang process exit.
    let Some(guard) = session.inner.interp.try_lock_for(EXIT_LOCK_TIMEOUT) else {
        tracing::warn!("session busy at exit; skipping finalization");
        return;
    };
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| Session::finalize_locked(&guard)));
    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(error = %e, "exit-time finalization failed"),
        Err(_) => tracing::warn!("exit-time finalization panicked"),
    }
}

impl Interp {
    fn install(py: Python<'_>, config: &SessionConfig) -> PyResult<Self> {
        let sys = py.import_bound("sys")?;
        sys.setattr("argv", PyList::new_bound(py, [config.program_name.as_str()]))?;
        let path = sys.getattr("path")?;
        for dir in &config.search_paths {
            path.call_method1("append", (dir.to_string_lossy().into_owned(),))?;
        }

        let globals = py.import_bound("__main__")?.dict();
        let string_io = py.import_bound("io")?.getattr("StringIO")?;
        let stdout = string_io.call0()?;
        let stderr = string_io.call0()?;
        sys.setattr("stdout", &stdout)?;
        sys.setattr("stderr", &stderr)?;

        Ok(Self {
            globals: globals.unbind(),
            string_io: string_io.unbind(),
            stdout: RefCell::new(stdout.unbind()),
            stderr: RefCell::new(stderr.unbind()),
            capture_depth: Cell::new(0),
            finalized: Cell::new(false),
        })
    }

    /// Run statements with output going to the current capture buffers.
    fn run_captured(&self, py: Python<'_>, code: &str) -> Result<String> {
        let globals = self.globals.bind(py);
        match py.run_bound(code, Some(globals), None) {
            Ok(()) => Self::read(py, &self.stdout).map_err(|e| Error::Python(format_py_err(py, &e))),
            Err(err) => {
                // Same as an uncaught exception: traceback to sys.stderr.
                err.display(py);
                let captured = self.take_stderr(py).unwrap_or_default();
                let output = if captured.trim().is_empty() {
                    format_py_err(py, &err)
                } else {
                    captured
                };
                tracing::debug!(error = %err, "exec raised");
                Err(Error::Execution { code: code.to_owned(), output })
            }
        }
    }

    /// Install fresh capture buffers.  The outermost `exec` discards the
    /// previous ones; a nested `exec` keeps them for [`Interp::leave_capture`].
    fn enter_capture(&self, py: Python<'_>) -> PyResult<Option<SavedStreams>> {
        let string_io = self.string_io.bind(py);
        let fresh_out = string_io.call0()?.unbind();
        let fresh_err = string_io.call0()?.unbind();
        let old_out = self.stdout.replace(fresh_out);
        let old_err = self.stderr.replace(fresh_err);

        let depth = self.capture_depth.get();
        self.capture_depth.set(depth + 1);
        let saved = if depth == 0 {
            old_out.bind(py).call_method0("close")?;
            old_err.bind(py).call_method0("close")?;
            None
        } else {
            Some(SavedStreams { stdout: old_out, stderr: old_err })
        };
        self.install_streams(py)?;
        Ok(saved)
    }

    /// Undo [`Interp::enter_capture`].  Closes a nested call's buffers and
    /// reinstalls the outer call's, which may still be receiving output.
    fn leave_capture(&self, py: Python<'_>, saved: Option<SavedStreams>) -> PyResult<()> {
        self.capture_depth.set(self.capture_depth.get().saturating_sub(1));
        let Some(saved) = saved else { return Ok(()) };
        let inner_out = self.stdout.replace(saved.stdout);
        let inner_err = self.stderr.replace(saved.stderr);
        inner_out.bind(py).call_method0("close")?;
        inner_err.bind(py).call_method0("close")?;
        self.install_streams(py)
    }

    /// Compile in `eval` mode, then evaluate in the namespace.
    fn eval<'py>(&self, py: Python<'py>, expression: &str) -> Result<Bound<'py, PyAny>> {
        let builtins = py
            .import_bound("builtins")
            .map_err(|e| Error::Python(format_py_err(py, &e)))?;
        let code = builtins
            .call_method1("compile", (expression, "<string>", "eval"))
            .map_err(|e| Error::Compile {
                source_text: expression.to_owned(),
                diagnostic: format_py_err(py, &e),
            })?;
        let globals = self.globals.bind(py);
        builtins
            .call_method1("eval", (code, globals, globals))
            .map_err(|e| Error::Eval {
                expression: expression.to_owned(),
                diagnostic: format_py_err(py, &e),
            })
    }

    fn install_streams(&self, py: Python<'_>) -> PyResult<()> {
        let sys = py.import_bound("sys")?;
        sys.setattr("stdout", self.stdout.borrow().bind(py))?;
        sys.setattr("stderr", self.stderr.borrow().bind(py))?;
        Ok(())
    }

    /// Read the stderr buffer and start it afresh.
    fn take_stderr(&self, py: Python<'_>) -> PyResult<String> {
        let text = Self::read(py, &self.stderr)?;
        Self::replace(py, &self.string_io, &self.stderr)?;
        py.import_bound("sys")?
            .setattr("stderr", self.stderr.borrow().bind(py))?;
        Ok(text)
    }

    fn read(py: Python<'_>, buffer: &RefCell<Py<PyAny>>) -> PyResult<String> {
        buffer.borrow().bind(py).call_method0("getvalue")?.extract()
    }

    fn replace(py: Python<'_>, string_io: &Py<PyAny>, buffer: &RefCell<Py<PyAny>>) -> PyResult<()> {
        let fresh = string_io.bind(py).call0()?.unbind();
        let old = buffer.replace(fresh);
        old.bind(py).call_method0("close")?;
        Ok(())
    }

    /// Give the interpreter its own streams back, then run the `atexit`
    /// handlers user code registered and flush what they printed.
    fn shut_down(&self, py: Python<'_>) -> PyResult<()> {
        let sys = py.import_bound("sys")?;
        sys.setattr("stdout", sys.getattr("__stdout__")?)?;
        sys.setattr("stderr", sys.getattr("__stderr__")?)?;
        self.stdout.borrow().bind(py).call_method0("close")?;
        self.stderr.borrow().bind(py).call_method0("close")?;

        py.import_bound("atexit")?.call_method0("_run_exitfuncs")?;
        for name in ["stdout", "stderr"] {
            let stream = sys.getattr(name)?;
            if !stream.is_none() {
                stream.call_method0("flush")?;
            }
        }
        Ok(())
    }
}
