//! Session configuration.
//!
//! | Setting             | Environment        | Default                         |
//! |---------------------|--------------------|---------------------------------|
//! | `program_name`      | `PYEMBED_PROGRAM`  | `""` (what `sys.argv[0]` shows) |
//! | `python_executable` | `PYEMBED_PYTHON`   | `python3`                       |
//! | `search_paths`      | `PYEMBED_PATH`     | user `site-packages`, if any    |
//!
//! `PYEMBED_PATH` is an OS path list (`:`-separated on Unix).  The per-user
//! directory is `<data dir>/pyembed/site-packages` as reported by
//! `directories`; it is only added when it exists.

use std::ffi::OsString;
use std::path::PathBuf;

use directories::ProjectDirs;

pub const ENV_PROGRAM: &str = "PYEMBED_PROGRAM";
pub const ENV_PYTHON: &str = "PYEMBED_PYTHON";
pub const ENV_PATH: &str = "PYEMBED_PATH";

/// How to bring up the interpreter.  Only the first session initialization
/// in a process uses it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Value of `sys.argv[0]`.
    pub program_name: String,
    /// Interpreter used by out-of-process helpers such as [`crate::pip::Pip`].
    pub python_executable: PathBuf,
    /// Directories appended to `sys.path`, in order.
    pub search_paths: Vec<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            program_name: String::new(),
            python_executable: PathBuf::from("python3"),
            search_paths: Vec::new(),
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by the process environment.
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var_os(key))
    }

    /// Build from an arbitrary variable lookup (exposed for testing).
    pub fn from_vars(lookup: impl Fn(&str) -> Option<OsString>) -> Self {
        let mut config = Self::default();
        if let Some(name) = lookup(ENV_PROGRAM) {
            config.program_name = name.to_string_lossy().into_owned();
        }
        if let Some(python) = lookup(ENV_PYTHON).filter(|p| !p.is_empty()) {
            config.python_executable = PathBuf::from(python);
        }
        if let Some(paths) = lookup(ENV_PATH) {
            config
                .search_paths
                .extend(std::env::split_paths(&paths).filter(|p| !p.as_os_str().is_empty()));
        }
        if let Some(site) = user_site_packages().filter(|p| p.is_dir()) {
            if !config.search_paths.contains(&site) {
                config.search_paths.push(site);
            }
        }
        config
    }

    pub fn with_program_name(mut self, name: impl Into<String>) -> Self {
        self.program_name = name.into();
        self
    }

    pub fn with_python_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.python_executable = path.into();
        self
    }

    pub fn with_search_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.search_paths.push(path.into());
        self
    }
}

/// `<user data dir>/pyembed/site-packages`.
pub fn user_site_packages() -> Option<PathBuf> {
    ProjectDirs::from("", "", "pyembed").map(|d| d.data_dir().join("site-packages"))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
