//! `pip` package management.
//!
//! Runs `<python> -m pip …` as a child process with inherited stdio and
//! reports its exit code.  The embedded interpreter is not involved, so
//! these calls do not take the session lock.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

const PIP_PREFIX: &[&str] = &[
    "-m",
    "pip",
    "--disable-pip-version-check",
    "--no-python-version-warning",
];

/// Which `pip` subcommand to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipAction {
    Install,
    Upgrade,
    Uninstall,
}

impl PipAction {
    fn args(self) -> &'static [&'static str] {
        match self {
            PipAction::Install => &["install"],
            PipAction::Upgrade => &["install", "--upgrade"],
            PipAction::Uninstall => &["uninstall", "-y"],
        }
    }
}

/// Package manager bound to one Python executable.
#[derive(Debug, Clone)]
pub struct Pip {
    python: PathBuf,
}

impl Pip {
    pub fn new(python: impl Into<PathBuf>) -> Self {
        Self { python: python.into() }
    }

    pub fn python(&self) -> &Path {
        &self.python
    }

    /// Install packages.  Returns pip's exit code (0 on success).
    pub fn install<S: AsRef<str>>(&self, packages: &[S]) -> io::Result<i32> {
        self.run(PipAction::Install, packages)
    }

    /// Upgrade packages.  Returns pip's exit code (0 on success).
    pub fn upgrade<S: AsRef<str>>(&self, packages: &[S]) -> io::Result<i32> {
        self.run(PipAction::Upgrade, packages)
    }

    /// Uninstall packages without prompting.  Returns pip's exit code.
    pub fn uninstall<S: AsRef<str>>(&self, packages: &[S]) -> io::Result<i32> {
        self.run(PipAction::Uninstall, packages)
    }

    /// Arguments passed to the interpreter, after the executable itself.
    pub fn command_args<S: AsRef<str>>(action: PipAction, packages: &[S]) -> Vec<String> {
        PIP_PREFIX
            .iter()
            .chain(action.args())
            .map(|s| (*s).to_owned())
            .chain(packages.iter().map(|p| p.as_ref().to_owned()))
            .collect()
    }

    /// Run any pip action.  Returns pip's exit code.
    pub fn run<S: AsRef<str>>(&self, action: PipAction, packages: &[S]) -> io::Result<i32> {
        let args = Self::command_args(action, packages);
        tracing::info!(python = %self.python.display(), ?action, ?args, "running pip");
        let status = Command::new(&self.python).args(&args).status()?;
        // A signal-terminated child has no code; report it as a failure.
        let code = status.code().unwrap_or(-1);
        if code != 0 {
            tracing::warn!(code, ?action, "pip exited with failure");
        }
        Ok(code)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
