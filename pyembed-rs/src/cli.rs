//! Command-line argument parsing.
//!
//! Usage:
//!   pyembed [-q] [-p<dir>]... [-P<python>] [-c<code>] [-e<expr>] [<script>]
//!   pyembed [-P<python>] pip install|upgrade|uninstall <package>...

use std::path::PathBuf;

use crate::config::SessionConfig;
use crate::pip::PipAction;

pub const USAGE: &str = "\
Usage: pyembed [-q] [-p<dir>]... [-P<python>] [-c<code>] [-e<expr>] [<script>]
       pyembed [-P<python>] pip install|upgrade|uninstall <package>...";

// ── Public types ──────────────────────────────────────────────────────────────

/// Parsed command-line arguments.
#[derive(Debug, Default)]
pub struct CliArgs {
    /// Extra module search paths (`-p<dir>`, repeatable).
    pub search_paths: Vec<PathBuf>,
    /// Python executable for pip (`-P<python>`).
    pub python: Option<PathBuf>,
    /// Suppress the interactive banner (`-q`).
    pub quiet: bool,
    /// What to do.
    pub mode: Mode,
}

/// What the invocation asks for.
#[derive(Debug, Default, PartialEq)]
pub enum Mode {
    /// Run code in the session.  With nothing given, read from stdin.
    #[default]
    Console,
    Run {
        /// Statements to execute (`-c<code>`).
        command: Option<String>,
        /// Expression to evaluate and print (`-e<expr>`).
        expression: Option<String>,
        /// Script file to execute.
        script: Option<PathBuf>,
    },
    /// `pip <action> <packages>…`
    Pip { action: PipAction, packages: Vec<String> },
}

impl CliArgs {
    /// Apply command-line overrides on top of `base` (usually
    /// [`SessionConfig::from_env`]).
    pub fn session_config(&self, base: SessionConfig) -> SessionConfig {
        let mut config = base.with_program_name("pyembed");
        if let Some(python) = &self.python {
            config.python_executable = python.clone();
        }
        // Command-line paths take precedence over environment ones.
        let mut paths = self.search_paths.clone();
        paths.extend(config.search_paths.drain(..).filter(|p| !self.search_paths.contains(p)));
        config.search_paths = paths;
        config
    }
}

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Parse `std::env::args()` and return [`CliArgs`] or an error message.
pub fn parse_args() -> Result<CliArgs, String> {
    let raw: Vec<String> = std::env::args().collect();
    parse_argv(raw.get(1..).unwrap_or_default())
}

/// Parse a slice of argument strings (exposed for testing).
pub fn parse_argv(argv: &[String]) -> Result<CliArgs, String> {
    let mut args = CliArgs::default();
    let mut command = None;
    let mut expression = None;
    let mut positional: Vec<String> = Vec::new();
    let mut i = 0;

    while i < argv.len() {
        let arg = argv[i].as_str();

        // `--` ends flag processing.
        if arg == "--" {
            positional.extend(argv[i + 1..].iter().cloned());
            break;
        }

        // First non-flag argument: the rest belongs to the script or to pip.
        if !arg.starts_with('-') || arg == "-" {
            positional.extend(argv[i..].iter().cloned());
            break;
        }

        let flag = &arg[1..];
        let mut chars = flag.chars();
        let Some(c) = chars.next() else { return Err("empty option".to_owned()) };
        let inline: String = chars.collect();

        let mut value = |name: char| -> Result<String, String> {
            if !inline.is_empty() {
                Ok(inline.clone())
            } else if i + 1 < argv.len() {
                i += 1;
                Ok(argv[i].clone())
            } else {
                Err(format!("-{name} requires an argument"))
            }
        };

        match c {
            'q' if inline.is_empty() => args.quiet = true,
            'c' => command = Some(value('c')?),
            'e' => expression = Some(value('e')?),
            'p' => args.search_paths.push(PathBuf::from(value('p')?)),
            'P' => args.python = Some(PathBuf::from(value('P')?)),
            _ => return Err(format!("unknown option: {arg}")),
        }
        i += 1;
    }

    if positional.first().map(String::as_str) == Some("pip") {
        if command.is_some() || expression.is_some() {
            return Err("pip cannot be combined with -c or -e".to_owned());
        }
        args.mode = parse_pip(&positional[1..])?;
        return Ok(args);
    }

    let script = match positional.len() {
        0 => None,
        1 => Some(PathBuf::from(positional.remove(0))),
        n => return Err(format!("too many arguments ({n})")),
    };

    if command.is_some() || expression.is_some() || script.is_some() {
        args.mode = Mode::Run { command, expression, script };
    }
    Ok(args)
}

fn parse_pip(rest: &[String]) -> Result<Mode, String> {
    let Some((verb, packages)) = rest.split_first() else {
        return Err("pip requires an action: install, upgrade or uninstall".to_owned());
    };
    let action = match verb.as_str() {
        "install" => PipAction::Install,
        "upgrade" => PipAction::Upgrade,
        "uninstall" => PipAction::Uninstall,
        other => return Err(format!("unknown pip action: {other}")),
    };
    if packages.is_empty() {
        return Err(format!("pip {verb} requires at least one package"));
    }
    Ok(Mode::Pip { action, packages: packages.to_vec() })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
