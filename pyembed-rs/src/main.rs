use std::io::{BufRead, Read, Write};
use std::process::ExitCode;

use pyembed::cli::{self, CliArgs, Mode};
use pyembed::{Error, Pip, Session, SessionConfig};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> ExitCode {
    // Initialize tracing (respects RUST_LOG env var).  Logs go to stderr so
    // captured Python output on stdout stays clean.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let args = match cli::parse_args() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("pyembed: {e}");
            eprintln!("{}", cli::USAGE);
            return ExitCode::from(2);
        }
    };

    match run(args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("pyembed: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: CliArgs) -> Result<ExitCode, Error> {
    let config = args.session_config(SessionConfig::from_env());

    match args.mode {
        Mode::Pip { action, packages } => {
            let code = Pip::new(config.python_executable).run(action, &packages)?;
            return Ok(ExitCode::from(u8::try_from(code).unwrap_or(1)));
        }
        Mode::Run { command, expression, script } => {
            let session = Session::initialize_with(config)?;
            if let Some(code) = command {
                print!("{}", session.exec(&code)?);
            }
            if let Some(path) = script {
                print!("{}", session.run_file(&path)?);
            }
            if let Some(expr) = expression {
                println!("{}", session.eval(&expr)?);
            }
        }
        Mode::Console => {
            let session = Session::initialize_with(config)?;
            // Only prompt when attached to a terminal.
            let is_tty = unsafe {
                libc::isatty(libc::STDIN_FILENO) != 0 && libc::isatty(libc::STDOUT_FILENO) != 0
            };
            if is_tty {
                console(&session, args.quiet)?;
            } else {
                let mut code = String::new();
                std::io::stdin().read_to_string(&mut code)?;
                print!("{}", session.exec(&code)?);
            }
        }
    }
    std::io::stdout().flush()?;
    Ok(ExitCode::SUCCESS)
}

/// Line-oriented console.  A line ending in `:` opens a block that runs once
/// an empty line is entered.
fn console(session: &Session, quiet: bool) -> Result<(), Error> {
    if !quiet {
        println!("pyembed {} (embedded Python)", env!("CARGO_PKG_VERSION"));
        println!("Type Python statements or expressions; end input with Ctrl-D.");
    }

    let stdin = std::io::stdin();
    let mut out = std::io::stdout();
    let mut block = String::new();
    let mut lines = stdin.lock().lines();

    loop {
        write!(out, "{}", if block.is_empty() { ">>> " } else { "... " })?;
        out.flush()?;
        let Some(line) = lines.next().transpose()? else { break };

        if !block.is_empty() {
            if line.trim().is_empty() {
                run_chunk(session, &std::mem::take(&mut block));
            } else {
                block.push_str(&line);
                block.push('\n');
            }
            continue;
        }
        if line.trim_end().ends_with(':') {
            block.push_str(&line);
            block.push('\n');
            continue;
        }
        if !line.trim().is_empty() {
            run_chunk(session, &line);
        }
    }
    if !block.is_empty() {
        run_chunk(session, &block);
    }
    println!();
    Ok(())
}

// Console input is compiled in `single` mode so expression results are
// echoed through `sys.displayhook` into the captured stdout.
const CONSOLE_INPUT: &str = "__pyembed_input__";
const CONSOLE_EXEC: &str = "exec(compile(__pyembed_input__, '<stdin>', 'single'))";

fn run_chunk(session: &Session, code: &str) {
    let result = session.put(CONSOLE_INPUT, code).and_then(|()| session.exec(CONSOLE_EXEC));
    match result {
        Ok(output) => print!("{output}"),
        Err(Error::Execution { output, .. }) => eprint!("{output}"),
        Err(e) => eprintln!("{e}"),
    }
}
