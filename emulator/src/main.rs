mod session;

use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use session::Session;

const USAGE: &str = "Usage: alarm-emulator [--transcript <path>]";

fn main() -> ExitCode {
    let transcript = match transcript_path(std::env::args().skip(1)) {
        Ok(path) => path,
        Err(err) => {
            eprintln!("{err}\n{USAGE}");
            return ExitCode::from(2);
        }
    };

    match run(transcript.as_deref()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("emulator stopped: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(transcript: Option<&Path>) -> io::Result<()> {
    let mut session = Session::new(transcript)?;
    session.serve(io::stdin().lock(), io::stdout().lock())
}

/// Accepts either `--transcript <path>` or `--transcript=<path>`.
fn transcript_path(mut args: impl Iterator<Item = String>) -> Result<Option<PathBuf>, String> {
    let Some(arg) = args.next() else {
        return Ok(None);
    };
    let path = match arg.strip_prefix("--transcript=") {
        Some(value) => value.to_owned(),
        None if arg == "--transcript" => args
            .next()
            .ok_or_else(|| "Expected value after --transcript".to_owned())?,
        None => return Err(format!("Unknown argument `{arg}`")),
    };
    match args.next() {
        Some(extra) => Err(format!("Unexpected argument `{extra}`")),
        None => Ok(Some(PathBuf::from(path))),
    }
}
