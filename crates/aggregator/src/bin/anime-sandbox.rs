//! Evaluates one script read from stdin and prints its completion value.
//!
//! Spawned by the stream extractor for every packed payload. Errors go to
//! stderr with a non-zero exit status.

use anime_aggregator::extractor::sandbox;
use anime_aggregator::Error;
use clap::Parser;
use std::io::{Read, Write};
use std::process::ExitCode;

/// Longest error message written back to the parent
const MAX_MESSAGE_BYTES: usize = 4 * 1024;

#[derive(Parser, Debug)]
#[command(author, version, about = "Evaluate a script from stdin in an isolated context")]
struct Args {
    /// Maximum loop iterations
    #[arg(long)]
    loop_limit: u64,

    /// Maximum call depth
    #[arg(long)]
    recursion_limit: usize,

    /// Address space cap in bytes, 0 for none
    #[arg(long, default_value_t = 0)]
    memory_limit: u64,
}

fn main() -> ExitCode {
    let args = Args::parse();

    if args.memory_limit > 0 {
        if let Err(e) = limit_memory(args.memory_limit) {
            return fail(&format!("failed to cap memory: {e}"));
        }
    }

    let mut code = String::new();
    if let Err(e) = std::io::stdin().read_to_string(&mut code) {
        return fail(&format!("failed to read script: {e}"));
    }

    match sandbox::evaluate(&code, args.loop_limit, args.recursion_limit) {
        Ok(value) => {
            let mut stdout = std::io::stdout().lock();
            match stdout.write_all(value.as_bytes()).and_then(|_| stdout.flush()) {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => fail(&format!("failed to write result: {e}")),
            }
        }
        Err(Error::Sandbox(message)) => fail(&message),
        Err(e) => fail(&e.to_string()),
    }
}

fn fail(message: &str) -> ExitCode {
    let mut end = message.len().min(MAX_MESSAGE_BYTES);
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    eprintln!("{}", &message[..end]);
    ExitCode::FAILURE
}

#[cfg(unix)]
fn limit_memory(bytes: u64) -> std::io::Result<()> {
    let limit = libc::rlimit {
        rlim_cur: bytes as libc::rlim_t,
        rlim_max: bytes as libc::rlim_t,
    };
    // SAFETY: setrlimit only reads the struct it is given.
    let rc = unsafe { libc::setrlimit(libc::RLIMIT_AS, &limit) };
    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn limit_memory(_bytes: u64) -> std::io::Result<()> {
    Ok(())
}
