//! Reference worker for exercising the launcher
//!
//! Implements the worker side of the channel contract: connects to the
//! shutdown pipe, writes to stdout (which the supervisor has wired to the
//! output channel), and follows a small command script. Used by the
//! integration tests and handy for manual runs.
//!
//! Script commands, one per line:
//!   print <text>      write a line to stdout
//!   sleep-ms <n>      pause
//!   wait-shutdown     block until the shutdown token arrives
//!   exit <code>       exit with the given code

use clap::Parser;
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::process::ExitCode;

use tether_channel::ControlToken;

#[derive(Parser, Debug)]
#[command(name = "mock-worker")]
struct Args {
    /// Command script to execute
    script: PathBuf,

    /// Output channel socket path (stdout is already wired to it)
    #[arg(long = "output-pipe")]
    output_pipe: Option<PathBuf>,

    /// Control channel socket path
    #[arg(long = "shutdown-pipe")]
    shutdown_pipe: PathBuf,

    /// Ignored extra arguments
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    #[allow(dead_code)]
    rest: Vec<String>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    if args.output_pipe.is_none() {
        eprintln!("mock-worker: no --output-pipe given; writing to inherited stdout");
    }

    let control = match UnixStream::connect(&args.shutdown_pipe) {
        Ok(stream) => stream,
        Err(e) => {
            eprintln!("mock-worker: cannot connect control channel: {e}");
            return ExitCode::from(3);
        }
    };
    let mut control = BufReader::new(control);

    let script = std::fs::read_to_string(&args.script).unwrap_or_default();
    for line in script.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (cmd, rest) = line.split_once(' ').unwrap_or((line, ""));
        match cmd {
            "print" => {
                println!("{rest}");
                let _ = std::io::stdout().flush();
            }
            "sleep-ms" => {
                let ms: u64 = rest.parse().unwrap_or(0);
                std::thread::sleep(std::time::Duration::from_millis(ms));
            }
            "wait-shutdown" => {
                let mut buf = String::new();
                loop {
                    buf.clear();
                    match control.read_line(&mut buf) {
                        // EOF means the supervisor went away without a
                        // shutdown token; stop waiting either way
                        Ok(0) => break,
                        Ok(_) => {
                            if ControlToken::parse(&buf) == Some(ControlToken::Shutdown) {
                                break;
                            }
                        }
                        Err(e) => {
                            eprintln!("mock-worker: control read failed: {e}");
                            break;
                        }
                    }
                }
            }
            "exit" => {
                let code: u8 = rest.parse().unwrap_or(0);
                return ExitCode::from(code);
            }
            other => eprintln!("mock-worker: unknown command {other}"),
        }
    }

    ExitCode::SUCCESS
}
