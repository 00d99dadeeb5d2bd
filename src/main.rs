//! Pulse - plugin lifecycle manager

use std::process::ExitCode;

fn main() -> ExitCode {
    if let Err(e) = pulse::cli::run() {
        eprintln!("Error: {:#}", e);
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
