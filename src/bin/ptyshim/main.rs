//! ptyshim entrypoint: validate the command, claim the control channel, relay, exit with the child's code.

use clap::Parser;
use ptyshim::{init_tracing, probe_control_fd, run, AppConfig};
use std::process;

/// Exit code for usage problems and fatal adapter errors.
const FAILURE_EXIT_CODE: i32 = 1;

fn main() {
    let config = AppConfig::parse();
    if let Err(err) = config.program_and_args() {
        eprintln!("ptyshim: {err}");
        process::exit(FAILURE_EXIT_CODE);
    }

    // Probe fd 3 before anything (the trace log included) can open a descriptor there.
    let control_fd = probe_control_fd();
    init_tracing(&config);
    tracing::info!(
        command = ?config.command,
        control = control_fd.is_some(),
        "ptyshim starting"
    );

    match run(&config, control_fd) {
        Ok(code) => {
            tracing::info!(code, "ptyshim exiting");
            process::exit(code);
        }
        Err(err) => {
            tracing::error!("ptyshim failed: {err:#}");
            eprintln!("ptyshim: {err:#}");
            process::exit(FAILURE_EXIT_CODE);
        }
    }
}
