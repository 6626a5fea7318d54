//! `linnetc`: the command-line front end (§4.I, §6). Argument types, logging setup,
//! and the per-circuit driver live in [`linnet::lib`]; this binary only parses
//! arguments and turns the batch result into a process exit code.

use std::process::ExitCode;

use clap::Parser;

use linnet::{init_logger, new_diagnostics, run, Cli};

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logger(&cli);
    let diagnostics = new_diagnostics();

    if run(&cli, &diagnostics) {
        ExitCode::SUCCESS
    } else {
        // §6 "Exit codes": -1 on any circuit-level failure, truncated to a u8 by the
        // platform the way the original C program's `return -1` was.
        ExitCode::from(255)
    }
}
