//! Library half of `linnetc` (§4.I, §6): argument types and the per-circuit pipeline
//! driver, kept separate from `main.rs` so integration tests under `tests/` can drive
//! them directly without spawning a subprocess.
//!
//! Flag names and defaults mirror the original program's `opt_getOpt.c` (see
//! `DESIGN.md`), translated into `clap`'s derive style rather than hand-rolled
//! `getopt`.

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use log::LevelFilter;
use miden_diagnostics::term::termcolor::ColorChoice;
use miden_diagnostics::{CodeMap, DefaultEmitter, DiagnosticsHandler, Severity};

/// One of the original program's five verbosity names. `log`'s built-in levels only
/// distinguish four severities, so `Result` — the original's "just the computed
/// results, nothing chattier" threshold — collapses onto the same filter as `Warn`:
/// the result text itself is never routed through `log`, it's printed directly by
/// [`process_circuit`] and gated by `--silent` instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Verbosity {
    Info,
    Result,
    Warn,
    Error,
    Fatal,
}

impl Verbosity {
    fn level_filter(self) -> LevelFilter {
        match self {
            Verbosity::Info => LevelFilter::Info,
            Verbosity::Result | Verbosity::Warn => LevelFilter::Warn,
            Verbosity::Error | Verbosity::Fatal => LevelFilter::Error,
        }
    }
}

/// One of the original program's three log entry formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Raw,
    Short,
    Long,
}

/// Derives the closed-form symbolic transfer functions of an ideal linear electric
/// network from one or more netlist files.
#[derive(Debug, Parser)]
#[command(name = "linnetc", version, about)]
pub struct Cli {
    /// Verbosity of logged diagnostics; result text on stdout is controlled separately
    /// by `--silent`.
    #[arg(short, long, value_enum, default_value_t = Verbosity::Result)]
    pub verbosity: Verbosity,

    /// Log entry format.
    #[arg(short = 'f', long = "log-format", value_enum, default_value_t = LogFormat::Long)]
    pub log_format: LogFormat,

    /// Do not echo human-readable results to stdout (diagnostics still go to the log).
    #[arg(short, long)]
    pub silent: bool,

    /// Write logged diagnostics to this file instead of stderr.
    #[arg(short, long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Truncate the log file at startup instead of appending to it.
    #[arg(short, long)]
    pub clear_log_file: bool,

    /// Directory to write one generated Octave script per circuit into. The directory
    /// must already exist. No numeric script is generated if this is absent.
    #[arg(short = 'o', long, value_name = "DIR")]
    pub octave_dir: Option<PathBuf>,

    /// Do not copy the common Octave helper scripts the generated code builds on into
    /// `--octave-dir`.
    #[arg(short = 'i', long = "no-copy-common-scripts")]
    pub no_copy_common_scripts: bool,

    /// Netlist files to process (`*.ckt` / `*.cnl`), each handled independently.
    #[arg(required = true)]
    pub circuit_files: Vec<PathBuf>,
}

/// One static Octave helper script the generated per-circuit scripts build on (§6
/// "Template copying"). Embedded at compile time rather than located relative to the
/// installed binary at run time, since this workspace has no installer step that would
/// place a resource directory next to the executable.
const COMMON_SCRIPTS: &[(&str, &str)] =
    &[("common_plot_style.m", include_str!("../templates/octave/common_plot_style.m"))];

pub fn init_logger(cli: &Cli) {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(cli.verbosity.level_filter());
    match cli.log_format {
        LogFormat::Raw => {
            builder.format(|buf, record| writeln!(buf, "{}", record.args()));
        }
        LogFormat::Short => {
            builder.format(|buf, record| writeln!(buf, "[{}] {}", record.level(), record.args()));
        }
        LogFormat::Long => {}
    }
    if let Some(path) = &cli.log_file {
        let file = fs::OpenOptions::new()
            .create(true)
            .append(!cli.clear_log_file)
            .truncate(cli.clear_log_file)
            .write(true)
            .open(path)
            .unwrap_or_else(|err| panic!("cannot open log file {}: {err}", path.display()));
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    builder.init();
}

pub fn new_diagnostics() -> DiagnosticsHandler {
    let codemap = Arc::new(CodeMap::new());
    let emitter = Arc::new(DefaultEmitter::new(ColorChoice::Auto));
    DiagnosticsHandler::new(Default::default(), codemap, emitter)
}

/// Runs the whole batch: parses, solves, and renders every file in `cli.circuit_files`,
/// logging and continuing past a circuit-level failure rather than aborting. Returns
/// `true` iff every circuit succeeded (§6/§7: the aggregate exit code).
pub fn run(cli: &Cli, diagnostics: &DiagnosticsHandler) -> bool {
    if let Some(dir) = &cli.octave_dir {
        if !cli.no_copy_common_scripts {
            if let Err(err) = copy_common_scripts(dir) {
                log::warn!("{err}");
            }
        }
    }

    let mut any_failed = false;
    for path in &cli.circuit_files {
        if let Err(message) = process_circuit(cli, path) {
            diagnostics.diagnostic(Severity::Error).with_message(message).emit();
            any_failed = true;
        }
    }
    if any_failed {
        log::error!("one or more circuits failed to process");
    }
    !any_failed
}

/// Copies every entry of [`COMMON_SCRIPTS`] into `dir`, skipping a file already present
/// (the original program's "don't force copying again" behavior).
fn copy_common_scripts(dir: &Path) -> Result<(), String> {
    for (name, contents) in COMMON_SCRIPTS {
        let dest = dir.join(name);
        if dest.exists() {
            continue;
        }
        fs::write(&dest, contents).map_err(|err| format!("{}: {err}", dest.display()))?;
    }
    Ok(())
}

pub fn process_circuit(cli: &Cli, path: &Path) -> Result<(), String> {
    let name = path.file_stem().and_then(|s| s.to_str()).unwrap_or("circuit").to_string();
    let source = fs::read_to_string(path).map_err(|err| format!("{}: {err}", path.display()))?;

    let circuit = linnet_parser::parse_circuit(&name, &source).map_err(|err| format!("{}: {err}", path.display()))?;
    let solution =
        linnet_ir::engine::solve_circuit(&circuit).map_err(|err| format!("{}: {err}", path.display()))?;

    if !cli.silent {
        println!("{}", linnet_codegen::render_text(&solution));
    }

    if let Some(dir) = &cli.octave_dir {
        let script = linnet_codegen::render_octave(&solution);
        let out_path = dir.join(format!("{name}.m"));
        fs::write(&out_path, script).map_err(|err| format!("{}: {err}", out_path.display()))?;
        log::info!("wrote {}", out_path.display());
    }

    Ok(())
}
