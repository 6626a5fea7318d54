//! End-to-end coverage of the CLI driver against a fixture netlist: a circuit file
//! plus an expected rendered-text golden value.

use std::fs;
use std::path::PathBuf;

use expect_test::expect;
use linnet::{process_circuit, Cli, LogFormat, Verbosity};

fn write_temp_circuit(tag: &str, contents: &str) -> PathBuf {
    let mut path = std::env::temp_dir();
    path.push(format!("linnetc_test_{tag}_{:?}.ckt", std::thread::current().id()));
    fs::write(&path, contents).expect("writing to the system temp dir must succeed");
    path
}

fn default_cli(path: PathBuf, octave_dir: Option<PathBuf>) -> Cli {
    Cli {
        verbosity: Verbosity::Result,
        log_format: LogFormat::Long,
        silent: false,
        log_file: None,
        clear_log_file: false,
        octave_dir,
        no_copy_common_scripts: true,
        circuit_files: vec![path],
    }
}

#[test]
fn processes_rc_lowpass_end_to_end_and_writes_an_octave_script() {
    let path = write_temp_circuit(
        "rc",
        "ground gnd\nvsource U1 in gnd = 1\nresistor R1 in out = 100\ncapacitor C1 out gnd = 1e-6\n",
    );
    let octave_dir = std::env::temp_dir();
    let cli = default_cli(path.clone(), Some(octave_dir.clone()));

    process_circuit(&cli, &path).expect("a well-formed netlist must process cleanly");

    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap();
    let written = fs::read_to_string(octave_dir.join(format!("{stem}.m"))).expect("octave script was written");
    let header = written.lines().next().unwrap_or("");
    expect!["% Auto-generated by linnet. Each function below instantiates an LTI"].assert_eq(header);
    assert!(written.contains("function sys = tf_out(params)"));

    fs::remove_file(&path).ok();
    fs::remove_file(octave_dir.join(format!("{stem}.m"))).ok();
}

#[test]
fn reports_an_error_string_for_an_unparseable_circuit() {
    let path = write_temp_circuit("garbage", "this is not a netlist\n");
    let cli = default_cli(path.clone(), None);

    let err = process_circuit(&cli, &path).unwrap_err();
    assert!(err.contains(&path.display().to_string()));

    fs::remove_file(&path).ok();
}

#[test]
fn rejects_a_circuit_with_two_ground_candidates() {
    let path = write_temp_circuit(
        "ambiguous_ground",
        "vsource U1 in gnd1 = 1\nresistor R1 in gnd2 = 100\n",
    );
    let cli = default_cli(path.clone(), None);

    let err = process_circuit(&cli, &path).unwrap_err();
    assert!(err.contains(&path.display().to_string()));

    fs::remove_file(&path).ok();
}
