//! Runs the built binary in test mode, which never launches mpirun.

use std::process::{Command, Output};

const DESCRIPTOR: &str = include_str!("../fixtures/allreduce.n16.ring.xml");

fn msccl_bench(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_msccl_bench"))
        .args(args)
        .env_remove("MSCCL_XMLS")
        .env_remove("EXPERIMENTS_OUTPUT_DIR")
        .output()
        .unwrap()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn test_mode_writes_results() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("allreduce.n16.ring.xml"), DESCRIPTOR).unwrap();
    let out = dir.path().join("output");

    let output = msccl_bench(&[
        "--run-mode", "test",
        "--directory", dir.path().to_str().unwrap(),
        "--filter", "*.xml",
        "--output-directory", out.to_str().unwrap(),
        "--no-color",
        "mpirun", "-hostfile", "/job/hostfile", "nccl-tests/build", "-b", "1KB",
    ]);
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(!stderr(&output).contains("Error"));
    let results = std::fs::read_to_string(out.join("results.txt")).unwrap();
    assert!(results.starts_with("Collective\t"));
}

#[test]
fn zero_files_is_not_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("output");
    let output = msccl_bench(&[
        "-r", "test", "-d", dir.path().to_str().unwrap(), "-f", "*", "-o", out.to_str().unwrap(),
        "mpirun", "nccl-tests/build",
    ]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("No files were processed"));
}

#[test]
fn missing_launcher_prints_usage() {
    let output = msccl_bench(&["-r", "test", "-d", ".", "-f", "*", "-o", "output", "nccl-tests/build"]);
    assert!(!output.status.success());
    // Rejected by the option parser, whose usage line names the launcher
    let err = stderr(&output).to_lowercase();
    assert!(err.contains("mpirun"));
    assert!(err.contains("usage"));
}

#[test]
fn missing_build_dir_prints_usage() {
    let output = msccl_bench(&["-r", "test", "-d", ".", "-f", "*", "-o", "output", "mpirun"]);
    assert!(!output.status.success());
    let err = stderr(&output);
    assert!(err.contains("nccl-tests"));
    assert!(err.contains("usage"));
}

#[test]
fn reserved_variable_is_reported() {
    let output = msccl_bench(&[
        "-r", "test", "-d", ".", "-f", "*", "-o", "output", "mpirun", "-x", "MSCCL_XML_FILES=foo",
    ]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("MSCCL_XML_FILES"));
}
