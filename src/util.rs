use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use log::warn;
use prettytable::{row, Table};
use termion::color;

use crate::error::{BenchError, Result};
use crate::segment::SegmentedCommandLine;
use crate::harness::DescriptorOutcome;
use crate::wrapper::RunKind;

fn is_executable(path: &Path) -> bool {
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// Look `name` up in `PATH` like a shell would
pub fn find_on_path(name: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

/// The launcher must resolve on `PATH`, or be an executable file if given as a path.
pub fn verify_launcher(launcher: &str) -> Result<()> {
    let found = if launcher.contains(std::path::MAIN_SEPARATOR) {
        is_executable(Path::new(launcher))
    } else {
        find_on_path(launcher).is_some()
    };
    if found {
        Ok(())
    } else {
        Err(BenchError::ExecutableNotFound(launcher.to_string()))
    }
}

pub fn verify_benchmark_dir(dir: &str) -> Result<()> {
    if Path::new(dir).is_dir() {
        Ok(())
    } else {
        Err(BenchError::Structural(format!(
            "{} must be a valid nccl-tests/build directory",
            dir
        )))
    }
}

/// Filesystem checks before really launching anything.
pub fn verify_paths(cmdline: &SegmentedCommandLine) -> Result<()> {
    if cfg!(feature = "no_check_paths") {
        warn!("Built with `no_check_paths`, not verifying launcher or nccl-tests paths");
        return Ok(());
    }
    verify_launcher(&cmdline.launcher)?;
    verify_benchmark_dir(&cmdline.benchmark_dir)
}

/// Pretty print how the command line was split up.
///
/// # Arguments
/// * `cmdline` - The segmented launcher command line
/// * `color` - Whether to use ANSI colors
pub fn pretty_print_plan(cmdline: &SegmentedCommandLine, color: bool) {
    let np = cmdline
        .process_count
        .as_ref()
        .map(|np| np.value.to_string())
        .unwrap_or_else(|| "(from descriptor)".to_string());
    let helper = cmdline.helper_script.as_deref().unwrap_or("(none)");
    let entries = [
        ("launcher", cmdline.launcher.clone()),
        ("launcher options", cmdline.launcher_options.join(" ")),
        ("-np", np),
        ("helper script", helper.to_string()),
        ("nccl-tests", cmdline.benchmark_dir.clone()),
        ("nccl-tests options", cmdline.benchmark_options.join(" ")),
    ];

    println!("|--------------------+------------------------------------------------------------");
    for (label, value) in entries {
        if color {
            println!(
                "| {}{:>18}{} | {}{}{}",
                color::Fg(color::LightBlue),
                label,
                color::Fg(color::Reset),
                color::Fg(color::Yellow),
                value,
                color::Fg(color::Reset),
            );
        } else {
            println!("| {:>18} | {}", label, value);
        }
    }
    println!("|--------------------+------------------------------------------------------------");
}

/// Per-descriptor outcome table printed at the end of a run
pub fn print_summary(outcomes: &[DescriptorOutcome]) {
    let mut table = Table::new();
    table.add_row(row!["Descriptor", "NCCL", "MSCCL", "Rows"]);
    for outcome in outcomes {
        let status = |kind: RunKind| {
            outcome
                .reports
                .iter()
                .find(|r| r.kind == kind)
                .map(|r| r.status.to_string())
                .unwrap_or_else(|| "-".to_string())
        };
        table.add_row(row![outcome.file_name, status(RunKind::Baseline), status(RunKind::Variant), outcome.rows]);
    }
    table.printstd();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_launcher() {
        let err = verify_launcher("definitely-not-an-mpirun-on-this-box").unwrap_err();
        assert!(matches!(err, BenchError::ExecutableNotFound(_)));
        assert!(matches!(
            verify_launcher("/nonexistent/bin/mpirun").unwrap_err(),
            BenchError::ExecutableNotFound(_)
        ));
    }

    #[test]
    fn launcher_by_path() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = dir.path().join("mpirun");
        std::fs::write(&launcher, "#!/bin/sh\n").unwrap();
        let as_str = launcher.to_str().unwrap();
        assert!(verify_launcher(as_str).is_err());

        let mut perms = std::fs::metadata(&launcher).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&launcher, perms).unwrap();
        assert!(verify_launcher(as_str).is_ok());
    }

    #[test]
    fn benchmark_dir_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        assert!(verify_benchmark_dir(dir.path().to_str().unwrap()).is_ok());
        assert!(matches!(
            verify_benchmark_dir("/nonexistent/nccl-tests/build").unwrap_err(),
            BenchError::Structural(_)
        ));
    }
}
