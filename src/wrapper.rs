use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use log::{debug, info, warn};

use crate::descriptor::AlgorithmDescriptor;
use crate::error::Result;
use crate::parse::{has_confirmation_marker, has_failure_marker};
use crate::segment::{SegmentedCommandLine, RESERVED_VARIABLE};

/// Output of a real nccl-tests all-reduce run on 16 V100s, used in place of running anything
const SAMPLE_OUTPUT: &str = include_str!("../fixtures/sample_output.txt");

/// Which of the two runs per descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunKind {
    /// Plain NCCL, no algorithm override
    Baseline,
    /// MSCCL with `MSCCL_XML_FILES` pointing at the descriptor
    Variant,
}

impl RunKind {
    /// Library label written to the results file
    pub fn library(self) -> &'static str {
        match self {
            RunKind::Baseline => "NCCL",
            RunKind::Variant => "MSCCL",
        }
    }

    fn file_suffix(self) -> &'static str {
        match self {
            RunKind::Baseline => "nccl_result.txt",
            RunKind::Variant => "msccl_result.txt",
        }
    }
}

/// A fully assembled launcher command with its stdout destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub kind: RunKind,
    pub program: String,
    pub args: Vec<String>,
    pub stdout_path: PathBuf,
    pub descriptor_path: PathBuf,
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        write!(f, " > {}", self.stdout_path.display())
    }
}

/// Output file for one run of one descriptor file
pub fn output_path(output_dir: &Path, descriptor_file_name: &str, kind: RunKind) -> PathBuf {
    output_dir.join(format!("{}_{}", descriptor_file_name, kind.file_suffix()))
}

/// Build the baseline and variant invocations for one descriptor.
pub fn build_invocations(
    cmdline: &SegmentedCommandLine,
    descriptor: &AlgorithmDescriptor,
    descriptor_path: &Path,
    output_dir: &Path,
) -> Result<[Invocation; 2]> {
    let collective = descriptor.collective()?;
    let ngpus = descriptor.ngpus()?;
    let perf_test = Path::new(&cmdline.benchmark_dir).join(collective.perf_binary());
    let file_name = descriptor_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let build = |kind: RunKind| {
        let mut args = vec!["-np".to_string(), ngpus.to_string()];
        args.extend(cmdline.launcher_options.iter().cloned());
        if kind == RunKind::Variant {
            args.push("-x".to_string());
            args.push(format!("{}={}", RESERVED_VARIABLE, descriptor_path.display()));
        }
        args.extend(cmdline.helper_script.iter().cloned());
        args.push(perf_test.to_string_lossy().into_owned());
        args.extend(cmdline.benchmark_options.iter().cloned());

        Invocation {
            kind,
            program: cmdline.launcher.clone(),
            args,
            stdout_path: output_path(output_dir, &file_name, kind),
            descriptor_path: descriptor_path.to_path_buf(),
        }
    };

    Ok([build(RunKind::Baseline), build(RunKind::Variant)])
}

/// Runs (or pretends to run) one invocation, leaving its output at `stdout_path`.
pub trait Executor {
    /// Returns whether the process exited successfully
    fn execute(&mut self, invocation: &Invocation) -> Result<bool>;
}

/// Launches the command and blocks until it exits
#[derive(Debug, Clone, Default)]
pub struct LiveExecutor;

impl Executor for LiveExecutor {
    fn execute(&mut self, invocation: &Invocation) -> Result<bool> {
        let stdout = File::create(&invocation.stdout_path)?;
        let status = Command::new(&invocation.program)
            .args(&invocation.args)
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::inherit())
            .status()?;

        if !status.success() {
            warn!("{} {}", invocation.program, describe_exit(status.code()));
        }
        Ok(status.success())
    }
}

fn describe_exit(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("exited with code: {}", code),
        None => "was terminated by a signal".to_string(),
    }
}

/// Writes canned output instead of launching anything
#[derive(Debug, Clone)]
pub struct DryRunExecutor {
    output: String,
}

impl DryRunExecutor {
    pub fn new(output: impl Into<String>) -> Self {
        Self { output: output.into() }
    }
}

impl Default for DryRunExecutor {
    fn default() -> Self {
        Self::new(SAMPLE_OUTPUT)
    }
}

impl Executor for DryRunExecutor {
    fn execute(&mut self, invocation: &Invocation) -> Result<bool> {
        let mut contents = String::new();
        if invocation.kind == RunKind::Variant {
            let name = invocation
                .descriptor_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            contents.push_str(&format!("File {} {} (dry run)\n", name, crate::parse::CONFIRMATION_MARKER));
        }
        contents.push_str(&self.output);
        std::fs::write(&invocation.stdout_path, contents)?;
        Ok(true)
    }
}

/// How a single run ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Succeeded,
    /// `NCCL WARN` / `NCCL ERROR` in the output
    FailureMarker,
    /// Variant output without `Parsed MSCCL`
    MissingConfirmation,
    /// Nonzero exit while exit codes are not ignored
    ExitStatus,
    /// No `NCCL version` line to attribute the results to
    MissingVersion,
}

impl RunStatus {
    pub fn is_success(self) -> bool {
        self == RunStatus::Succeeded
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Succeeded => "ok",
            RunStatus::FailureMarker => "WARN/ERROR in output",
            RunStatus::MissingConfirmation => "MSCCL not loaded",
            RunStatus::ExitStatus => "nonzero exit",
            RunStatus::MissingVersion => "no version line",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub kind: RunKind,
    pub output: PathBuf,
    pub status: RunStatus,
}

/// Classify one run's captured output
pub fn classify(kind: RunKind, contents: &str) -> RunStatus {
    if has_failure_marker(contents) {
        RunStatus::FailureMarker
    } else if kind == RunKind::Variant && !has_confirmation_marker(contents) {
        RunStatus::MissingConfirmation
    } else {
        RunStatus::Succeeded
    }
}

/// Runs the baseline and the variant for each descriptor, one after the other.
pub struct BenchmarkRunner<E: Executor> {
    executor: E,
    ignore_error_status_codes: bool,
}

impl<E: Executor> BenchmarkRunner<E> {
    pub fn new(executor: E, ignore_error_status_codes: bool) -> Self {
        Self { executor, ignore_error_status_codes }
    }

    pub fn run(
        &mut self,
        cmdline: &SegmentedCommandLine,
        descriptor: &AlgorithmDescriptor,
        descriptor_path: &Path,
        output_dir: &Path,
    ) -> Result<Vec<RunReport>> {
        let invocations = build_invocations(cmdline, descriptor, descriptor_path, output_dir)?;

        let mut exit_ok = Vec::with_capacity(invocations.len());
        for invocation in &invocations {
            if invocation.stdout_path.exists() {
                std::fs::remove_file(&invocation.stdout_path)?;
            }
            info!("Running {} test: {}", invocation.kind.library(), invocation);
            debug!("argv: {:?} {:?}", invocation.program, invocation.args);
            exit_ok.push(self.executor.execute(invocation)?);
        }

        let mut reports = Vec::with_capacity(invocations.len());
        for (invocation, exited_ok) in invocations.iter().zip(exit_ok) {
            let contents = std::fs::read_to_string(&invocation.stdout_path)?;
            let mut status = classify(invocation.kind, &contents);
            if status.is_success() && !exited_ok {
                if self.ignore_error_status_codes {
                    warn!(
                        "{} run exited with an error status, but ignoring and continuing",
                        invocation.kind.library()
                    );
                } else {
                    status = RunStatus::ExitStatus;
                }
            }

            match status {
                RunStatus::Succeeded => info!(
                    "[SUCCESS] {} run for {}, output is {}",
                    invocation.kind.library(),
                    descriptor_path.display(),
                    invocation.stdout_path.display()
                ),
                failure => warn!(
                    "The benchmark failed ({}). See output file {}",
                    failure,
                    invocation.stdout_path.display()
                ),
            }

            reports.push(RunReport {
                kind: invocation.kind,
                output: invocation.stdout_path.clone(),
                status,
            });
        }
        Ok(reports)
    }
}
