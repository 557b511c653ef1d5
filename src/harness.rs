//! One pass over the descriptor directory: run, classify, parse, append.

use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::config::{Cli, RunMode};
use crate::descriptor::AlgorithmDescriptor;
use crate::error::Result;
use crate::parse::{require_version, LogExtractor};
use crate::results::{ResultRow, ResultWriter, RunMetadata, Separator};
use crate::segment::{segment, SegmentedCommandLine};
use crate::util::{pretty_print_plan, verify_paths};
use crate::wrapper::{BenchmarkRunner, DryRunExecutor, Executor, LiveExecutor, RunReport, RunStatus};

/// Settings for one harness invocation, independent of how they were parsed
#[derive(Debug, Clone)]
pub struct HarnessOptions {
    pub run_mode: RunMode,
    pub directory: PathBuf,
    pub filter: String,
    pub output_directory: PathBuf,
    pub separator: Separator,
    pub results_file: String,
    pub strict_exit_status: bool,
    pub color: bool,
}

impl From<&Cli> for HarnessOptions {
    fn from(cli: &Cli) -> Self {
        Self {
            run_mode: cli.run_mode,
            directory: cli.directory.clone(),
            filter: cli.filter.clone(),
            output_directory: cli.output_directory.clone(),
            separator: cli.separator,
            results_file: cli.results_file.clone(),
            strict_exit_status: cli.strict_exit_status,
            color: !cli.no_color && termion::is_tty(&std::io::stdout()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DescriptorOutcome {
    pub file_name: String,
    pub reports: Vec<RunReport>,
    pub rows: usize,
}

#[derive(Debug, Clone)]
pub struct Summary {
    pub processed: Vec<DescriptorOutcome>,
    pub results_path: PathBuf,
    pub rows_written: usize,
}

/// Descriptor files in `directory` whose name matches `filter`, sorted by name.
pub fn matching_files(directory: &Path, filter: &str) -> Result<Vec<String>> {
    let pattern = glob::Pattern::new(filter)?;
    let mut names = Vec::new();
    for entry in std::fs::read_dir(directory)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if pattern.matches(&name) {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

/// Segment `remainder`, check it, and run every matching descriptor.
pub fn run(options: &HarnessOptions, remainder: &[String]) -> Result<Summary> {
    let cmdline = segment(remainder)?;
    if options.run_mode == RunMode::Run {
        verify_paths(&cmdline)?;
    }
    pretty_print_plan(&cmdline, options.color);

    let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    match options.run_mode {
        RunMode::Run => {
            let mut runner = BenchmarkRunner::new(LiveExecutor, !options.strict_exit_status);
            run_with(options, &cmdline, &mut runner, &timestamp)
        }
        RunMode::Test => {
            info!("🌵 NOT LAUNCHING ANYTHING BECAUSE THIS IS A TEST RUN! 🌵");
            let mut runner = BenchmarkRunner::new(DryRunExecutor::default(), !options.strict_exit_status);
            run_with(options, &cmdline, &mut runner, &timestamp)
        }
    }
}

/// The per-descriptor loop, with the executor supplied by the caller.
pub fn run_with<E: Executor>(
    options: &HarnessOptions,
    cmdline: &SegmentedCommandLine,
    runner: &mut BenchmarkRunner<E>,
    timestamp: &str,
) -> Result<Summary> {
    // Every descriptor is checked before anything is launched or written
    let mut descriptors = Vec::new();
    for file_name in matching_files(&options.directory, &options.filter)? {
        let path = options.directory.join(&file_name);
        let descriptor = AlgorithmDescriptor::from_file(&path)?;
        descriptor.collective()?;
        descriptor.inplace()?;
        descriptor.proto()?;
        descriptor.name()?;
        cmdline.validate_against(&descriptor)?;
        descriptors.push((file_name, path, descriptor));
    }

    if !options.output_directory.exists() {
        info!("Creating output directory: {}", options.output_directory.display());
        std::fs::create_dir_all(&options.output_directory)?;
    }
    let results_path = options.output_directory.join(&options.results_file);
    let mut writer = ResultWriter::open(&results_path, options.separator)?;

    let mut processed = Vec::new();
    for (file_name, descriptor_path, descriptor) in descriptors {
        // Both runs report only the placement the algorithm implements
        let in_place = descriptor.inplace()?;
        info!("Run benchmark in mode {:?} for file: {}", options.run_mode, file_name);
        let mut reports = runner.run(cmdline, &descriptor, &descriptor_path, &options.output_directory)?;
        let mut rows = 0;
        for report in reports.iter_mut().filter(|r| r.status.is_success()) {
            let contents = std::fs::read_to_string(&report.output)?;
            let version = match require_version(&contents, &report.output) {
                Ok(version) => version,
                Err(e) if e.is_soft() => {
                    warn!("{}, skipping its results", e);
                    report.status = RunStatus::MissingVersion;
                    continue;
                }
                Err(e) => return Err(e),
            };

            let meta = RunMetadata {
                library: report.kind.library(),
                version: &version,
                timestamp,
                source_file: &file_name,
                filter: &options.filter,
            };
            let before = rows;
            let extractor = LogExtractor::for_text(&contents)?;
            for record in extractor.records(&contents) {
                if let Some(row) = ResultRow::new(&descriptor, &record, in_place, &meta)? {
                    writer.append(&row)?;
                    rows += 1;
                }
            }
            if rows == before {
                warn!("No result lines found in {}", report.output.display());
            }
        }
        writer.flush()?;

        processed.push(DescriptorOutcome { file_name, reports, rows });
    }

    Ok(Summary {
        processed,
        results_path: writer.path().to_path_buf(),
        rows_written: writer.rows_written(),
    })
}
