//! Splits the raw command-line remainder into launcher, helper, benchmark pieces.
//!
//! The remainder has no explicit delimiters, so the split is driven by token
//! suffixes:
//!
//! ```text
//! <..mpirun> <mpirun options..> [<..launcher.sh>] <..nccl-tests/build> <nccl-tests options..>
//! ```
//!
//! `-np <n>` is pulled out of the launcher options (the harness sets it from
//! the descriptor) and `-x MSCCL_XML_FILES=...` is rejected outright.

use log::debug;

use crate::descriptor::AlgorithmDescriptor;
use crate::error::{BenchError, Result};

/// Launcher executable name (or path suffix)
pub const LAUNCHER_NAME: &str = "mpirun";

/// Suffix identifying the optional helper launch script
pub const HELPER_SUFFIX: &str = "launcher.sh";

/// Suffix identifying the nccl-tests build directory
pub const BENCHMARK_DIR_SUFFIX: &str = "nccl-tests/build";

/// The environment variable this tool sets for the variant run
pub const RESERVED_VARIABLE: &str = "MSCCL_XML_FILES";

const NP_FLAG: &str = "-np";
const ENV_FLAG: &str = "-x";

/// States of the segmentation routine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentState {
    ScanningLauncher,
    ScanningOptions,
    ExpectHelperOrBinary,
    Done,
}

/// Explicit `-np` given on the command line, with where it was found
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessCount {
    pub value: u32,
    /// Index into `launcher_options` at which the pair was removed
    position: usize,
}

/// The remainder of the command line, split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentedCommandLine {
    pub launcher: String,
    pub launcher_options: Vec<String>,
    pub process_count: Option<ProcessCount>,
    pub helper_script: Option<String>,
    pub benchmark_dir: String,
    pub benchmark_options: Vec<String>,
}

pub fn is_launcher(token: &str) -> bool {
    token.ends_with(LAUNCHER_NAME)
}

fn is_helper(token: &str) -> bool {
    token.ends_with(HELPER_SUFFIX)
}

fn is_benchmark_dir(token: &str) -> bool {
    let trimmed = token.trim_end_matches('/');
    trimmed.ends_with(BENCHMARK_DIR_SUFFIX)
        || trimmed.ends_with(&BENCHMARK_DIR_SUFFIX.replace('/', std::path::MAIN_SEPARATOR_STR))
}

fn reserved_assignment(token: &str) -> bool {
    token
        .strip_prefix(RESERVED_VARIABLE)
        .is_some_and(|rest| rest.starts_with('='))
}

/// Segment the remainder tokens (starting at the launcher).
pub fn segment<S: AsRef<str>>(tokens: &[S]) -> Result<SegmentedCommandLine> {
    let mut state = SegmentState::ScanningLauncher;
    let mut iter = tokens.iter().map(|t| t.as_ref()).peekable();

    let mut launcher = None;
    let mut launcher_options: Vec<String> = Vec::new();
    let mut process_count = None;
    let mut helper_script = None;
    let mut benchmark_dir = None;

    while state != SegmentState::Done {
        match state {
            SegmentState::ScanningLauncher => match iter.next() {
                Some(token) if is_launcher(token) => {
                    launcher = Some(token.to_string());
                    state = SegmentState::ScanningOptions;
                }
                Some(token) => {
                    return Err(BenchError::Structural(format!(
                        "{} must be the {} command",
                        token, LAUNCHER_NAME
                    )));
                }
                None => {
                    return Err(BenchError::Structural(format!(
                        "{} command not found in arguments",
                        LAUNCHER_NAME
                    )));
                }
            },

            SegmentState::ScanningOptions => match iter.peek().copied() {
                None => {
                    return Err(BenchError::Structural(format!(
                        "{} not found in command line arguments",
                        BENCHMARK_DIR_SUFFIX
                    )));
                }
                Some(token) if is_helper(token) || is_benchmark_dir(token) => {
                    state = SegmentState::ExpectHelperOrBinary;
                }
                Some(NP_FLAG) => {
                    iter.next();
                    if process_count.is_some() {
                        return Err(BenchError::Structural(format!(
                            "{} given more than once",
                            NP_FLAG
                        )));
                    }
                    let raw = match iter.next() {
                        Some(raw) if !is_helper(raw) && !is_benchmark_dir(raw) => raw,
                        _ => {
                            return Err(BenchError::Structural(format!(
                                "{} requires a value",
                                NP_FLAG
                            )))
                        }
                    };
                    let value = raw.parse::<u32>().map_err(|_| {
                        BenchError::Validation(format!(
                            "{} value `{}` is not a process count",
                            NP_FLAG, raw
                        ))
                    })?;
                    process_count = Some(ProcessCount {
                        value,
                        position: launcher_options.len(),
                    });
                }
                Some(ENV_FLAG) => {
                    iter.next();
                    launcher_options.push(ENV_FLAG.to_string());
                    if let Some(next) = iter.peek().copied() {
                        if reserved_assignment(next) {
                            return Err(BenchError::ConfigConflict {
                                variable: RESERVED_VARIABLE.to_string(),
                                reason: "it is set from the --directory descriptor files".to_string(),
                            });
                        }
                    }
                }
                Some(token) => {
                    iter.next();
                    launcher_options.push(token.to_string());
                }
            },

            SegmentState::ExpectHelperOrBinary => match iter.next() {
                Some(token) if helper_script.is_none() && is_helper(token) => {
                    helper_script = Some(token.to_string());
                }
                Some(token) if is_benchmark_dir(token) => {
                    benchmark_dir = Some(token.to_string());
                    state = SegmentState::Done;
                }
                Some(token) => {
                    return Err(BenchError::Structural(format!(
                        "expected {} after {}, found `{}`",
                        BENCHMARK_DIR_SUFFIX, HELPER_SUFFIX, token
                    )));
                }
                None => {
                    return Err(BenchError::Structural(format!(
                        "{} not found in command line arguments",
                        BENCHMARK_DIR_SUFFIX
                    )));
                }
            },

            SegmentState::Done => unreachable!(),
        }
    }

    let segmented = SegmentedCommandLine {
        // Both are set on the only path into `Done`
        launcher: launcher.unwrap_or_default(),
        launcher_options,
        process_count,
        helper_script,
        benchmark_dir: benchmark_dir.unwrap_or_default(),
        benchmark_options: iter.map(str::to_string).collect(),
    };
    debug!("Segmented command line: {:?}", segmented);
    Ok(segmented)
}

impl SegmentedCommandLine {
    /// Check an explicit `-np` against the descriptor's `ngpus`.
    pub fn validate_against(&self, descriptor: &AlgorithmDescriptor) -> Result<()> {
        let ngpus = descriptor.ngpus()?;
        match &self.process_count {
            Some(np) if np.value != ngpus => Err(BenchError::Validation(format!(
                "{} value {} does not match ngpus value {} in the descriptor",
                NP_FLAG, np.value, ngpus
            ))),
            _ => Ok(()),
        }
    }

    /// All segments in order, without the extracted `-np` pair.
    pub fn tokens(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(self.launcher_options.len() + self.benchmark_options.len() + 3);
        out.push(self.launcher.clone());
        out.extend(self.launcher_options.iter().cloned());
        out.extend(self.helper_script.iter().cloned());
        out.push(self.benchmark_dir.clone());
        out.extend(self.benchmark_options.iter().cloned());
        out
    }

    /// The original remainder, with `-np` put back where it was found.
    pub fn reconstruct(&self) -> Vec<String> {
        let mut out = self.tokens();
        if let Some(np) = &self.process_count {
            // +1 skips the launcher itself
            let at = np.position + 1;
            out.insert(at, np.value.to_string());
            out.insert(at, NP_FLAG.to_string());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(s: &str) -> Vec<String> {
        s.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn minimal_command_line() {
        let seg = segment(&toks("mpirun nccl-tests/build")).unwrap();
        assert_eq!(seg.launcher, "mpirun");
        assert!(seg.launcher_options.is_empty());
        assert_eq!(seg.benchmark_dir, "nccl-tests/build");
        assert!(seg.benchmark_options.is_empty());
        assert!(seg.helper_script.is_none());
        assert!(seg.process_count.is_none());
    }

    #[test]
    fn full_command_line() {
        let input = toks(
            "/opt/ompi/bin/mpirun --bind-to numa -np 16 -x NCCL_DEBUG=INFO \
             ~/msccl-tools/msccl/autosynth/msccl_ndv2_launcher.sh ~/nccl-tests/build -b 1KB -e 1MB -f 2",
        );
        let seg = segment(&input).unwrap();
        assert_eq!(seg.launcher, "/opt/ompi/bin/mpirun");
        assert_eq!(seg.launcher_options, toks("--bind-to numa -x NCCL_DEBUG=INFO"));
        assert_eq!(seg.process_count.as_ref().map(|p| p.value), Some(16));
        assert_eq!(
            seg.helper_script.as_deref(),
            Some("~/msccl-tools/msccl/autosynth/msccl_ndv2_launcher.sh")
        );
        assert_eq!(seg.benchmark_dir, "~/nccl-tests/build");
        assert_eq!(seg.benchmark_options, toks("-b 1KB -e 1MB -f 2"));
        assert_eq!(seg.reconstruct(), input);
    }

    #[test]
    fn hostfile_is_not_help() {
        let seg = segment(&toks("mpirun -hostfile /job/hostfile nccl-tests/build -h")).unwrap();
        assert_eq!(seg.launcher_options, toks("-hostfile /job/hostfile"));
        assert_eq!(seg.benchmark_options, toks("-h"));
    }

    #[test]
    fn trailing_slash_on_build_dir() {
        let seg = segment(&toks("mpirun nccl-tests/build/ -g 1")).unwrap();
        assert_eq!(seg.benchmark_dir, "nccl-tests/build/");
    }

    #[test]
    fn launcher_must_come_first() {
        assert!(matches!(
            segment(&toks("nccl-tests/build")).unwrap_err(),
            BenchError::Structural(_)
        ));
        let empty: Vec<String> = Vec::new();
        let err = segment(&empty).unwrap_err();
        assert!(err.to_string().contains("mpirun"));
    }

    #[test]
    fn missing_benchmark_dir() {
        let err = segment(&toks("mpirun --bind-to numa")).unwrap_err();
        assert!(matches!(err, BenchError::Structural(_)));
        assert!(err.to_string().contains("nccl-tests/build"));

        let err = segment(&toks("mpirun msccl_launcher.sh -b 1KB")).unwrap_err();
        assert!(matches!(err, BenchError::Structural(_)));
    }

    #[test]
    fn dangling_np() {
        assert!(matches!(segment(&toks("mpirun -np")).unwrap_err(), BenchError::Structural(_)));
        assert!(matches!(
            segment(&toks("mpirun -np lots nccl-tests/build")).unwrap_err(),
            BenchError::Validation(_)
        ));
    }

    #[test]
    fn np_value_cannot_be_an_anchor() {
        for line in ["mpirun -np nccl-tests/build", "mpirun -np ndv2_launcher.sh nccl-tests/build"] {
            let err = segment(&toks(line)).unwrap_err();
            assert!(matches!(err, BenchError::Structural(_)), "{}", line);
            assert!(err.to_string().contains("-np requires a value"), "{}", line);
        }
    }

    #[test]
    fn np_only_once() {
        let err = segment(&toks("mpirun -np 16 -x A=1 -np 8 nccl-tests/build")).unwrap_err();
        assert!(matches!(err, BenchError::Structural(_)));
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn reserved_variable_is_rejected() {
        let err = segment(&toks("mpirun -x MSCCL_XML_FILES=foo")).unwrap_err();
        assert!(matches!(err, BenchError::ConfigConflict { .. }));
        assert!(err.to_string().contains("MSCCL_XML_FILES"));

        // A variable that only shares the prefix is fine
        let seg = segment(&toks("mpirun -x MSCCL_XML_FILES_EXTRA=1 nccl-tests/build")).unwrap();
        assert_eq!(seg.launcher_options, toks("-x MSCCL_XML_FILES_EXTRA=1"));
    }

    #[test]
    fn reserved_variable_after_benchmark_dir_is_passed_through() {
        let seg = segment(&toks("mpirun nccl-tests/build -x MSCCL_XML_FILES=foo")).unwrap();
        assert_eq!(seg.benchmark_options, toks("-x MSCCL_XML_FILES=foo"));
    }

    #[test]
    fn np_validation() {
        let d16 = AlgorithmDescriptor::parse(r#"<algo coll="allgather" ngpus="16" inplace="1"/>"#).unwrap();
        let ok = segment(&toks("mpirun -np 16 nccl-tests/build")).unwrap();
        assert!(ok.validate_against(&d16).is_ok());

        let bad = segment(&toks("mpirun -np 8 nccl-tests/build")).unwrap();
        assert!(matches!(bad.validate_against(&d16).unwrap_err(), BenchError::Validation(_)));

        let absent = segment(&toks("mpirun nccl-tests/build")).unwrap();
        assert!(absent.validate_against(&d16).is_ok());
    }
}
