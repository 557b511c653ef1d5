use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::results::Separator;
use crate::segment::is_launcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RunMode {
    /// Iterate and write results, but use canned benchmark output instead of launching
    Test,
    /// Actually run the benchmarks
    Run,
}

/// Run NCCL benchmark tests using NCCL and MSCCL
#[derive(Debug, Clone, Parser)]
#[command(
    name = "msccl_bench",
    version,
    override_usage = "msccl_bench [OPTIONS] --filter <FILTER> --output-directory <DIR> \
        <mpirun command> <mpirun arguments> <optional launcher.sh> <path to nccl-tests/build> <nccl-tests arguments>",
    after_help = "After the options above the next argument must be the mpirun command (or a path \
        ending in mpirun) followed by its arguments. -np does not need to be given; it is set from \
        each MSCCL XML file, and if given it must match the file's ngpus.\n\n\
        Next an optional launcher.sh script can be given (e.g. msccl-tools/msccl/autosynth/msccl_ndv2_launcher.sh).\n\n\
        Next the nccl-tests/build directory must be given. The perf binary matching each XML file's \
        collective is appended to it.\n\nFinally, the arguments to the nccl-tests binary.\n\n\
        Example:\n  msccl_bench --run-mode run --directory ~/sccl-presynth/sccl_presynth --filter '*gather.n16*' \
        -o ~/output mpirun --bind-to numa --tag-output -hostfile /job/hostfile -x NCCL_DEBUG=INFO \
        -x NCCL_ALGO=MSCCL,RING,TREE ~/msccl-tools/msccl/autosynth/msccl_ndv2_launcher.sh ~/nccl-tests/build \
        -b 1KB -e 1MB -f 2 -g 1 -c 1 -w 100 -n 100"
)]
pub struct Cli {
    /// `test` fakes benchmark output, `run` launches the benchmarks
    #[arg(short = 'r', long, value_enum, default_value = "run")]
    pub run_mode: RunMode,

    /// Directory where the MSCCL XML files are located
    #[arg(short = 'd', long, env = "MSCCL_XMLS", default_value_os_t = default_directory())]
    pub directory: PathBuf,

    /// Shell-style glob for the XML file names in the directory to test
    #[arg(short = 'f', long)]
    pub filter: String,

    /// Where per-run outputs (`<xml>_nccl_result.txt`, `<xml>_msccl_result.txt`) and the results file go
    #[arg(short = 'o', long, env = "EXPERIMENTS_OUTPUT_DIR")]
    pub output_directory: PathBuf,

    /// Column separator of the results file
    #[arg(long, value_enum, default_value = "tab")]
    pub separator: Separator,

    /// Name of the results file inside the output directory
    #[arg(long, default_value = "results.txt")]
    pub results_file: String,

    /// Treat a nonzero exit of the launcher as a failed run
    #[arg(long)]
    pub strict_exit_status: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,
}

fn default_directory() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_default()
        .join("sccl-presynth")
        .join("sccl_presynth")
}

/// Split argv at the launcher: the tool's own arguments (with argv[0]) and the rest.
///
/// Splitting before clap sees anything keeps launcher flags like `-hostfile`
/// from being read as `-h`.
pub fn split_script_args(argv: &[String]) -> (Vec<String>, Vec<String>) {
    let at = argv
        .iter()
        .skip(1)
        .position(|arg| is_launcher(arg))
        .map(|i| i + 1)
        .unwrap_or(argv.len());
    (argv[..at].to_vec(), argv[at..].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(s: &str) -> Vec<String> {
        s.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn split_at_launcher() {
        let (script, rest) = split_script_args(&argv(
            "msccl_bench -r test -f *.xml -o out /usr/bin/mpirun -hostfile h nccl-tests/build -b 8",
        ));
        assert_eq!(script, argv("msccl_bench -r test -f *.xml -o out"));
        assert_eq!(rest, argv("/usr/bin/mpirun -hostfile h nccl-tests/build -b 8"));
    }

    #[test]
    fn no_launcher() {
        let (script, rest) = split_script_args(&argv("msccl_bench -f x -o out nccl-tests/build"));
        assert_eq!(script.len(), 5);
        assert!(rest.is_empty());
    }

    #[test]
    fn parses_options() {
        let (script, _) = split_script_args(&argv(
            "msccl_bench --run-mode test -d xmls --filter *gather* --output-directory out --separator comma mpirun",
        ));
        let cli = Cli::try_parse_from(script).unwrap();
        assert_eq!(cli.run_mode, RunMode::Test);
        assert_eq!(cli.directory, PathBuf::from("xmls"));
        assert_eq!(cli.filter, "*gather*");
        assert_eq!(cli.separator, Separator::Comma);
        assert_eq!(cli.results_file, "results.txt");
        assert!(!cli.strict_exit_status);
    }

    #[test]
    fn filter_is_required() {
        assert!(Cli::try_parse_from(argv("msccl_bench -o out")).is_err());
    }

    #[test]
    fn cli_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
