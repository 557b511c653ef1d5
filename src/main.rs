use clap::Parser;
use log::{error, info};

use msccl_bench::config::{split_script_args, Cli};
use msccl_bench::harness::{self, HarnessOptions};
use msccl_bench::util::print_summary;

const USAGE_HINT: &str = "usage: msccl_bench [OPTIONS] <mpirun command> <mpirun arguments> \
    <optional launcher.sh> <path to nccl-tests/build> <nccl-tests arguments>\n\
    Use --help to see the full list of arguments.";

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let argv: Vec<String> = std::env::args().collect();
    let (script_args, remainder) = split_script_args(&argv);
    let cli = Cli::parse_from(script_args);
    info!("script arguments: {:?}    remainder arguments: {:?}", cli, remainder);

    let options = HarnessOptions::from(&cli);
    let summary = match harness::run(&options, &remainder) {
        Ok(summary) => summary,
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {}\n{}", e, USAGE_HINT);
            std::process::exit(1);
        }
    };

    if summary.processed.is_empty() {
        println!("No files were processed. Consider changing the filter or nGPU command line arguments.");
    } else {
        print_summary(&summary.processed);
        println!(
            "Processed {} file(s), wrote {} row(s) to {}",
            summary.processed.len(),
            summary.rows_written,
            summary.results_path.display()
        );
    }
}
