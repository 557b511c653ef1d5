//! Speedup graphs' data for the MSCCL leaderboard: compares main vs. baseline logs under `data/`.

use std::path::PathBuf;

use clap::Parser;
use log::{error, info};

use msccl_bench::speedup::{
    compute_speedups, find_data_logs, load_data, markdown_table, print_table, speedups_to_df,
    write_csv, LayoutChoice, BASELINE_NAME, MAIN_NAME,
};

#[derive(Debug, Parser)]
#[command(about = "Compute speedups of a main library over a baseline from nccl-tests logs")]
struct Args {
    /// Root of the `<config>/<collective>-<place>/<name>.txt` log tree
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// Where `speedups.csv` and `speedups_table.md` are written
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// Log name of the library being evaluated
    #[arg(long, default_value = MAIN_NAME)]
    main_name: String,

    /// Log name of the library compared against
    #[arg(long, default_value = BASELINE_NAME)]
    baseline_name: String,

    /// Table layout of the logs
    #[arg(long, value_enum, default_value = "auto")]
    layout: LayoutChoice,

    /// Suffix output files with the current unix time
    #[arg(long)]
    prod: bool,
}

fn run(args: &Args) -> msccl_bench::Result<()> {
    let logs = find_data_logs(&args.data_dir)?;
    info!("Found {} logs under {}", logs.len(), args.data_dir.display());
    let data = load_data(&logs, args.layout.layout())?;
    let series = compute_speedups(&data, &args.main_name, &args.baseline_name);

    let suffix = if args.prod {
        format!("_{}", chrono::Utc::now().timestamp())
    } else {
        String::new()
    };
    std::fs::create_dir_all(&args.output_dir)?;

    let csv_path = args.output_dir.join(format!("speedups{}.csv", suffix));
    let mut df = speedups_to_df(&series)?;
    info!("Writing {}", csv_path.display());
    write_csv(&mut df, &csv_path)?;

    let table_path = args.output_dir.join(format!("speedups_table{}.md", suffix));
    info!("Writing {}", table_path.display());
    std::fs::write(&table_path, markdown_table(&series))?;

    print_table(&series);
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if let Err(e) = run(&args) {
        error!("{}", e);
        std::process::exit(1);
    }
}
