//! Speedup of a main library over a baseline, from previously collected nccl-tests logs.
//!
//! Logs are laid out as `<data>/<config>/<collective>-<place>/<name>.txt`, e.g.
//! `data/ndv2-1node/allreduce-inplace/msccl.txt`. For each (config, collective)
//! that has both a main and a baseline log the per-size speedup is
//! `baseline_time / main_time`.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use polars::prelude::*;
use prettytable::{row, Table};

use crate::error::{BenchError, Result};
use crate::parse::{LogExtractor, LogRecord, TableLayout};

pub const MAIN_NAME: &str = "msccl";
pub const BASELINE_NAME: &str = "nccl";

/// How the time columns of the logs are located
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LayoutChoice {
    /// Read it from each log's `#  size  count ...` header
    #[default]
    Auto,
    /// With the `root` column
    NcclTests,
    /// Without the `root` column, as in older leaderboard logs
    Legacy,
}

impl LayoutChoice {
    pub fn layout(self) -> Option<TableLayout> {
        match self {
            LayoutChoice::Auto => None,
            LayoutChoice::NcclTests => Some(TableLayout::nccl_tests()),
            LayoutChoice::Legacy => Some(TableLayout::legacy()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct LogKey {
    pub config: String,
    pub collective: String,
    pub name: String,
}

/// Find every `.txt` log under `data_dir`, keyed by its path components.
pub fn find_data_logs(data_dir: &Path) -> Result<BTreeMap<LogKey, PathBuf>> {
    let mut logs = BTreeMap::new();
    for config in std::fs::read_dir(data_dir)? {
        let config = config?;
        if !config.file_type()?.is_dir() {
            continue;
        }
        for collective in std::fs::read_dir(config.path())? {
            let collective = collective?;
            if !collective.file_type()?.is_dir() {
                continue;
            }
            for log in std::fs::read_dir(collective.path())? {
                let path = log?.path();
                if path.extension().map_or(true, |ext| ext != "txt") {
                    continue;
                }
                let Some(name) = path.file_stem() else { continue };
                let key = LogKey {
                    config: config.file_name().to_string_lossy().into_owned(),
                    collective: collective.file_name().to_string_lossy().into_owned(),
                    name: name.to_string_lossy().into_owned(),
                };
                debug!("Found log {:?} at {}", key, path.display());
                logs.insert(key, path);
            }
        }
    }
    Ok(logs)
}

/// `allreduce-inplace` → true, `allreduce-outofplace` → false
pub fn is_inplace(collective: &str) -> Result<bool> {
    match collective.split_once('-') {
        Some((_, "inplace")) => Ok(true),
        Some((_, "outofplace")) => Ok(false),
        Some((_, place)) => Err(BenchError::Descriptor(format!("Unknown place {}", place))),
        None => Err(BenchError::Descriptor(format!(
            "collective directory `{}` has no -inplace/-outofplace suffix",
            collective
        ))),
    }
}

/// (size, time) pairs of every log, with the time column picked by the collective's placement.
///
/// With `layout` unset, each log's own table header decides where the time columns are.
pub fn load_data(
    logs: &BTreeMap<LogKey, PathBuf>,
    layout: Option<TableLayout>,
) -> Result<BTreeMap<LogKey, Vec<(u64, f64)>>> {
    let mut data = BTreeMap::new();
    for (key, path) in logs {
        let in_place = is_inplace(&key.collective)?;
        let contents = std::fs::read_to_string(path)?;
        let extractor = match layout {
            Some(layout) => LogExtractor::new(layout)?,
            None => LogExtractor::for_text(&contents)?,
        };
        let points = extractor
            .records(&contents)
            .filter_map(|r: LogRecord| r.time(in_place).map(|t| (r.size, t)))
            .collect();
        data.insert(key.clone(), points);
    }
    Ok(data)
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpeedupSeries {
    pub config: String,
    pub collective: String,
    pub sizes: Vec<u64>,
    pub baseline_times: Vec<f64>,
    pub main_times: Vec<f64>,
    pub speedups: Vec<f64>,
}

impl SpeedupSeries {
    /// Largest speedup and the size it was measured at
    pub fn peak(&self) -> Option<(u64, f64)> {
        self.sizes
            .iter()
            .copied()
            .zip(self.speedups.iter().copied())
            .fold(None, |best, (size, s)| match best {
                Some((_, b)) if b >= s => best,
                _ => Some((size, s)),
            })
    }
}

/// Index of the first size that differs between the two series, if any
fn first_mismatch(a: &[(u64, f64)], b: &[(u64, f64)]) -> Option<usize> {
    let common = a.iter().zip(b).take_while(|(x, y)| x.0 == y.0).count();
    if common == a.len() && common == b.len() {
        None
    } else {
        Some(common)
    }
}

pub fn compute_speedups(
    data: &BTreeMap<LogKey, Vec<(u64, f64)>>,
    main_name: &str,
    baseline_name: &str,
) -> Vec<SpeedupSeries> {
    let pairs: BTreeSet<(&str, &str)> = data
        .keys()
        .map(|k| (k.config.as_str(), k.collective.as_str()))
        .collect();

    let mut out = Vec::new();
    for (config, collective) in pairs {
        let key = |name: &str| LogKey {
            config: config.to_string(),
            collective: collective.to_string(),
            name: name.to_string(),
        };
        let (Some(main), Some(baseline)) = (data.get(&key(main_name)), data.get(&key(baseline_name))) else {
            continue;
        };
        if let Some(i) = first_mismatch(main, baseline) {
            warn!(
                "{} and {} results for {}/{} have different sizes at index {}",
                baseline_name, main_name, config, collective, i
            );
            continue;
        }
        if let Some((size, _)) = main.iter().find(|p| p.1 <= 0.0 || p.1.is_nan()) {
            warn!(
                "{} result for {}/{} has no positive time at size {}, skipping",
                main_name, config, collective, size
            );
            continue;
        }

        out.push(SpeedupSeries {
            config: config.to_string(),
            collective: collective.to_string(),
            sizes: main.iter().map(|p| p.0).collect(),
            baseline_times: baseline.iter().map(|p| p.1).collect(),
            main_times: main.iter().map(|p| p.1).collect(),
            speedups: baseline.iter().zip(main).map(|(b, m)| b.1 / m.1).collect(),
        });
    }
    out
}

/// Convert the series to a Polars DataFrame, one row per size
///
/// Note: Builds every column by hand, like the results rows.
pub fn speedups_to_df(series: &[SpeedupSeries]) -> Result<DataFrame> {
    let mut configs = Vec::new();
    let mut collectives = Vec::new();
    let mut sizes = Vec::new();
    let mut baseline_times = Vec::new();
    let mut main_times = Vec::new();
    let mut speedups = Vec::new();
    for s in series {
        for i in 0..s.sizes.len() {
            configs.push(s.config.clone());
            collectives.push(s.collective.clone());
            sizes.push(s.sizes[i]);
            baseline_times.push(s.baseline_times[i]);
            main_times.push(s.main_times[i]);
            speedups.push(s.speedups[i]);
        }
    }

    let df = DataFrame::new(vec![
        Series::new("config", configs),
        Series::new("collective", collectives),
        Series::new("size", sizes),
        Series::new("baseline_time", baseline_times),
        Series::new("main_time", main_times),
        Series::new("speedup", speedups),
    ])?;
    Ok(df)
}

pub fn write_csv(df: &mut DataFrame, path: &Path) -> Result<()> {
    let file = File::create(path)?;
    CsvWriter::new(file).finish(df)?;
    Ok(())
}

/// Human readable buffer size (1024 → `1KB`)
pub fn format_size(size: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = size as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if value.fract() == 0.0 {
        format!("{}{}", value as u64, UNITS[unit])
    } else {
        format!("{:.1}{}", value, UNITS[unit])
    }
}

/// `allreduce-inplace` → `allreduce (in-place)`
pub fn format_collective(collective: &str) -> String {
    match collective.split_once('-') {
        Some((name, "inplace")) => format!("{} (in-place)", name),
        Some((name, "outofplace")) => format!("{} (out-of-place)", name),
        _ => collective.to_string(),
    }
}

fn format_peak(series: &SpeedupSeries) -> String {
    series
        .peak()
        .map(|(size, s)| format!("{:.2}x @ {}", s, format_size(size)))
        .unwrap_or_default()
}

/// GitHub-flavored table: one row per configuration, one column per collective
pub fn markdown_table(series: &[SpeedupSeries]) -> String {
    let configs: BTreeSet<&str> = series.iter().map(|s| s.config.as_str()).collect();
    let collectives: BTreeSet<&str> = series.iter().map(|s| s.collective.as_str()).collect();

    let mut out = String::from("| Configuration |");
    for c in &collectives {
        out.push_str(&format!(" {} |", format_collective(c)));
    }
    out.push_str("\n|---|");
    out.push_str(&"---|".repeat(collectives.len()));
    out.push('\n');

    for config in configs {
        out.push_str(&format!("| {} |", config));
        for collective in &collectives {
            let cell = series
                .iter()
                .find(|s| s.config == config && s.collective == *collective)
                .map(format_peak)
                .unwrap_or_default();
            out.push_str(&format!(" {} |", cell));
        }
        out.push('\n');
    }
    out
}

pub fn print_table(series: &[SpeedupSeries]) {
    let mut table = Table::new();
    table.add_row(row!["Configuration", "Collective", "Sizes", "Peak speedup", "Min speedup"]);
    for s in series {
        let min = s.speedups.iter().copied().fold(f64::INFINITY, f64::min);
        table.add_row(row![
            s.config,
            format_collective(&s.collective),
            s.sizes.len(),
            format_peak(s),
            if s.speedups.is_empty() { String::new() } else { format!("{:.2}x", min) },
        ]);
    }
    table.printstd();
}
