use std::path::Path;

use log::debug;
use regex::Regex;

use crate::error::{BenchError, Result};

/// Tag mpirun's `--tag-output` puts in front of rank 0's stdout lines
const RANK0_PREFIX: &str = r"\[1,0\]<stdout>:";

/// Marker preceding the library version, e.g. `NCCL version 2.12.12.MSCCL.0.7.3+cuda11.6`
pub const VERSION_MARKER: &str = "NCCL version ";

/// Printed by MSCCL when it loaded the algorithm from `MSCCL_XML_FILES`
pub const CONFIRMATION_MARKER: &str = "Parsed MSCCL";

const FAILURE_MARKERS: [&str; 2] = ["NCCL WARN", "NCCL ERROR"];

/// Shape of the nccl-tests results table.
///
/// ```text
/// #       size         count      type   redop    root     time   algbw   busbw #wrong     time   algbw   busbw #wrong
///         1024           256     float     sum      -1    75.18    0.01    0.03      0    78.30    0.01    0.02      0
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableLayout {
    /// Columns between `count` and the out-of-place `time`
    pub columns_before_time: usize,
    /// Also capture the in-place `time` (three columns after the first)
    pub in_place: bool,
}

impl TableLayout {
    /// Current nccl-tests output (`type redop root` before the time)
    pub const fn nccl_tests() -> Self {
        Self { columns_before_time: 3, in_place: true }
    }

    /// Older nccl-tests output without the `root` column
    pub const fn legacy() -> Self {
        Self { columns_before_time: 2, in_place: true }
    }

    pub const fn out_of_place_only(self) -> Self {
        Self { in_place: false, ..self }
    }

    /// Layout announced by the `#  size  count ...` header of `text`, if it has one.
    ///
    /// Both layouts match each other's data lines, so the header is the only
    /// reliable way to tell them apart.
    pub fn detect(text: &str) -> Option<Self> {
        text.lines().find_map(|line| {
            if !line.contains('#') {
                return None;
            }
            let columns: Vec<&str> = line.split_whitespace().collect();
            if !columns.contains(&"size") || !columns.contains(&"count") {
                return None;
            }
            if columns.contains(&"root") {
                Some(Self::nccl_tests())
            } else {
                Some(Self::legacy())
            }
        })
    }
}

impl Default for TableLayout {
    fn default() -> Self {
        Self::nccl_tests()
    }
}

/// One data row of the results table
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub size: u64,
    pub out_of_place_time: f64,
    pub in_place_time: Option<f64>,
    /// Time columns exactly as printed, e.g. `78.30`
    pub out_of_place_text: String,
    pub in_place_text: Option<String>,
}

impl LogRecord {
    /// Time for the given placement (`true` = in-place)
    pub fn time(&self, in_place: bool) -> Option<f64> {
        if in_place {
            self.in_place_time
        } else {
            Some(self.out_of_place_time)
        }
    }

    /// Like [`LogRecord::time`], but the column text as it appeared in the log
    pub fn time_text(&self, in_place: bool) -> Option<&str> {
        if in_place {
            self.in_place_text.as_deref()
        } else {
            Some(&self.out_of_place_text)
        }
    }
}

/// Pulls `(size, time, time)` out of nccl-tests stdout.
#[derive(Debug, Clone)]
pub struct LogExtractor {
    pattern: Regex,
    in_place: bool,
}

impl LogExtractor {
    pub fn new(layout: TableLayout) -> Result<Self> {
        let time = r"(\d+(?:\.\d*)?)";
        let mut pattern = format!(
            r"^(?:{})?\s*(\d+)\s+\d+(?:\s+\S+){{{}}}\s+{}",
            RANK0_PREFIX, layout.columns_before_time, time
        );
        if layout.in_place {
            // algbw, busbw, #wrong
            pattern.push_str(&format!(r"(?:\s+\S+){{3}}\s+{}", time));
        }
        pattern.push_str(r"(?:\s|$)");
        Ok(Self {
            pattern: Regex::new(&pattern)?,
            in_place: layout.in_place,
        })
    }

    /// Extractor for the layout `text` declares, falling back to the current one.
    pub fn for_text(text: &str) -> Result<Self> {
        let layout = TableLayout::detect(text).unwrap_or_else(|| {
            debug!("No table header found, assuming the current nccl-tests layout");
            TableLayout::default()
        });
        Self::new(layout)
    }

    /// Parse a line from the nccl-tests output
    ///
    /// Note: Only returns something if the line is a table data row
    pub fn parse_line(&self, line: &str) -> Option<LogRecord> {
        let caps = self.pattern.captures(line)?;
        let size = caps.get(1)?.as_str().parse::<u64>().ok()?;
        let out_of_place_text = caps.get(2)?.as_str();
        let out_of_place_time = out_of_place_text.parse::<f64>().ok()?;
        let (in_place_time, in_place_text) = if self.in_place {
            let text = caps.get(3)?.as_str();
            (Some(text.parse::<f64>().ok()?), Some(text.to_string()))
        } else {
            (None, None)
        };
        Some(LogRecord {
            size,
            out_of_place_time,
            in_place_time,
            out_of_place_text: out_of_place_text.to_string(),
            in_place_text,
        })
    }

    /// Data rows of `text`, in line order. Everything else is skipped.
    pub fn records<'a>(&'a self, text: &'a str) -> impl Iterator<Item = LogRecord> + 'a {
        text.lines().filter_map(move |line| {
            let record = self.parse_line(line);
            if record.is_some() {
                debug!("[r]: {}", line);
            }
            record
        })
    }
}

/// Library version from the first `NCCL version` line, if any
pub fn extract_version(text: &str) -> Option<String> {
    text.lines().find_map(|line| {
        line.split_once(VERSION_MARKER)
            .map(|(_, version)| version.trim().to_string())
            .filter(|version| !version.is_empty())
    })
}

/// Like [`extract_version`], but a missing marker is an error for `path`.
pub fn require_version(text: &str, path: &Path) -> Result<String> {
    extract_version(text).ok_or_else(|| BenchError::MissingVersion(path.to_path_buf()))
}

/// Whether NCCL reported a warning or an error.
///
/// Bare `WARN`/`ERROR` are not enough since other components print harmless ones.
pub fn has_failure_marker(text: &str) -> bool {
    let upper = text.to_uppercase();
    FAILURE_MARKERS.iter().any(|marker| upper.contains(marker))
}

pub fn has_confirmation_marker(text: &str) -> bool {
    text.contains(CONFIRMATION_MARKER)
}
