//! Runs nccl-tests twice per MSCCL algorithm file (plain NCCL, then MSCCL with
//! the file injected through `MSCCL_XML_FILES`) and appends the parsed timings
//! to a delimited results file.

pub mod config;
pub mod descriptor;
pub mod error;
pub mod harness;
pub mod parse;
pub mod results;
pub mod segment;
pub mod speedup;
pub mod util;
pub mod wrapper;

pub use descriptor::{AlgorithmDescriptor, Collective};
pub use error::{BenchError, Result};
pub use parse::{LogExtractor, LogRecord, TableLayout};
pub use segment::{segment, SegmentedCommandLine};
