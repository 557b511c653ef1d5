//! The results file: a fixed 12-column delimited log that only ever grows.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use log::info;

use crate::descriptor::AlgorithmDescriptor;
use crate::error::Result;
use crate::parse::LogRecord;

pub const HEADER: [&str; 12] = [
    "Collective",
    "Filter",
    "TimeOfTest",
    "nGPUs",
    "Protocol",
    "Library",
    "NcclVersion",
    "InPlace",
    "Size",
    "Time",
    "MSCCL_Algo_Name",
    "MSCCL_File",
];

/// Column delimiter of the results file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Separator {
    #[default]
    Tab,
    Comma,
}

impl Separator {
    pub fn as_char(self) -> char {
        match self {
            Separator::Tab => '\t',
            Separator::Comma => ',',
        }
    }
}

/// Values shared by every row of one output file
#[derive(Debug, Clone)]
pub struct RunMetadata<'a> {
    pub library: &'a str,
    pub version: &'a str,
    pub timestamp: &'a str,
    pub source_file: &'a str,
    pub filter: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRow {
    fields: [String; 12],
}

impl ResultRow {
    /// Row for one table line and one placement, or `None` if the line has no time for it.
    pub fn new(
        descriptor: &AlgorithmDescriptor,
        record: &LogRecord,
        in_place: bool,
        meta: &RunMetadata<'_>,
    ) -> Result<Option<Self>> {
        let Some(time) = record.time_text(in_place) else {
            return Ok(None);
        };
        Ok(Some(Self {
            fields: [
                descriptor.coll()?.to_string(),
                meta.filter.to_string(),
                meta.timestamp.to_string(),
                descriptor.ngpus()?.to_string(),
                descriptor.proto()?.to_string(),
                meta.library.to_string(),
                meta.version.to_string(),
                u8::from(in_place).to_string(),
                record.size.to_string(),
                time.to_string(),
                descriptor.name()?.to_string(),
                meta.source_file.to_string(),
            ],
        }))
    }

    pub fn fields(&self) -> &[String; 12] {
        &self.fields
    }

    pub fn format(&self, separator: Separator) -> String {
        format_line(self.fields.iter().map(String::as_str), separator)
    }
}

/// Quote a field if it would otherwise break the line apart
fn escape(field: &str, separator: char) -> String {
    if field.contains(separator) || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn format_line<'a>(fields: impl Iterator<Item = &'a str>, separator: Separator) -> String {
    let sep = separator.as_char();
    fields
        .map(|f| escape(f, sep))
        .collect::<Vec<_>>()
        .join(&sep.to_string())
}

pub fn header_line(separator: Separator) -> String {
    format_line(HEADER.iter().copied(), separator)
}

/// Append-only writer over the results file.
pub struct ResultWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    separator: Separator,
    rows_written: usize,
}

impl ResultWriter {
    /// Open `path` for appending, writing the header first if the file is new.
    pub fn open(path: &Path, separator: Separator) -> Result<Self> {
        let is_new = !path.exists();
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut writer = BufWriter::new(file);
        if is_new {
            info!("Creating result file: {}", path.display());
            writeln!(writer, "{}", header_line(separator))?;
        }
        Ok(Self {
            path: path.to_path_buf(),
            writer,
            separator,
            rows_written: 0,
        })
    }

    pub fn append(&mut self, row: &ResultRow) -> Result<()> {
        writeln!(self.writer, "{}", row.format(self.separator))?;
        self.rows_written += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> AlgorithmDescriptor {
        AlgorithmDescriptor::parse(
            r#"<algo name="Allgather(n=16)-Switch(local=DGX1,copies=2)" proto="Simple" ngpus="16" coll="allgather" inplace="1"/>"#,
        )
        .unwrap()
    }

    fn meta() -> RunMetadata<'static> {
        RunMetadata {
            library: "MSCCL",
            version: "2.12.12.MSCCL.0.7.3+cuda11.6",
            timestamp: "2023-04-01 12:00:00",
            source_file: "ag.xml",
            filter: "*gather*",
        }
    }

    fn record() -> LogRecord {
        LogRecord {
            size: 1024,
            out_of_place_time: 75.18,
            in_place_time: Some(78.3),
            out_of_place_text: "75.18".to_string(),
            in_place_text: Some("78.30".to_string()),
        }
    }

    #[test]
    fn tab_row() {
        let row = ResultRow::new(&descriptor(), &record(), true, &meta()).unwrap().unwrap();
        assert_eq!(
            row.format(Separator::Tab),
            "allgather\t*gather*\t2023-04-01 12:00:00\t16\tSimple\tMSCCL\t2.12.12.MSCCL.0.7.3+cuda11.6\t1\t1024\t78.30\tAllgather(n=16)-Switch(local=DGX1,copies=2)\tag.xml"
        );
        let oop = ResultRow::new(&descriptor(), &record(), false, &meta()).unwrap().unwrap();
        assert_eq!(oop.fields()[7], "0");
        assert_eq!(oop.fields()[9], "75.18");
    }

    #[test]
    fn comma_row_quotes_names() {
        let row = ResultRow::new(&descriptor(), &record(), false, &meta()).unwrap().unwrap();
        assert!(row
            .format(Separator::Comma)
            .ends_with(",\"Allgather(n=16)-Switch(local=DGX1,copies=2)\",ag.xml"));
    }

    #[test]
    fn times_are_copied_as_printed() {
        let record = LogRecord {
            size: 33554432,
            out_of_place_time: 13589.0,
            in_place_time: None,
            out_of_place_text: "13589".to_string(),
            in_place_text: None,
        };
        let row = ResultRow::new(&descriptor(), &record, false, &meta()).unwrap().unwrap();
        assert_eq!(row.fields()[9], "13589");
        assert!(ResultRow::new(&descriptor(), &record, true, &meta()).unwrap().is_none());
    }

    #[test]
    fn header_once_then_append() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.txt");
        let row = ResultRow::new(&descriptor(), &record(), false, &meta()).unwrap().unwrap();

        for _ in 0..2 {
            let mut writer = ResultWriter::open(&path, Separator::Tab).unwrap();
            writer.append(&row).unwrap();
            writer.flush().unwrap();
            assert_eq!(writer.rows_written(), 1);
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], header_line(Separator::Tab));
        assert!(lines[0].starts_with("Collective\tFilter\tTimeOfTest"));
        assert_eq!(lines[1], lines[2]);
    }
}
