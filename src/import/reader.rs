//! Tabular file reading behind a single row-stream interface.
//!
//! Supports delimited text (CSV) and spreadsheet workbooks (XLSX/XLS) and
//! yields rows as ordered cell-value sequences in file order. A reader is a
//! single forward pass: callers that need the file twice (headers first, then
//! data) open it twice.
//!
//! The CSV path streams records straight off the file handle, so peak memory
//! is proportional to the widest row, not the file. The spreadsheet path goes
//! through `calamine`, which materializes the first worksheet range before
//! iteration; CSV is the path that matters for very large inputs.

use calamine::{open_workbook_auto, Data, DataType, Reader};
use std::fs::File;
use std::path::Path;
use thiserror::Error;

/// Supported tabular encodings, declared by the caller alongside the path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Csv,
    Xlsx,
}

impl FileFormat {
    /// Parse a declared file type string (`"csv"`, `"xlsx"`, `"xls"`).
    pub fn parse(declared: &str) -> Result<Self, ReadError> {
        match declared.trim().to_lowercase().as_str() {
            "csv" => Ok(FileFormat::Csv),
            "xlsx" | "xls" => Ok(FileFormat::Xlsx),
            other => Err(ReadError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Errors raised while opening or iterating a tabular file.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("unsupported file format `{0}`")]
    UnsupportedFormat(String),
    #[error("failed to read file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse delimited file: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to open workbook: {0}")]
    Workbook(String),
}

enum RowSource {
    Csv(csv::StringRecordsIntoIter<File>),
    Sheet(std::vec::IntoIter<Vec<String>>),
}

/// One open pass over a tabular file.
///
/// Implements `Iterator` over `Result<Vec<String>, ReadError>`; the underlying
/// file handle is released when the reader is dropped, on every exit path.
pub struct TabularReader {
    source: RowSource,
}

impl TabularReader {
    /// Open `path` for a single forward pass, decoding per `format`.
    pub fn open(path: &Path, format: FileFormat) -> Result<Self, ReadError> {
        match format {
            FileFormat::Csv => {
                let reader = csv::ReaderBuilder::new()
                    .has_headers(false)
                    .flexible(true)
                    .from_path(path)?;
                Ok(Self {
                    source: RowSource::Csv(reader.into_records()),
                })
            }
            FileFormat::Xlsx => {
                let mut workbook =
                    open_workbook_auto(path).map_err(|e| ReadError::Workbook(e.to_string()))?;
                // Only the first sheet is processed, matching the import contract.
                let range = workbook
                    .worksheet_range_at(0)
                    .ok_or_else(|| ReadError::Workbook("workbook has no worksheets".to_string()))?
                    .map_err(|e| ReadError::Workbook(e.to_string()))?;
                let rows: Vec<Vec<String>> = range
                    .rows()
                    .map(|row| row.iter().map(cell_to_string).collect())
                    .collect();
                Ok(Self {
                    source: RowSource::Sheet(rows.into_iter()),
                })
            }
        }
    }
}

impl Iterator for TabularReader {
    type Item = Result<Vec<String>, ReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.source {
            RowSource::Csv(records) => records.next().map(|record| {
                record
                    .map(|r| r.iter().map(|cell| cell.to_string()).collect())
                    .map_err(ReadError::from)
            }),
            RowSource::Sheet(rows) => rows.next().map(Ok),
        }
    }
}

fn cell_to_string(cell: &Data) -> String {
    if cell.is_empty() {
        String::new()
    } else {
        cell.as_string().unwrap_or_else(|| cell.to_string())
    }
}

/// Return the first row of the file as trimmed header names.
pub fn file_headers(path: &Path, format: FileFormat) -> Result<Vec<String>, ReadError> {
    let mut reader = TabularReader::open(path, format)?;
    match reader.next() {
        Some(row) => Ok(row?.iter().map(|c| c.trim().to_string()).collect()),
        None => Ok(Vec::new()),
    }
}

/// Return up to `n` data rows (positional, header row skipped).
pub fn file_sample(path: &Path, format: FileFormat, n: usize) -> Result<Vec<Vec<String>>, ReadError> {
    let reader = TabularReader::open(path, format)?;
    let mut sample = Vec::new();
    for (index, row) in reader.enumerate() {
        if index == 0 {
            continue;
        }
        if sample.len() >= n {
            break;
        }
        sample.push(row?);
    }
    Ok(sample)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn csv_file(contents: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn parse_format_accepts_known_types() {
        assert_eq!(FileFormat::parse("csv").unwrap(), FileFormat::Csv);
        assert_eq!(FileFormat::parse("XLSX").unwrap(), FileFormat::Xlsx);
        assert_eq!(FileFormat::parse(" xls ").unwrap(), FileFormat::Xlsx);
        assert!(matches!(
            FileFormat::parse("pdf"),
            Err(ReadError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn csv_rows_come_back_in_file_order() {
        let file = csv_file("a,b,c\n1,2,3\n4,5,6\n");
        let rows: Vec<Vec<String>> = TabularReader::open(file.path(), FileFormat::Csv)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], vec!["a", "b", "c"]);
        assert_eq!(rows[2], vec!["4", "5", "6"]);
    }

    #[test]
    fn ragged_rows_are_tolerated() {
        let file = csv_file("a,b,c\n1,2\n1,2,3,4\n");
        let rows: Vec<Vec<String>> = TabularReader::open(file.path(), FileFormat::Csv)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(rows[1].len(), 2);
        assert_eq!(rows[2].len(), 4);
    }

    #[test]
    fn headers_and_sample_skip_as_expected() {
        let file = csv_file(" Name , Amount \nalice,10\nbob,20\ncarol,30\n");
        let headers = file_headers(file.path(), FileFormat::Csv).unwrap();
        assert_eq!(headers, vec!["Name", "Amount"]);

        let sample = file_sample(file.path(), FileFormat::Csv, 2).unwrap();
        assert_eq!(sample.len(), 2);
        assert_eq!(sample[0], vec!["alice", "10"]);
    }

    #[test]
    fn missing_file_surfaces_io_error() {
        let result = TabularReader::open(Path::new("/nonexistent/input.csv"), FileFormat::Csv);
        assert!(matches!(result, Err(ReadError::Csv(_)) | Err(ReadError::Io(_))));
    }
}
