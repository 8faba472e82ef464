// src/sink/csv_file.rs
// =============================================================================
// The results file.
//
// Columns (fixed for the whole run):
//   code, url, status, title, duration, duration_seconds, listens,
//   downloads, error
//
// Rows for codes that were not found leave the metadata columns empty; rows
// without an error leave `error` empty.
//
// The file handle is only open for the length of one write: open in append
// mode, write the batch, flush, close. A header is written only when the
// file is new (or empty).
//
// A process killed in the middle of a write can leave a half line at the
// end of the file. Reading skips rows that do not parse (with a warning),
// and the next write starts on a fresh line so it is not glued onto the
// broken one.
// =============================================================================

use super::ResultSink;
use crate::codes::Code;
use crate::error::SinkError;
use crate::probe::ProbeResult;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// One line of the results file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRow {
    pub code: String,
    pub url: String,
    pub status: String,
    pub title: String,
    pub duration: String,
    pub duration_seconds: Option<u64>,
    pub listens: String,
    pub downloads: String,
    pub error: String,
}

impl ResultRow {
    pub fn is_found(&self) -> bool {
        self.status == "200"
    }

    pub fn is_error(&self) -> bool {
        self.status == "ERROR"
    }
}

impl From<&ProbeResult> for ResultRow {
    fn from(result: &ProbeResult) -> Self {
        let meta = result.metadata();
        ResultRow {
            code: result.code.to_string(),
            url: result.url.clone(),
            status: result.status_text(),
            title: meta.map(|m| m.title.clone()).unwrap_or_default(),
            duration: meta.map(|m| m.duration.clone()).unwrap_or_default(),
            duration_seconds: meta.map(|m| m.duration_seconds),
            listens: meta.map(|m| m.listens.clone()).unwrap_or_default(),
            downloads: meta.map(|m| m.downloads.clone()).unwrap_or_default(),
            error: result.error().unwrap_or_default().to_string(),
        }
    }
}

/// Appends rows to a CSV file.
#[derive(Debug, Clone)]
pub struct CsvSink {
    path: PathBuf,
}

impl CsvSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        CsvSink { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Empties the file (creating it if needed). The next write adds a
    /// fresh header.
    pub fn reset(&self) -> Result<(), SinkError> {
        File::create(&self.path).map_err(|e| self.io_error(e))?;
        Ok(())
    }

    /// Codes that already have a row in the file. A missing file means
    /// nothing has been recorded yet.
    pub fn recorded_codes(&self) -> Result<HashSet<Code>, SinkError> {
        if !self.path.exists() {
            return Ok(HashSet::new());
        }

        let mut codes = HashSet::new();
        for row in load_rows(&self.path)? {
            match row.code.parse::<Code>() {
                Ok(code) => {
                    codes.insert(code);
                }
                Err(e) => warn!(code = %row.code, error = %e, "ignoring row with invalid code"),
            }
        }
        Ok(codes)
    }

    // True when the last byte is not a newline, i.e. a write was cut off
    fn ends_mid_line(&self) -> Result<bool, SinkError> {
        let mut file = File::open(&self.path).map_err(|e| self.io_error(e))?;
        if file.metadata().map_err(|e| self.io_error(e))?.len() == 0 {
            return Ok(false);
        }
        let mut last = [0u8; 1];
        file.seek(SeekFrom::End(-1)).map_err(|e| self.io_error(e))?;
        file.read_exact(&mut last).map_err(|e| self.io_error(e))?;
        Ok(last[0] != b'\n')
    }

    fn needs_header(&self) -> bool {
        fs::metadata(&self.path)
            .map(|meta| meta.len() == 0)
            .unwrap_or(true)
    }

    fn io_error(&self, source: std::io::Error) -> SinkError {
        SinkError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn csv_error(&self, source: csv::Error) -> SinkError {
        SinkError::Csv {
            path: self.path.clone(),
            source,
        }
    }
}

impl ResultSink for CsvSink {
    fn write_batch(&mut self, batch: &[ProbeResult]) -> Result<(), SinkError> {
        let header = self.needs_header();
        let broken_tail = !header && self.ends_mid_line()?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_error(e))?;

        if broken_tail {
            warn!(path = %self.path.display(), "results file ends mid-row, starting a new line");
            file.write_all(b"\n").map_err(|e| self.io_error(e))?;
        }

        // With has_headers(true) csv writes the header before the first row.
        // The header comes from ResultRow's field names via serde.
        let mut writer = csv::WriterBuilder::new()
            .has_headers(header)
            .from_writer(file);
        for result in batch {
            writer
                .serialize(ResultRow::from(result))
                .map_err(|e| self.csv_error(e))?;
        }
        // csv buffers internally; nothing is on disk until this flush
        writer.flush().map_err(|e| self.io_error(e))?;
        Ok(())
    }
}

/// Reads every row of a results file.
///
/// Rows that do not parse (wrong field count, bad number, invalid UTF-8) are
/// skipped with a warning. Only I/O failures are errors.
pub fn load_rows(path: &Path) -> Result<Vec<ResultRow>, SinkError> {
    let csv_error = |source| SinkError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::Reader::from_path(path).map_err(csv_error)?;
    let mut rows = Vec::new();
    for row in reader.deserialize::<ResultRow>() {
        match row {
            Ok(row) => rows.push(row),
            Err(e) if e.is_io_error() => return Err(csv_error(e)),
            Err(e) => {
                let line = e.position().map(|pos| pos.line());
                warn!(path = %path.display(), ?line, error = %e, "skipping malformed row");
            }
        }
    }
    Ok(rows)
}

// -----------------------------------------------------------------------------
// BEGINNER NOTES:
//
// 1. Why reopen the file for every batch?
//    - Nothing stays open between batches, so a crash can only damage the
//      batch being written
//    - Batches are hundreds of rows, so one open per batch is cheap
//
// 2. Why is duration_seconds an Option<u64>?
//    - serde writes None as an empty field and reads an empty field back
//      as None, which matches rows for codes that were not found
//
// 3. Why skip bad rows instead of failing?
//    - The file is also our resume record. Refusing to start because of one
//      broken line would force someone to edit it by hand.
//    - A skipped row only means that code gets checked again
// -----------------------------------------------------------------------------
