//! CSV import and export of frames
//!
//! The first column holds dates, every further column is a symbol (panel) or
//! the single value column (time series). Empty fields are not available.

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::{Cell, Frame, FrameGroup, Layout};
use chrono::NaiveDate;
use std::io::{Read, Write};

/// Reads frames from CSV with a header row
#[derive(Debug, Clone)]
pub struct CsvReader {
    date_format: String,
    delimiter: u8,
}

impl Default for CsvReader {
    fn default() -> Self {
        Self::new()
    }
}

impl CsvReader {
    pub fn new() -> Self {
        Self {
            date_format: "%Y-%m-%d".to_string(),
            delimiter: b',',
        }
    }

    /// Set the date format string
    pub fn with_date_format(mut self, format: &str) -> Self {
        self.date_format = format.to_string();
        self
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn read<R: Read>(&self, input: R, layout: Layout) -> StorageResult<Frame> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(true)
            .from_reader(input);

        let headers = reader.headers().map_err(csv_error)?.clone();
        let columns: Vec<String> = headers.iter().skip(1).map(|h| h.trim().to_string()).collect();
        if columns.is_empty() {
            return Err(StorageError::InvalidParameter(
                "CSV needs a date column and at least one value column".to_string(),
            ));
        }
        if layout == Layout::TimeSeries && columns.len() != 1 {
            return Err(StorageError::InvalidParameter(format!(
                "time series CSV must have exactly one value column, found {}",
                columns.len()
            )));
        }

        let mut rows = Vec::new();
        for (line, record) in reader.records().enumerate() {
            let record = record.map_err(csv_error)?;
            let raw_date = record.get(0).unwrap_or_default().trim();
            let date = NaiveDate::parse_from_str(raw_date, &self.date_format).map_err(|e| {
                StorageError::InvalidParameter(format!(
                    "row {}: invalid date {:?}: {}",
                    line + 1,
                    raw_date,
                    e
                ))
            })?;

            let cells: Vec<Cell> = (1..=columns.len())
                .map(|i| match record.get(i).map(str::trim) {
                    None | Some("") => Cell::NotAvailable,
                    Some(value) => Cell::text(value),
                })
                .collect();
            rows.push((date, cells));
        }
        tracing::debug!("Read {} CSV rows with {} columns", rows.len(), columns.len());

        match layout {
            Layout::Panel => Frame::panel(columns, rows),
            Layout::TimeSeries => Frame::time_series(
                rows.into_iter()
                    .map(|(date, mut cells)| (date, cells.pop().unwrap_or(Cell::NotAvailable))),
            ),
        }
    }
}

/// Write `frame` as CSV with a header row
pub fn write_csv<W: Write>(frame: &Frame, output: W) -> StorageResult<()> {
    let mut writer = csv::Writer::from_writer(output);
    writer
        .write_record(header(&[], frame.symbols()))
        .map_err(csv_error)?;
    write_rows(&mut writer, None, frame)?;
    writer.flush()?;
    Ok(())
}

/// Write every member of `group` below one header, keyed by a leading `name` column
pub fn write_group_csv<W: Write>(group: &FrameGroup, output: W) -> StorageResult<()> {
    let mut writer = csv::Writer::from_writer(output);
    writer
        .write_record(header(&["name"], group.symbols()))
        .map_err(csv_error)?;
    for (name, frame) in group.iter() {
        write_rows(&mut writer, Some(name), frame)?;
    }
    writer.flush()?;
    Ok(())
}

fn header(leading: &[&str], symbols: Option<&[String]>) -> Vec<String> {
    let mut header: Vec<String> = leading.iter().map(|s| s.to_string()).collect();
    header.push("date".to_string());
    match symbols {
        Some(symbols) => header.extend(symbols.iter().cloned()),
        None => header.push("value".to_string()),
    }
    header
}

fn write_rows<W: Write>(
    writer: &mut csv::Writer<W>,
    name: Option<&str>,
    frame: &Frame,
) -> StorageResult<()> {
    for (date, row) in frame.iter() {
        let mut record = Vec::with_capacity(row.len() + 2);
        record.extend(name.map(str::to_string));
        record.push(date.format("%Y-%m-%d").to_string());
        record.extend(row.iter().map(|cell| match cell {
            Cell::NotAvailable => String::new(),
            other => other.to_string(),
        }));
        writer.write_record(&record).map_err(csv_error)?;
    }
    Ok(())
}

fn csv_error(e: csv::Error) -> StorageError {
    StorageError::Serialization(format!("CSV: {}", e))
}
