//! Core data types for the pitdb storage layer
//!
//! - `Cell`: a single stored value, with a dedicated "not available" sentinel
//! - `Layout`: panel or time-series shape of a dataset
//! - `Frame`: a sorted, duplicate-free, date-indexed table
//! - `FrameGroup`: same-shaped frames queried together
//! - `ElementType`: element type hint for numeric backends

use crate::storage::chunked::period::{period_key, SplitFrequency};
use crate::storage::error::{StorageError, StorageResult};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

/// A single stored value
///
/// `NotAvailable` marks a cell that was never computed (for example a symbol
/// that did not exist yet when an older shard was written). It is distinct
/// from an empty text value. On disk it is written as JSON `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Number(f64),
    Text(String),
    NotAvailable,
}

impl Cell {
    pub fn text(value: impl Into<String>) -> Self {
        Cell::Text(value.into())
    }

    pub fn is_available(&self) -> bool {
        !matches!(self, Cell::NotAvailable)
    }

    /// NaN and infinities would be written as `null` and read back as
    /// `NotAvailable`, so frames refuse them
    fn check_finite(&self, date: NaiveDate) -> StorageResult<()> {
        match self {
            Cell::Number(n) if !n.is_finite() => Err(StorageError::InvalidParameter(format!(
                "non-finite number {} at {}",
                n, date
            ))),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Number(n) => write!(f, "{}", n),
            Cell::Text(s) => f.write_str(s),
            Cell::NotAvailable => f.write_str("NaS"),
        }
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::Text(value)
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Number(value)
    }
}

/// Shape of a dataset
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Layout {
    /// Rows are dates, columns are symbols
    Panel,
    /// Rows are dates, a single value column
    TimeSeries,
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Layout::Panel => write!(f, "PANEL"),
            Layout::TimeSeries => write!(f, "TIME_SERIES"),
        }
    }
}

/// Element type hint, only meaningful for numeric data
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    Float64,
    Float32,
    Int64,
    Int32,
}

impl FromStr for ElementType {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "float64" | "f64" => Ok(ElementType::Float64),
            "float32" | "f32" => Ok(ElementType::Float32),
            "int64" | "i64" => Ok(ElementType::Int64),
            "int32" | "i32" => Ok(ElementType::Int32),
            other => Err(StorageError::InvalidParameter(format!(
                "unknown element type: {}",
                other
            ))),
        }
    }
}

/// A date-indexed table
///
/// The index is kept sorted ascending with no duplicates. Panel frames carry
/// an explicit symbol order; every row has one cell per symbol. Time-series
/// frames have no symbols and exactly one cell per row.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    layout: Layout,
    index: Vec<NaiveDate>,
    symbols: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Frame {
    /// Create an empty frame
    pub fn empty(layout: Layout) -> Self {
        Self {
            layout,
            index: Vec::new(),
            symbols: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// Create a panel frame; rows are sorted by date
    pub fn panel<I>(symbols: Vec<String>, rows: I) -> StorageResult<Self>
    where
        I: IntoIterator<Item = (NaiveDate, Vec<Cell>)>,
    {
        let mut seen = HashSet::with_capacity(symbols.len());
        for symbol in &symbols {
            if !seen.insert(symbol.as_str()) {
                return Err(StorageError::InvalidParameter(format!(
                    "duplicated symbol: {}",
                    symbol
                )));
            }
        }

        let mut rows: Vec<(NaiveDate, Vec<Cell>)> = rows.into_iter().collect();
        if let Some((date, row)) = rows.iter().find(|(_, row)| row.len() != symbols.len()) {
            return Err(StorageError::InvalidParameter(format!(
                "row {} has {} cells, expected {}",
                date,
                row.len(),
                symbols.len()
            )));
        }

        for (date, row) in &rows {
            row.iter().try_for_each(|cell| cell.check_finite(*date))?;
        }

        rows.sort_by_key(|(date, _)| *date);
        let (index, rows): (Vec<_>, Vec<_>) = rows.into_iter().unzip();
        Self::from_sorted_parts(Layout::Panel, index, symbols, rows)
    }

    /// Create a time-series frame; rows are sorted by date
    pub fn time_series<I>(rows: I) -> StorageResult<Self>
    where
        I: IntoIterator<Item = (NaiveDate, Cell)>,
    {
        let mut rows: Vec<(NaiveDate, Cell)> = rows.into_iter().collect();
        for (date, cell) in &rows {
            cell.check_finite(*date)?;
        }
        rows.sort_by_key(|(date, _)| *date);
        let (index, rows): (Vec<_>, Vec<_>) =
            rows.into_iter().map(|(d, c)| (d, vec![c])).unzip();
        Self::from_sorted_parts(Layout::TimeSeries, index, Vec::new(), rows)
    }

    /// Assemble a frame from an already sorted index
    pub(crate) fn from_sorted_parts(
        layout: Layout,
        index: Vec<NaiveDate>,
        symbols: Vec<String>,
        rows: Vec<Vec<Cell>>,
    ) -> StorageResult<Self> {
        if let Some(pair) = index.windows(2).find(|pair| pair[0] >= pair[1]) {
            return Err(StorageError::DuplicateIndex(format!(
                "{} is not strictly before {}",
                pair[0], pair[1]
            )));
        }
        Ok(Self {
            layout,
            index,
            symbols,
            rows,
        })
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn index(&self) -> &[NaiveDate] {
        &self.index
    }

    /// Explicit column order; `None` for time-series data
    pub fn symbols(&self) -> Option<&[String]> {
        match self.layout {
            Layout::Panel => Some(&self.symbols),
            Layout::TimeSeries => None,
        }
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    /// Number of value columns
    pub fn width(&self) -> usize {
        match self.layout {
            Layout::Panel => self.symbols.len(),
            Layout::TimeSeries => 1,
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn start_time(&self) -> Option<NaiveDate> {
        self.index.first().copied()
    }

    pub fn end_time(&self) -> Option<NaiveDate> {
        self.index.last().copied()
    }

    /// Iterate `(date, row)` pairs in ascending date order
    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, &[Cell])> {
        self.index
            .iter()
            .copied()
            .zip(self.rows.iter().map(|r| r.as_slice()))
    }

    /// Cell of a panel frame at `(date, symbol)`
    pub fn get(&self, date: NaiveDate, symbol: &str) -> Option<&Cell> {
        let col = self.symbols.iter().position(|s| s == symbol)?;
        let row = self.index.binary_search(&date).ok()?;
        self.rows[row].get(col)
    }

    /// Value of a time-series frame at `date`
    pub fn value(&self, date: NaiveDate) -> Option<&Cell> {
        if self.layout != Layout::TimeSeries {
            return None;
        }
        let row = self.index.binary_search(&date).ok()?;
        self.rows[row].first()
    }

    /// Keep only rows strictly after `date`
    pub fn drop_through(&self, date: NaiveDate) -> Frame {
        let cut = self.index.partition_point(|d| *d <= date);
        Frame {
            layout: self.layout,
            index: self.index[cut..].to_vec(),
            symbols: self.symbols.clone(),
            rows: self.rows[cut..].to_vec(),
        }
    }

    /// Keep only rows within `[start, end]`
    pub fn slice(&self, start: NaiveDate, end: NaiveDate) -> Frame {
        let lo = self.index.partition_point(|d| *d < start);
        let hi = self.index.partition_point(|d| *d <= end).max(lo);
        Frame {
            layout: self.layout,
            index: self.index[lo..hi].to_vec(),
            symbols: self.symbols.clone(),
            rows: self.rows[lo..hi].to_vec(),
        }
    }

    /// Reorder panel columns
    ///
    /// Symbols in `order` come first, in that order; symbols only present in
    /// this frame follow in ascending order. Symbols of `order` that this frame
    /// lacks become `NotAvailable` columns.
    pub fn rearrange_symbols(&self, order: &[String]) -> StorageResult<Frame> {
        if self.layout != Layout::Panel {
            return Err(StorageError::InvalidParameter(
                "only panel data has a symbol order".to_string(),
            ));
        }
        if self.symbols == order {
            return Ok(self.clone());
        }

        let mut extra: Vec<&String> = self
            .symbols
            .iter()
            .filter(|s| !order.contains(s))
            .collect();
        extra.sort();

        let new_order: Vec<String> = order.iter().chain(extra).cloned().collect();
        let positions: HashMap<&str, usize> = self
            .symbols
            .iter()
            .enumerate()
            .map(|(i, s)| (s.as_str(), i))
            .collect();
        let mapping: Vec<Option<usize>> = new_order
            .iter()
            .map(|s| positions.get(s.as_str()).copied())
            .collect();

        let rows = self
            .rows
            .iter()
            .map(|row| {
                mapping
                    .iter()
                    .map(|pos| pos.map(|p| row[p].clone()).unwrap_or(Cell::NotAvailable))
                    .collect()
            })
            .collect();

        Ok(Frame {
            layout: self.layout,
            index: self.index.clone(),
            symbols: new_order,
            rows,
        })
    }

    /// Partition rows by storage period
    ///
    /// Returns one sub-frame per period key; sub-frames keep this frame's
    /// symbol order.
    pub fn split(&self, frequency: SplitFrequency) -> BTreeMap<String, Frame> {
        let mut out: BTreeMap<String, Frame> = BTreeMap::new();
        for (date, row) in self.index.iter().zip(&self.rows) {
            let part = out
                .entry(period_key(*date, frequency))
                .or_insert_with(|| Frame {
                    layout: self.layout,
                    index: Vec::new(),
                    symbols: self.symbols.clone(),
                    rows: Vec::new(),
                });
            part.index.push(*date);
            part.rows.push(row.clone());
        }
        out
    }

    pub(crate) fn into_parts(self) -> (Layout, Vec<NaiveDate>, Vec<String>, Vec<Vec<Cell>>) {
        (self.layout, self.index, self.symbols, self.rows)
    }
}

/// Several datasets of identical shape, read over the same range
///
/// Members share layout, date index and symbol order, so a row of one member
/// lines up with the same row of every other.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameGroup {
    names: Vec<String>,
    frames: Vec<Frame>,
}

impl FrameGroup {
    pub fn new(members: Vec<(String, Frame)>) -> StorageResult<Self> {
        let Some((first_name, first)) = members.first() else {
            return Err(StorageError::InvalidParameter(
                "a group needs at least one dataset".to_string(),
            ));
        };

        let mut seen = HashSet::with_capacity(members.len());
        for (name, frame) in &members {
            if !seen.insert(name.as_str()) {
                return Err(StorageError::InvalidParameter(format!(
                    "{} appears twice in the group",
                    name
                )));
            }
            if frame.layout != first.layout
                || frame.index != first.index
                || frame.symbols != first.symbols
            {
                return Err(StorageError::InvalidParameter(format!(
                    "{} ({} x {}) does not have the shape of {} ({} x {})",
                    name,
                    frame.len(),
                    frame.width(),
                    first_name,
                    first.len(),
                    first.width()
                )));
            }
        }

        let (names, frames) = members.into_iter().unzip();
        Ok(Self { names, frames })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn layout(&self) -> Layout {
        self.frames[0].layout
    }

    pub fn index(&self) -> &[NaiveDate] {
        &self.frames[0].index
    }

    pub fn symbols(&self) -> Option<&[String]> {
        self.frames[0].symbols()
    }

    pub fn get(&self, name: &str) -> Option<&Frame> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| &self.frames[i])
    }

    /// Members in request order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Frame)> {
        self.names.iter().map(String::as_str).zip(&self.frames)
    }

    /// Number of member datasets
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// One row per member at `date`
    pub fn cross_section(&self, date: NaiveDate) -> Option<Vec<(&str, &[Cell])>> {
        let pos = self.index().binary_search(&date).ok()?;
        Some(
            self.iter()
                .map(|(name, frame)| (name, frame.rows[pos].as_slice()))
                .collect(),
        )
    }
}

#[cfg(test)]
pub(crate) mod test_util {
    use super::*;

    pub fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    /// Panel frame with one text cell per symbol, value `"{symbol}@{date}"`
    pub fn panel(symbols: &[&str], dates: &[&str]) -> Frame {
        let symbols: Vec<String> = symbols.iter().map(|s| s.to_string()).collect();
        let rows = dates.iter().map(|d| {
            let row = symbols
                .iter()
                .map(|s| Cell::text(format!("{}@{}", s, d)))
                .collect();
            (date(d), row)
        });
        Frame::panel(symbols.clone(), rows).unwrap()
    }

    pub fn series(dates: &[&str]) -> Frame {
        Frame::time_series(dates.iter().map(|d| (date(d), Cell::text(format!("v@{}", d)))))
            .unwrap()
    }
}
