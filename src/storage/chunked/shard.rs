//! Shard file encoding
//!
//! A dataset directory holds one `<period key>.json` file per period and a
//! single `metadata.json` record. Panel shards map each date to the list of
//! cells in metadata symbol order; time-series shards map each date to a
//! single cell.
//!
//! ```text
//! stock/quote/status/
//!   metadata.json   {"start_time": "2018-01-02", "end_time": "2018-04-27",
//!                    "data_category": "PANEL", "filled_status": "FILLED",
//!                    "symbols": ["000001", "600000"]}
//!   2018Q1.json     {"2018-01-02": ["L", "L"], ...}
//!   2018Q2.json     {"2018-04-02": ["L", "ST"], ...}
//! ```
//!
//! The metadata symbol list only grows by appending, so a shard written
//! before a symbol appeared stores shorter rows; the missing cells decode as
//! `Cell::NotAvailable`.

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::{Cell, Frame, Layout};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// File name of the per-dataset metadata record
pub const METADATA_FILE: &str = "metadata.json";

/// Extension of shard files
pub const SHARD_SUFFIX: &str = "json";

/// Whether every stored shard covers the full symbol universe
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FilledStatus {
    /// All shards were written against the current symbol universe
    Filled,
    /// Older shards predate some symbols and decode with filler cells
    Unfilled,
}

/// Metadata record stored next to a dataset's shards
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShardMetadata {
    pub start_time: NaiveDate,
    pub end_time: NaiveDate,
    pub data_category: Layout,
    pub filled_status: FilledStatus,
    /// Symbol universe in storage order (panel data only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbols: Option<Vec<String>>,
}

impl ShardMetadata {
    /// Describe a freshly written frame
    pub fn describe(frame: &Frame) -> Option<Self> {
        Some(Self {
            start_time: frame.start_time()?,
            end_time: frame.end_time()?,
            data_category: frame.layout(),
            filled_status: FilledStatus::Filled,
            symbols: frame.symbols().map(|s| s.to_vec()),
        })
    }
}

/// Encode a frame into its shard file representation
pub fn encode(frame: &Frame) -> StorageResult<Vec<u8>> {
    let bytes = match frame.layout() {
        Layout::Panel => {
            let records: BTreeMap<NaiveDate, &[Cell]> = frame.iter().collect();
            serde_json::to_vec(&records)?
        }
        Layout::TimeSeries => {
            let records: BTreeMap<NaiveDate, &Cell> =
                frame.iter().filter_map(|(d, row)| row.first().map(|c| (d, c))).collect();
            serde_json::to_vec(&records)?
        }
    };
    Ok(bytes)
}

/// Decode one shard file; `source` names the shard in error messages
pub fn decode(bytes: &[u8], meta: &ShardMetadata, source: &str) -> StorageResult<Frame> {
    match meta.data_category {
        Layout::Panel => {
            let symbols = meta
                .symbols
                .clone()
                .ok_or_else(|| StorageError::MissingSymbols(source.to_string()))?;
            let records: BTreeMap<NaiveDate, Vec<Cell>> = serde_json::from_slice(bytes)?;

            let mut rows = Vec::with_capacity(records.len());
            for (date, mut row) in records {
                if row.len() > symbols.len() {
                    return Err(StorageError::Corruption(format!(
                        "{}: row {} has {} cells but only {} symbols are known",
                        source,
                        date,
                        row.len(),
                        symbols.len()
                    )));
                }
                row.resize(symbols.len(), Cell::NotAvailable);
                rows.push((date, row));
            }
            Frame::panel(symbols, rows)
        }
        Layout::TimeSeries => {
            let records: BTreeMap<NaiveDate, Cell> = serde_json::from_slice(bytes)?;
            Frame::time_series(records)
        }
    }
}

/// Decode several shards and fold them into one frame
///
/// Shards are ordered by descending start date and merged right to left, so
/// each older shard is placed in front of the newer ones.
pub fn load_frame(shards: &[(String, Vec<u8>)], meta: &ShardMetadata) -> StorageResult<Frame> {
    let mut frames = shards
        .iter()
        .map(|(name, bytes)| decode(bytes, meta, name))
        .collect::<StorageResult<Vec<_>>>()?;
    frames.retain(|f| !f.is_empty());
    frames.sort_by(|a, b| b.start_time().cmp(&a.start_time()));

    let mut iter = frames.into_iter();
    let Some(mut out) = iter.next() else {
        let symbols = meta.symbols.clone().unwrap_or_default();
        return Frame::from_sorted_parts(meta.data_category, Vec::new(), symbols, Vec::new());
    };
    for earlier in iter {
        out.update(&earlier)?;
    }
    Ok(out)
}
