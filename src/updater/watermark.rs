//! Per-derivation update watermarks
//!
//! Stored as a flat JSON map `{name: "YYYY-MM-DD"}` next to the catalog.

use super::{UpdateError, UpdateResult};
use crate::storage::fs;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Last successfully persisted end date of every derivation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Watermarks(BTreeMap<String, NaiveDate>);

impl Watermarks {
    /// Load the watermark file; a missing file means nothing was updated yet
    pub fn load(path: &Path) -> UpdateResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        fs::read_json(path).map_err(UpdateError::Watermark)
    }

    pub fn save(&self, path: &Path) -> UpdateResult<()> {
        fs::write_json(path, self).map_err(UpdateError::Watermark)
    }

    pub fn get(&self, name: &str) -> Option<NaiveDate> {
        self.0.get(name).copied()
    }

    pub fn set(&mut self, name: impl Into<String>, date: NaiveDate) {
        self.0.insert(name.into(), date);
    }

    /// Entries in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, NaiveDate)> {
        self.0.iter().map(|(name, date)| (name.as_str(), *date))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
