//! Classification taxonomy
//!
//! A dataset is classified by up to three levels:
//! - structure: `STRUCTURED` / `UNSTRUCTURED`
//! - value kind: `CHAR` / `NUMERIC`
//! - layout: `PANEL` / `TIME_SERIES`
//!
//! The terminal level `None` (JSON `null`, `"NONE"` in string form) may only
//! close the unstructured branch. The full triple is what the router keys on.

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::Layout;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum number of classification levels
pub const MAX_LEVELS: usize = 3;

/// One enumerated classification level
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    Structured,
    Unstructured,
    Char,
    Numeric,
    Panel,
    TimeSeries,
}

impl Category {
    /// Get all categories for iteration
    pub fn all() -> &'static [Category] {
        &[
            Category::Structured,
            Category::Unstructured,
            Category::Char,
            Category::Numeric,
            Category::Panel,
            Category::TimeSeries,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Structured => "STRUCTURED",
            Category::Unstructured => "UNSTRUCTURED",
            Category::Char => "CHAR",
            Category::Numeric => "NUMERIC",
            Category::Panel => "PANEL",
            Category::TimeSeries => "TIME_SERIES",
        }
    }

    /// Whether this category may open a classification
    pub fn is_top_level(&self) -> bool {
        matches!(self, Category::Structured | Category::Unstructured)
    }

    /// Layout carried by a third-level category
    pub fn layout(&self) -> Option<Layout> {
        match self {
            Category::Panel => Some(Layout::Panel),
            Category::TimeSeries => Some(Layout::TimeSeries),
            _ => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::all()
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| StorageError::InvalidParameter(format!("unknown category: {}", s)))
    }
}

/// Levels allowed to follow `prev` (`None` is the terminal level)
pub fn allowed_after(prev: Option<Category>) -> &'static [Option<Category>] {
    match prev {
        Some(Category::Structured) => &[Some(Category::Char), Some(Category::Numeric)],
        Some(Category::Unstructured) => &[None],
        Some(Category::Char) | Some(Category::Numeric) => {
            &[Some(Category::Panel), Some(Category::TimeSeries)]
        }
        Some(Category::Panel) | Some(Category::TimeSeries) => &[],
        None => &[None],
    }
}

/// Ordered classification levels of a dataset
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Classification(Vec<Option<Category>>);

impl Classification {
    /// Build from concrete categories
    pub fn new(levels: impl IntoIterator<Item = Category>) -> Self {
        Self(levels.into_iter().map(Some).collect())
    }

    /// Build from levels that may contain the terminal `None`
    pub fn from_levels(levels: Vec<Option<Category>>) -> Self {
        Self(levels)
    }

    pub fn char_panel() -> Self {
        Self::new([Category::Structured, Category::Char, Category::Panel])
    }

    pub fn char_time_series() -> Self {
        Self::new([Category::Structured, Category::Char, Category::TimeSeries])
    }

    pub fn numeric_panel() -> Self {
        Self::new([Category::Structured, Category::Numeric, Category::Panel])
    }

    pub fn numeric_time_series() -> Self {
        Self::new([Category::Structured, Category::Numeric, Category::TimeSeries])
    }

    pub fn unstructured() -> Self {
        Self(vec![Some(Category::Unstructured), None])
    }

    /// Parse a string tuple such as `["STRUCTURED", "CHAR", "PANEL"]`
    pub fn parse<S: AsRef<str>>(levels: &[S]) -> StorageResult<Self> {
        if levels.len() > MAX_LEVELS {
            return Err(StorageError::InvalidParameter(format!(
                "at most {} classification levels are supported, got {}",
                MAX_LEVELS,
                levels.len()
            )));
        }

        let parsed = levels
            .iter()
            .map(|level| match level.as_ref().trim() {
                "NONE" | "None" => Ok(None),
                other => other.parse().map(Some),
            })
            .collect::<StorageResult<Vec<_>>>()?;

        Ok(Self(parsed))
    }

    /// Check every adjacent pair against the transition table
    pub fn validate(&self) -> bool {
        if self.0.is_empty() || self.0.len() > MAX_LEVELS {
            return false;
        }
        if !matches!(self.0[0], Some(c) if c.is_top_level()) {
            return false;
        }
        self.0
            .windows(2)
            .all(|pair| allowed_after(pair[0]).contains(&pair[1]))
    }

    pub fn levels(&self) -> &[Option<Category>] {
        &self.0
    }

    /// Get the category at `level` (0 is the top level)
    pub fn level(&self, level: usize) -> Option<Category> {
        self.0.get(level).copied().flatten()
    }

    pub fn top(&self) -> Option<Category> {
        self.level(0)
    }

    /// The fully specified triple, if every level is concrete
    pub fn triple(&self) -> Option<[Category; MAX_LEVELS]> {
        match self.0.as_slice() {
            [Some(a), Some(b), Some(c)] => Some([*a, *b, *c]),
            _ => None,
        }
    }

    pub fn layout(&self) -> Option<Layout> {
        self.level(2).and_then(|c| c.layout())
    }

    pub fn is_numeric(&self) -> bool {
        self.level(1) == Some(Category::Numeric)
    }

    /// String form of every level, `"NONE"` for the terminal
    pub fn to_strings(&self) -> Vec<String> {
        self.0
            .iter()
            .map(|level| level.map(|c| c.as_str()).unwrap_or("NONE").to_string())
            .collect()
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_strings().join(","))
    }
}

impl FromStr for Classification {
    type Err = StorageError;

    /// Parse a comma separated tuple, e.g. `STRUCTURED,CHAR,PANEL`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let levels: Vec<&str> = s.split(',').filter(|l| !l.trim().is_empty()).collect();
        Self::parse(&levels)
    }
}
