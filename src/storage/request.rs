//! Request descriptor
//!
//! Every facade call is turned into a validated, immutable
//! [`RequestDescriptor`] before any backend sees it. The only field filled in
//! later is the absolute on-disk path, which the owning backend sets exactly
//! once.

use crate::storage::classification::{Category, Classification};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::ElementType;
use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Separator of logical path segments, e.g. `stock.quote.close`
pub const PATH_SEPARATOR: char = '.';

/// Validated parameters of a single storage request
#[derive(Debug)]
pub struct RequestDescriptor {
    base_path: PathBuf,
    rel_path: String,
    classification: Classification,
    start_time: Option<NaiveDate>,
    end_time: Option<NaiveDate>,
    element_type: Option<ElementType>,
    absolute_path: OnceLock<PathBuf>,
}

impl RequestDescriptor {
    /// Build a descriptor for a time-bounded request
    ///
    /// Structured data needs at least `start` (start only asks for the cross
    /// section at that date); unstructured data takes neither bound.
    pub fn build(
        base_path: impl Into<PathBuf>,
        rel_path: &str,
        classification: Classification,
        start_time: Option<NaiveDate>,
        end_time: Option<NaiveDate>,
        element_type: Option<ElementType>,
    ) -> StorageResult<Self> {
        let expected = match (start_time, end_time) {
            (None, None) => Category::Unstructured,
            (Some(_), _) => Category::Structured,
            (None, Some(_)) => {
                return Err(StorageError::InvalidParameter(
                    "end time given without a start time".to_string(),
                ))
            }
        };

        let descriptor = Self::dataset(base_path, rel_path, classification, element_type)?;
        if descriptor.classification.top() != Some(expected) {
            return Err(StorageError::InvalidParameter(format!(
                "time bounds ({:?}, {:?}) do not fit classification {}",
                start_time, end_time, descriptor.classification
            )));
        }
        if let (Some(start), Some(end)) = (start_time, end_time) {
            if start > end {
                return Err(StorageError::InvalidParameter(format!(
                    "start time {} is after end time {}",
                    start, end
                )));
            }
        }

        Ok(Self {
            start_time,
            end_time,
            ..descriptor
        })
    }

    /// Build a descriptor addressing a whole dataset (remove, move)
    pub fn dataset(
        base_path: impl Into<PathBuf>,
        rel_path: &str,
        classification: Classification,
        element_type: Option<ElementType>,
    ) -> StorageResult<Self> {
        if !classification.validate() {
            return Err(StorageError::InvalidParameter(format!(
                "invalid classification: {}",
                classification
            )));
        }
        validate_rel_path(rel_path)?;
        if element_type.is_some() && !classification.is_numeric() {
            return Err(StorageError::InvalidParameter(format!(
                "element type only applies to numeric data, got {}",
                classification
            )));
        }

        Ok(Self {
            base_path: base_path.into(),
            rel_path: rel_path.to_string(),
            classification,
            start_time: None,
            end_time: None,
            element_type,
            absolute_path: OnceLock::new(),
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn rel_path(&self) -> &str {
        &self.rel_path
    }

    /// Logical path segments
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.rel_path.split(PATH_SEPARATOR)
    }

    pub fn classification(&self) -> &Classification {
        &self.classification
    }

    pub fn start_time(&self) -> Option<NaiveDate> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<NaiveDate> {
        self.end_time
    }

    pub fn element_type(&self) -> Option<ElementType> {
        self.element_type
    }

    /// Set the backend-specific absolute path; may only happen once
    pub fn set_absolute_path(&self, path: PathBuf) -> StorageResult<()> {
        self.absolute_path.set(path).map_err(|path| {
            StorageError::InvalidParameter(format!(
                "absolute path of {} already set, refusing {:?}",
                self.rel_path, path
            ))
        })
    }

    pub fn absolute_path(&self) -> Option<&Path> {
        self.absolute_path.get().map(|p| p.as_path())
    }
}

/// Check a dotted logical path
pub fn validate_rel_path(rel_path: &str) -> StorageResult<()> {
    let valid = !rel_path.is_empty()
        && rel_path.split(PATH_SEPARATOR).all(|segment| {
            !segment.is_empty()
                && segment != ".."
                && !segment.contains(['/', '\\'])
                && segment.trim() == segment
        });
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidParameter(format!(
            "invalid logical path: {:?}",
            rel_path
        )))
    }
}
