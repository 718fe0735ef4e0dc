//! Chunked storage engine
//!
//! Each dataset lives in its own directory below the store root, one path
//! segment per directory level. Rows are sharded into period files (see
//! [`period_key`]) and described by a single `metadata.json` record, which is
//! always written last. A reader that sees a metadata record can therefore
//! rely on every shard it references.
//!
//! Datasets are point-in-time and append-only: an insert only ever adds rows
//! after the stored end date.

use crate::config::StoreConfig;
use crate::storage::chunked::period::{period_key, period_key_range};
use crate::storage::chunked::shard::{
    self, FilledStatus, ShardMetadata, METADATA_FILE, SHARD_SUFFIX,
};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::fs;
use crate::storage::request::RequestDescriptor;
use crate::storage::router::StorageBackend;
use crate::storage::types::{Frame, Layout};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Period-sharded JSON storage for character data
pub struct ChunkedEngine {
    config: Arc<StoreConfig>,
}

impl ChunkedEngine {
    pub fn new(config: Arc<StoreConfig>) -> Self {
        Self { config }
    }

    /// Directory holding the dataset addressed by `request`
    fn dataset_dir(&self, request: &RequestDescriptor) -> StorageResult<PathBuf> {
        if let Some(path) = request.absolute_path() {
            return Ok(path.to_path_buf());
        }

        let mut path = request.base_path().to_path_buf();
        for segment in request.segments() {
            path.push(segment);
        }
        request.set_absolute_path(path.clone())?;
        Ok(path)
    }

    fn expected_layout(request: &RequestDescriptor) -> StorageResult<Layout> {
        request.classification().layout().ok_or_else(|| {
            StorageError::UnsupportedClassification(request.classification().to_string())
        })
    }

    fn read_metadata(dir: &Path) -> StorageResult<Option<ShardMetadata>> {
        let path = dir.join(METADATA_FILE);
        if !path.exists() {
            return Ok(None);
        }
        fs::read_json(&path).map(Some)
    }

    fn shard_path(dir: &Path, key: &str) -> PathBuf {
        dir.join(format!("{}.{}", key, SHARD_SUFFIX))
    }

    /// Load and fold the shards named by `keys`; missing files are skipped
    fn load_shards(dir: &Path, keys: &[String], meta: &ShardMetadata) -> StorageResult<Frame> {
        let mut shards = Vec::with_capacity(keys.len());
        for key in keys {
            match std::fs::read(Self::shard_path(dir, key)) {
                Ok(bytes) => shards.push((key.clone(), bytes)),
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    tracing::trace!("No shard {} in {:?}", key, dir);
                }
                Err(e) => return Err(e.into()),
            }
        }
        shard::load_frame(&shards, meta)
    }

    /// Split `frame` by period and write every part
    fn write_shards(&self, dir: &Path, frame: &Frame) -> StorageResult<usize> {
        let parts = frame.split(self.config.split_frequency);
        for (key, part) in &parts {
            fs::write_atomic(&Self::shard_path(dir, key), &shard::encode(part)?)?;
        }
        Ok(parts.len())
    }

    fn append(&self, dir: &Path, frame: &Frame, meta: ShardMetadata) -> StorageResult<()> {
        if frame.layout() != meta.data_category {
            return Err(StorageError::InvalidParameter(format!(
                "incompatible layouts, {} stored but {} provided",
                meta.data_category,
                frame.layout()
            )));
        }
        if frame.start_time() < Some(meta.start_time) {
            return Err(StorageError::InvalidParameter(format!(
                "data starting {:?} precedes stored start {}",
                frame.start_time(),
                meta.start_time
            )));
        }

        let mut tail = frame.drop_through(meta.end_time);
        if tail.is_empty() {
            tracing::debug!("Nothing after {} to append in {:?}", meta.end_time, dir);
            return Ok(());
        }
        let appended = tail.len();

        let old_symbols = match meta.data_category {
            Layout::Panel => {
                let symbols = meta
                    .symbols
                    .clone()
                    .ok_or_else(|| StorageError::MissingSymbols(dir.display().to_string()))?;
                tail = tail.rearrange_symbols(&symbols)?;
                symbols.len()
            }
            Layout::TimeSeries => 0,
        };

        let frequency = self.config.split_frequency;
        let last_key = period_key(meta.end_time, frequency);
        let stored = Self::load_shards(dir, std::slice::from_ref(&last_key), &meta)?
            .slice(meta.start_time, meta.end_time);

        tail.update(&stored)?;
        let combined = tail;
        let written = self.write_shards(dir, &combined)?;

        let grew = combined
            .symbols()
            .map(|s| s.len() > old_symbols)
            .unwrap_or(false);
        let older_shards = period_key(meta.start_time, frequency) != last_key;
        let filled_status = if grew && older_shards {
            FilledStatus::Unfilled
        } else {
            meta.filled_status
        };

        let new_meta = ShardMetadata {
            start_time: meta.start_time,
            end_time: combined.end_time().unwrap_or(meta.end_time),
            data_category: meta.data_category,
            filled_status,
            symbols: combined.symbols().map(|s| s.to_vec()),
        };
        fs::write_json(&dir.join(METADATA_FILE), &new_meta)?;

        tracing::debug!(
            "Appended {} rows to {:?} ({} shards rewritten, now ending {})",
            appended,
            dir,
            written,
            new_meta.end_time
        );
        Ok(())
    }

    /// Remove empty directories between `dir` and the store root
    fn prune_empty_parents(dir: &Path, root: &Path) {
        let mut current = dir.parent();
        while let Some(path) = current {
            if path == root || !path.starts_with(root) {
                break;
            }
            if std::fs::remove_dir(path).is_err() {
                break;
            }
            current = path.parent();
        }
    }
}

impl StorageBackend for ChunkedEngine {
    fn name(&self) -> &str {
        "chunked"
    }

    fn query(&self, request: &RequestDescriptor) -> StorageResult<Frame> {
        let layout = Self::expected_layout(request)?;
        let dir = self.dataset_dir(request)?;
        let meta = Self::read_metadata(&dir)?
            .ok_or_else(|| StorageError::DatasetNotFound(request.rel_path().to_string()))?;

        if meta.data_category != layout {
            return Err(StorageError::InvalidParameter(format!(
                "{} is stored as {} but was requested as {}",
                request.rel_path(),
                meta.data_category,
                layout
            )));
        }

        let start = request.start_time().ok_or_else(|| {
            StorageError::InvalidParameter("structured query without a start time".to_string())
        })?;
        let end = request.end_time().unwrap_or(start);

        let lo = start.max(meta.start_time);
        let hi = end.min(meta.end_time);
        if lo > hi {
            return shard::load_frame(&[], &meta);
        }

        let keys = period_key_range(lo, hi, self.config.split_frequency);
        let frame = Self::load_shards(&dir, &keys, &meta)?;
        Ok(frame.slice(lo, hi))
    }

    fn insert(&self, frame: &Frame, request: &RequestDescriptor) -> StorageResult<()> {
        let layout = Self::expected_layout(request)?;
        if frame.is_empty() {
            return Err(StorageError::InvalidParameter(format!(
                "refusing to insert empty data into {}",
                request.rel_path()
            )));
        }
        if frame.layout() != layout {
            return Err(StorageError::InvalidParameter(format!(
                "incompatible layouts, {} required but {} provided",
                layout,
                frame.layout()
            )));
        }

        let dir = self.dataset_dir(request)?;
        match Self::read_metadata(&dir)? {
            Some(meta) => self.append(&dir, frame, meta),
            None => {
                let meta = ShardMetadata::describe(frame).ok_or_else(|| {
                    StorageError::InvalidParameter("data without time bounds".to_string())
                })?;
                let written = self.write_shards(&dir, frame)?;
                fs::write_json(&dir.join(METADATA_FILE), &meta)?;
                tracing::info!(
                    "Created {} with {} rows in {} shards",
                    request.rel_path(),
                    frame.len(),
                    written
                );
                Ok(())
            }
        }
    }

    fn remove(&self, request: &RequestDescriptor) -> StorageResult<bool> {
        let dir = self.dataset_dir(request)?;
        if !dir.exists() {
            tracing::warn!("Cannot remove {}: no such dataset", request.rel_path());
            return Ok(false);
        }

        std::fs::remove_dir_all(&dir)?;
        Self::prune_empty_parents(&dir, request.base_path());
        tracing::info!("Removed {}", request.rel_path());
        Ok(true)
    }

    fn move_to(&self, source: &RequestDescriptor, dest: &RequestDescriptor) -> StorageResult<bool> {
        let from = self.dataset_dir(source)?;
        let to = self.dataset_dir(dest)?;
        if !from.exists() {
            tracing::warn!("Cannot move {}: no such dataset", source.rel_path());
            return Ok(false);
        }
        if to.exists() {
            return Err(StorageError::InvalidParameter(format!(
                "destination {} already exists",
                dest.rel_path()
            )));
        }

        if let Some(parent) = to.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::rename(&from, &to)?;
        Self::prune_empty_parents(&from, source.base_path());
        tracing::info!("Moved {} to {}", source.rel_path(), dest.rel_path());
        Ok(true)
    }
}
