//! Period-sharded JSON engine for character data
//!
//! - **period**: period keys and split frequency
//! - **merge**: joining adjacent or overlapping frames
//! - **shard**: shard and metadata file encoding
//! - **engine**: the [`StorageBackend`](crate::storage::StorageBackend) implementation

pub mod engine;
pub mod merge;
pub mod period;
pub mod shard;

pub use engine::ChunkedEngine;
pub use merge::{merge, MergeOutcome, OverlapShapeWarning};
pub use period::{period_key, period_key_range, SplitFrequency};
pub use shard::{FilledStatus, ShardMetadata};
