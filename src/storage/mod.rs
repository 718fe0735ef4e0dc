//! pitdb storage layer
//!
//! - **classification**: dataset taxonomy and its transition table
//! - **request**: validated request descriptors
//! - **router**: classification triple to backend table
//! - **catalog**: tree of namespaces and datasets
//! - **chunked**: the period-sharded JSON engine
//! - **database**: the facade tying the above together
//! - **csv_io**: CSV import and export of frames
//! - **error**: error types
//!
//! # Architecture
//!
//! ```text
//! Database::insert/query/remove/move_to
//!   → RequestDescriptor → EngineRouter → StorageBackend → files
//!   → Catalog (re-saved after every mutation)
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use pitdb::config::StoreConfig;
//! use pitdb::storage::{Cell, Classification, Database, Frame};
//! use chrono::NaiveDate;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut db = Database::open(StoreConfig::new("./pitdb_data"))?;
//!
//!     let day = NaiveDate::from_ymd_opt(2018, 1, 2).unwrap();
//!     let frame = Frame::panel(
//!         vec!["000001".to_string(), "600000".to_string()],
//!         vec![(day, vec![Cell::text("L"), Cell::text("ST")])],
//!     )?;
//!     db.insert(&frame, "stock.status", Classification::char_panel())?;
//!
//!     let data = db.query("stock.status", Classification::char_panel(), day, None)?;
//!     println!("{} rows", data.len());
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod chunked;
pub mod classification;
pub mod csv_io;
pub mod database;
pub mod error;
pub mod fs;
pub mod request;
pub mod router;
pub mod types;

// Re-export commonly used types
pub use catalog::{Catalog, MatchMode, NodeId, TreeNode};
pub use chunked::{
    merge, period_key, period_key_range, ChunkedEngine, FilledStatus, MergeOutcome,
    OverlapShapeWarning, ShardMetadata, SplitFrequency,
};
pub use classification::{Category, Classification};
pub use csv_io::{write_csv, write_group_csv, CsvReader};
pub use database::Database;
pub use error::{StorageError, StorageResult};
pub use request::RequestDescriptor;
pub use router::{EngineRouter, RouteKey, StorageBackend};
pub use types::{Cell, ElementType, Frame, FrameGroup, Layout};
