//! # pitdb
//!
//! An embedded point-in-time store for financial panel and time-series data,
//! with an incremental update pipeline for derived datasets.
//!
//! ## Features
//!
//! - **Typed routing**: datasets are classified by a small taxonomy that
//!   decides which storage backend owns them
//! - **Chunked storage**: character data sharded into per-period JSON files
//! - **Catalog**: a persisted tree of namespaces and datasets
//! - **Updates**: dependency-ordered recompute with crash-safe watermarks
//!
//! ## Modules
//!
//! - [`storage`]: classification, routing, catalog, engines and the facade
//! - [`updater`]: derivation registry and update runs
//! - [`config`]: TOML configuration with environment overrides
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pitdb::config::{Config, StoreConfig};
//! use pitdb::storage::{Cell, Classification, Database, Frame};
//! use chrono::NaiveDate;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load_default();
//!     let mut db = Database::open(config.store)?;
//!
//!     let day = NaiveDate::from_ymd_opt(2018, 1, 2).unwrap();
//!     let frame = Frame::time_series(vec![(day, Cell::text("open"))])?;
//!     db.insert(&frame, "market.status", Classification::char_time_series())?;
//!
//!     for (path, class) in db.list_data() {
//!         println!("{} {}", path, class);
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod storage;
pub mod updater;

// Re-export top-level types for convenience
pub use storage::{
    Catalog, Category, Cell, Classification, Database, EngineRouter, Frame, FrameGroup, Layout,
    MatchMode,
    RequestDescriptor, StorageBackend, StorageError, StorageResult,
};

pub use updater::{
    Derivation, Registry, UpdateError, UpdateEvent, UpdateOutcome, UpdateResult, Updater,
    Watermarks,
};

pub use config::{Config, ConfigError, LoggingConfig, StoreConfig, UpdaterConfig};
