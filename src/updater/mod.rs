//! Incremental update pipeline
//!
//! Derived datasets are described by [`Derivation`] implementations collected
//! in a [`Registry`]. An [`Updater`] run visits them in dependency order,
//! recomputes everything after each dataset's watermark, appends the result
//! through the [`Database`](crate::storage::Database) facade and records the
//! new watermark right away.

mod calendar;
mod order;
mod orchestrator;
mod registry;
mod watermark;

pub use calendar::{resolve_end_date, TradingCalendar, WeekdayCalendar};
pub use order::{DependencyResolver, TopologicalOrder};
pub use orchestrator::{UpdateEvent, UpdateOutcome, Updater};
pub use registry::Registry;
pub use watermark::Watermarks;

use crate::storage::{Classification, Database, Frame, StorageError};
use async_trait::async_trait;
use chrono::NaiveDate;

/// A dataset computed from other data
#[async_trait]
pub trait Derivation: Send + Sync {
    /// Unique name, also the watermark key
    fn name(&self) -> &str;

    /// Dotted logical path the result is stored at
    fn rel_path(&self) -> &str;

    fn classification(&self) -> Classification;

    /// Names of derivations that must be up to date first
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    /// Datasets under test are never updated
    fn in_test(&self) -> bool {
        false
    }

    /// Compute the rows for `[start, end]`
    async fn recompute(
        &self,
        db: &Database,
        start: NaiveDate,
        end: NaiveDate,
    ) -> anyhow::Result<Frame>;
}

/// Errors of the update pipeline
#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    #[error("Recompute of {name} failed: {source:#}")]
    RecomputeFailure {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Persisting {name} failed: {source}")]
    PersistFailure {
        name: String,
        #[source]
        source: StorageError,
    },

    #[error("Derivation registered twice: {0}")]
    DuplicateDerivation(String),

    #[error("Derivation not registered: {0}")]
    UnknownDerivation(String),

    #[error("{name} depends on unknown derivation {dependency}")]
    UnknownDependency { name: String, dependency: String },

    #[error("Dependency cycle among: {}", .0.join(", "))]
    DependencyCycle(Vec<String>),

    #[error("Watermark file error: {0}")]
    Watermark(#[source] StorageError),
}

/// Result type for update operations
pub type UpdateResult<T> = Result<T, UpdateError>;
