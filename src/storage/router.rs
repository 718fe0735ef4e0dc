//! Engine routing
//!
//! Backends are registered once at startup against a full classification
//! triple. Routing a request is a plain table lookup.

use crate::config::StoreConfig;
use crate::storage::chunked::ChunkedEngine;
use crate::storage::classification::{Category, MAX_LEVELS};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::request::RequestDescriptor;
use crate::storage::types::Frame;
use std::collections::HashMap;
use std::sync::Arc;

/// Common contract of all storage backends
pub trait StorageBackend: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Read the data addressed by `request`
    fn query(&self, request: &RequestDescriptor) -> StorageResult<Frame>;

    /// Persist `frame` at the dataset addressed by `request`
    fn insert(&self, frame: &Frame, request: &RequestDescriptor) -> StorageResult<()>;

    /// Delete a dataset; `Ok(false)` when there was nothing to delete
    fn remove(&self, request: &RequestDescriptor) -> StorageResult<bool>;

    /// Move a dataset; `Ok(false)` when the source does not exist
    fn move_to(&self, source: &RequestDescriptor, dest: &RequestDescriptor) -> StorageResult<bool>;
}

/// Routing key: the fully specified classification
pub type RouteKey = [Category; MAX_LEVELS];

/// Static table from classification triple to backend
#[derive(Default)]
pub struct EngineRouter {
    routes: HashMap<RouteKey, Arc<dyn StorageBackend>>,
}

impl EngineRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Router with the chunked engine serving all character data
    pub fn with_defaults(config: Arc<StoreConfig>) -> Self {
        let chunked: Arc<dyn StorageBackend> = Arc::new(ChunkedEngine::new(config));
        let mut router = Self::new();
        router.register(
            [Category::Structured, Category::Char, Category::Panel],
            Arc::clone(&chunked),
        );
        router.register(
            [Category::Structured, Category::Char, Category::TimeSeries],
            chunked,
        );
        router
    }

    /// Register (or replace) the backend serving `key`
    pub fn register(&mut self, key: RouteKey, backend: Arc<dyn StorageBackend>) {
        tracing::debug!(
            "Routing {:?} to {} backend",
            key.map(|c| c.as_str()),
            backend.name()
        );
        self.routes.insert(key, backend);
    }

    /// Find the backend owning the request's classification
    pub fn route(&self, request: &RequestDescriptor) -> StorageResult<Arc<dyn StorageBackend>> {
        request
            .classification()
            .triple()
            .and_then(|key| self.routes.get(&key))
            .cloned()
            .ok_or_else(|| {
                StorageError::UnsupportedClassification(request.classification().to_string())
            })
    }

    /// Number of registered routes
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
