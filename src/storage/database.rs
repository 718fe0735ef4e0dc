//! Storage facade
//!
//! [`Database`] is the single entry point of the store. Every call is turned
//! into a [`RequestDescriptor`], routed to the backend registered for its
//! classification, and the catalog is updated and re-saved after each
//! successful mutation.
//!
//! Mutations take `&mut self`, so one `Database` value serializes its own
//! writers. Nothing guards against a second process writing the same store.
//!
//! Settings that decide file names on disk are recorded in `store.json` when
//! the store is created, and a store is never opened with different ones.

use crate::config::StoreConfig;
use crate::storage::catalog::{Catalog, MatchMode};
use crate::storage::chunked::SplitFrequency;
use crate::storage::classification::Classification;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::fs;
use crate::storage::request::RequestDescriptor;
use crate::storage::router::EngineRouter;
use crate::storage::types::{Frame, FrameGroup};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Store-wide settings fixed at creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct StoreRecord {
    split_frequency: SplitFrequency,
}

impl StoreRecord {
    /// Check `config` against the recorded settings, recording them first
    /// for a new store
    fn check(config: &StoreConfig) -> StorageResult<()> {
        let path = config.store_record_path();
        if !path.exists() {
            let record = StoreRecord {
                split_frequency: config.split_frequency,
            };
            return fs::write_json(&path, &record);
        }

        let record: StoreRecord = fs::read_json(&path)?;
        if record.split_frequency != config.split_frequency {
            return Err(StorageError::Config(format!(
                "store at {:?} is sharded by {} but {} is configured",
                config.db_path, record.split_frequency, config.split_frequency
            )));
        }
        Ok(())
    }
}

/// Handle to an open store
pub struct Database {
    config: Arc<StoreConfig>,
    router: EngineRouter,
    catalog: Catalog,
}

impl Database {
    /// Open (or create) the store with the default routes
    pub fn open(config: StoreConfig) -> StorageResult<Self> {
        let config = Arc::new(config);
        let router = EngineRouter::with_defaults(Arc::clone(&config));
        Self::with_router(config, router)
    }

    /// Open the store with a custom routing table
    pub fn with_router(config: Arc<StoreConfig>, router: EngineRouter) -> StorageResult<Self> {
        config
            .validate()
            .map_err(|e| StorageError::Config(e.to_string()))?;
        std::fs::create_dir_all(&config.db_path)?;
        StoreRecord::check(&config)?;

        let catalog = Catalog::load(&config.catalog_path(), &config.db_name())?;
        tracing::info!(
            "Opened store at {:?} ({} datasets, {} routes)",
            config.db_path,
            catalog.datasets().len(),
            router.len()
        );

        Ok(Self {
            config,
            router,
            catalog,
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Routing table, e.g. to register a numeric backend after opening
    pub fn router_mut(&mut self) -> &mut EngineRouter {
        &mut self.router
    }

    /// Read `[start, end]` of a dataset; without `end` only the cross section at `start`
    pub fn query(
        &self,
        path: &str,
        classification: Classification,
        start: NaiveDate,
        end: Option<NaiveDate>,
    ) -> StorageResult<Frame> {
        let request = RequestDescriptor::build(
            &self.config.db_path,
            path,
            classification,
            Some(start),
            end,
            None,
        )?;
        let backend = self.router.route(&request)?;
        tracing::debug!("Query {} [{}, {:?}] via {}", path, start, end, backend.name());
        backend.query(&request)
    }

    /// Catalog path and classification of the dataset called `name`
    ///
    /// `name` is either a full dotted path or a bare dataset name that is
    /// unique across the catalog.
    pub fn resolve_name(&self, name: &str) -> StorageResult<(String, Classification)> {
        if let Some(class) = self
            .catalog
            .resolve(name)
            .and_then(|id| self.catalog.classification(id))
        {
            return Ok((name.to_string(), class.clone()));
        }

        let mut found = self
            .catalog
            .find(name, MatchMode::Exact)
            .into_iter()
            .filter_map(|path| {
                let id = self.catalog.resolve(&path)?;
                let class = self.catalog.classification(id)?.clone();
                Some((path, class))
            });
        let first = found
            .next()
            .ok_or_else(|| StorageError::DatasetNotFound(name.to_string()))?;
        if let Some((other, _)) = found.next() {
            return Err(StorageError::InvalidParameter(format!(
                "{} is ambiguous, found {} and {}",
                name, first.0, other
            )));
        }
        Ok(first)
    }

    /// Like [`Database::query`], with path and classification from the catalog
    pub fn query_named(
        &self,
        name: &str,
        start: NaiveDate,
        end: Option<NaiveDate>,
    ) -> StorageResult<Frame> {
        let (path, classification) = self.resolve_name(name)?;
        self.query(&path, classification, start, end)
    }

    /// Query several same-shaped datasets by name
    ///
    /// Fails with `InvalidParameter` unless every result has the same layout,
    /// dates and symbols.
    pub fn query_group<S: AsRef<str>>(
        &self,
        names: &[S],
        start: NaiveDate,
        end: Option<NaiveDate>,
    ) -> StorageResult<FrameGroup> {
        if names.len() == 1 {
            tracing::warn!("Group query with a single dataset, prefer query_named");
        }
        let members = names
            .iter()
            .map(|name| {
                let name = name.as_ref();
                Ok((name.to_string(), self.query_named(name, start, end)?))
            })
            .collect::<StorageResult<Vec<_>>>()?;
        FrameGroup::new(members)
    }

    /// Store `frame` at `path`, creating the dataset when needed
    pub fn insert(
        &mut self,
        frame: &Frame,
        path: &str,
        classification: Classification,
    ) -> StorageResult<()> {
        let request = RequestDescriptor::build(
            &self.config.db_path,
            path,
            classification,
            frame.start_time(),
            frame.end_time(),
            None,
        )?;
        let backend = self.router.route(&request)?;

        let registered = self
            .catalog
            .resolve(path)
            .is_some_and(|id| self.catalog.classification(id) == Some(request.classification()));
        if registered {
            return backend.insert(frame, &request);
        }

        let mut catalog = self.catalog.clone();
        catalog.ensure_dataset(path, request.classification())?;
        backend.insert(frame, &request)?;
        self.commit(catalog)
    }

    /// Delete a dataset; `Ok(false)` when it did not exist
    pub fn remove(&mut self, path: &str, classification: Classification) -> StorageResult<bool> {
        let request = RequestDescriptor::dataset(&self.config.db_path, path, classification, None)?;
        self.check_catalog_entry(path, request.classification())?;
        let backend = self.router.route(&request)?;

        let removed = backend.remove(&request)?;
        let mut catalog = self.catalog.clone();
        if catalog.remove_path(path) {
            self.commit(catalog)?;
        }
        Ok(removed)
    }

    /// Move a dataset to a new path; `Ok(false)` when the source does not exist
    pub fn move_to(
        &mut self,
        source: &str,
        dest: &str,
        classification: Classification,
    ) -> StorageResult<bool> {
        let from = RequestDescriptor::dataset(
            &self.config.db_path,
            source,
            classification.clone(),
            None,
        )?;
        let to = RequestDescriptor::dataset(&self.config.db_path, dest, classification, None)?;
        self.check_catalog_entry(source, from.classification())?;
        if self.catalog.resolve(dest).is_some() {
            return Err(StorageError::InvalidParameter(format!(
                "destination {} already exists",
                dest
            )));
        }
        let backend = self.router.route(&from)?;

        let mut catalog = self.catalog.clone();
        catalog.remove_path(source);
        catalog.ensure_dataset(dest, to.classification())?;

        if !backend.move_to(&from, &to)? {
            // nothing on disk; drop a stale catalog entry all the same
            let mut pruned = self.catalog.clone();
            if pruned.remove_path(source) {
                self.commit(pruned)?;
            }
            return Ok(false);
        }
        self.commit(catalog)?;
        Ok(true)
    }

    /// Dotted paths of catalog nodes matching `name`
    pub fn find_data(&self, name: &str, mode: MatchMode) -> Vec<String> {
        self.catalog.find(name, mode)
    }

    /// Every dataset with its classification
    pub fn list_data(&self) -> Vec<(String, Classification)> {
        self.catalog.datasets()
    }

    fn check_catalog_entry(&self, path: &str, classification: &Classification) -> StorageResult<()> {
        match self.catalog.resolve(path) {
            Some(id) if self.catalog.classification(id) != Some(classification) => {
                Err(StorageError::InvalidParameter(format!(
                    "{} is not stored as {}",
                    path, classification
                )))
            }
            _ => Ok(()),
        }
    }

    fn commit(&mut self, catalog: Catalog) -> StorageResult<()> {
        catalog.save(&self.config.catalog_path())?;
        self.catalog = catalog;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::types::test_util::{date, panel, series};
    use crate::storage::classification::Category;
    use crate::storage::router::StorageBackend;
    use crate::storage::types::Cell;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::tempdir;

    fn open(dir: &std::path::Path) -> Database {
        Database::open(StoreConfig::new(dir.join("db"))).unwrap()
    }

    #[test]
    fn test_insert_registers_dataset() {
        let dir = tempdir().unwrap();
        let mut db = open(dir.path());
        let frame = panel(&["a", "b"], &["2018-01-02", "2018-01-03"]);

        db.insert(&frame, "stock.status", Classification::char_panel())
            .unwrap();

        assert_eq!(
            db.list_data(),
            vec![("stock.status".to_string(), Classification::char_panel())]
        );
        assert!(dir.path().join("db").join("catalog.json").exists());

        let data = db
            .query(
                "stock.status",
                Classification::char_panel(),
                date("2018-01-01"),
                Some(date("2018-12-31")),
            )
            .unwrap();
        assert_eq!(data, frame);
    }

    #[test]
    fn test_catalog_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let mut db = open(dir.path());
            db.insert(&series(&["2018-01-02"]), "index.name", Classification::char_time_series())
                .unwrap();
        }

        let db = open(dir.path());
        assert_eq!(db.find_data("name", MatchMode::Exact), vec!["index.name"]);
        let value = db
            .query("index.name", Classification::char_time_series(), date("2018-01-02"), None)
            .unwrap();
        assert_eq!(value.value(date("2018-01-02")), Some(&Cell::text("v@2018-01-02")));
    }

    #[test]
    fn test_conflicting_classification() {
        let dir = tempdir().unwrap();
        let mut db = open(dir.path());
        db.insert(&series(&["2018-01-02"]), "a.b", Classification::char_time_series())
            .unwrap();

        let err = db
            .insert(&panel(&["x"], &["2018-01-03"]), "a.b", Classification::char_panel())
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidParameter(_)));

        let err = db
            .insert(&series(&["2018-01-03"]), "a", Classification::char_time_series())
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidParameter(_)));
        assert!(!dir.path().join("db").join("a").join("metadata.json").exists());
    }

    #[test]
    fn test_unsupported_and_invalid_requests() {
        let dir = tempdir().unwrap();
        let mut db = open(dir.path());

        let err = db
            .insert(&panel(&["x"], &["2018-01-02"]), "n", Classification::numeric_panel())
            .unwrap_err();
        assert!(matches!(err, StorageError::UnsupportedClassification(_)));

        let err = db
            .insert(&Frame::empty(crate::storage::types::Layout::Panel), "e", Classification::char_panel())
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidParameter(_)));
        assert!(db.list_data().is_empty());
    }

    #[test]
    fn test_remove_prunes_catalog() {
        let dir = tempdir().unwrap();
        let mut db = open(dir.path());
        let class = Classification::char_time_series;
        db.insert(&series(&["2018-01-02"]), "x.y.z", class()).unwrap();
        db.insert(&series(&["2018-01-02"]), "x.w", class()).unwrap();

        assert!(db.remove("x.y.z", class()).unwrap());
        assert!(db.catalog().resolve("x.y").is_none());
        assert!(db.catalog().resolve("x.w").is_some());
        assert!(!db.remove("x.y.z", class()).unwrap());

        assert!(matches!(
            db.remove("x.w", Classification::char_panel()),
            Err(StorageError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_move_updates_catalog() {
        let dir = tempdir().unwrap();
        let mut db = open(dir.path());
        let class = Classification::char_time_series;
        db.insert(&series(&["2018-01-02"]), "old.name", class()).unwrap();

        assert!(db.move_to("old.name", "new.name", class()).unwrap());
        assert_eq!(db.list_data(), vec![("new.name".to_string(), class())]);
        assert!(db
            .query("new.name", class(), date("2018-01-02"), None)
            .unwrap()
            .value(date("2018-01-02"))
            .is_some());

        assert!(!db.move_to("old.name", "other", class()).unwrap());
        assert_eq!(db.list_data().len(), 1);
    }

    #[test]
    fn test_split_frequency_is_fixed() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("db");
        {
            let mut db = open(dir.path());
            db.insert(&panel(&["a"], &["2018-01-02", "2018-02-01"]), "x.y", Classification::char_panel())
                .unwrap();
        }

        let monthly = StoreConfig::new(&root).split_frequency(SplitFrequency::Month);
        assert!(matches!(Database::open(monthly), Err(StorageError::Config(_))));

        let db = open(dir.path());
        let data = db
            .query("x.y", Classification::char_panel(), date("2018-01-01"), Some(date("2018-12-31")))
            .unwrap();
        assert_eq!(data.len(), 2);
    }

    #[test]
    fn test_query_by_name() {
        let dir = tempdir().unwrap();
        let mut db = open(dir.path());
        let frame = panel(&["a", "b"], &["2018-01-02", "2018-01-03"]);
        db.insert(&frame, "stock.status", Classification::char_panel())
            .unwrap();
        db.insert(&series(&["2018-01-02"]), "index.name", Classification::char_time_series())
            .unwrap();

        let start = date("2018-01-01");
        let end = Some(date("2018-12-31"));
        assert_eq!(db.query_named("status", start, end).unwrap(), frame);
        assert_eq!(db.query_named("stock.status", start, end).unwrap(), frame);
        assert_eq!(
            db.resolve_name("name").unwrap(),
            ("index.name".to_string(), Classification::char_time_series())
        );

        assert!(matches!(
            db.query_named("missing", start, end),
            Err(StorageError::DatasetNotFound(_))
        ));
        assert!(matches!(
            db.query_named("stock", start, end),
            Err(StorageError::DatasetNotFound(_))
        ));

        db.insert(&series(&["2018-01-02"]), "fund.status", Classification::char_time_series())
            .unwrap();
        assert!(matches!(
            db.query_named("status", start, end),
            Err(StorageError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_query_group() {
        let dir = tempdir().unwrap();
        let mut db = open(dir.path());
        let dates = ["2018-01-02", "2018-01-03"];
        let class = Classification::char_panel;
        db.insert(&panel(&["a", "b"], &dates), "quote.open", class()).unwrap();
        db.insert(&panel(&["a", "b"], &dates), "quote.close", class()).unwrap();
        db.insert(&panel(&["a"], &dates), "quote.volume", class()).unwrap();

        let group = db
            .query_group(&["open", "close"], date("2018-01-01"), Some(date("2018-01-31")))
            .unwrap();
        assert_eq!(group.names(), &["open", "close"]);
        assert_eq!(group.index().len(), 2);

        let section = db.query_group(&["open", "close"], date("2018-01-03"), None).unwrap();
        assert_eq!(section.index(), &[date("2018-01-03")]);

        assert!(matches!(
            db.query_group(&["open", "volume"], date("2018-01-02"), None),
            Err(StorageError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_move_drops_stale_entry() {
        let dir = tempdir().unwrap();
        let mut db = open(dir.path());
        let class = Classification::char_time_series;
        db.insert(&series(&["2018-01-02"]), "x.y", class()).unwrap();
        std::fs::remove_dir_all(dir.path().join("db").join("x")).unwrap();

        assert!(!db.move_to("x.y", "z", class()).unwrap());
        assert!(db.list_data().is_empty());
        assert!(open(dir.path()).list_data().is_empty());
    }

    #[derive(Default)]
    struct MemoryBackend {
        data: Mutex<HashMap<String, Frame>>,
    }

    impl StorageBackend for MemoryBackend {
        fn name(&self) -> &str {
            "memory"
        }

        fn query(&self, request: &RequestDescriptor) -> StorageResult<Frame> {
            let data = self.data.lock().unwrap();
            let frame = data
                .get(request.rel_path())
                .ok_or_else(|| StorageError::DatasetNotFound(request.rel_path().to_string()))?;
            let start = request.start_time().unwrap();
            Ok(frame.slice(start, request.end_time().unwrap_or(start)))
        }

        fn insert(&self, frame: &Frame, request: &RequestDescriptor) -> StorageResult<()> {
            let mut data = self.data.lock().unwrap();
            data.insert(request.rel_path().to_string(), frame.clone());
            Ok(())
        }

        fn remove(&self, request: &RequestDescriptor) -> StorageResult<bool> {
            Ok(self.data.lock().unwrap().remove(request.rel_path()).is_some())
        }

        fn move_to(&self, _source: &RequestDescriptor, _dest: &RequestDescriptor) -> StorageResult<bool> {
            Ok(false)
        }
    }

    #[test]
    fn test_backend_registered_through_facade() {
        let dir = tempdir().unwrap();
        let mut db = open(dir.path());
        db.router_mut().register(
            [Category::Structured, Category::Numeric, Category::Panel],
            Arc::new(MemoryBackend::default()),
        );

        let frame = Frame::panel(
            vec!["a".to_string()],
            vec![
                (date("2018-01-02"), vec![Cell::Number(1.5)]),
                (date("2018-01-03"), vec![Cell::Number(2.0)]),
            ],
        )
        .unwrap();
        db.insert(&frame, "quote.close", Classification::numeric_panel())
            .unwrap();

        assert_eq!(
            db.list_data(),
            vec![("quote.close".to_string(), Classification::numeric_panel())]
        );
        let data = db.query_named("close", date("2018-01-03"), None).unwrap();
        assert_eq!(data.get(date("2018-01-03"), "a"), Some(&Cell::Number(2.0)));
        assert!(!dir.path().join("db").join("quote").exists());

        assert!(db.remove("quote.close", Classification::numeric_panel()).unwrap());
        assert!(db.list_data().is_empty());
    }
}
