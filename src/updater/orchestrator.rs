//! Update runs
//!
//! One run visits every registered derivation exactly once, in the
//! resolver's order:
//!
//! 1. derivations under test are skipped
//! 2. derivations whose dependencies did not reach the run's end date are skipped
//! 3. derivations already at the end date are skipped
//! 4. otherwise `[watermark, end]` is recomputed and inserted, and the
//!    watermark file is rewritten before moving on
//!
//! Recompute and insert failures are logged and turn the run's result to
//! `false` without stopping it. The watermark file therefore always reflects
//! exactly the datasets whose writes completed.

use super::calendar::{resolve_end_date, TradingCalendar, WeekdayCalendar};
use super::order::{DependencyResolver, TopologicalOrder};
use super::registry::Registry;
use super::watermark::Watermarks;
use super::{UpdateError, UpdateResult};
use crate::config::UpdaterConfig;
use crate::storage::Database;
use chrono::{NaiveDate, NaiveDateTime};
use std::fmt;
use std::path::PathBuf;
use tokio::sync::mpsc::UnboundedSender;

/// What happened to one derivation during a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated,
    Failed(String),
    SkippedTest,
    SkippedDependency,
    SkippedUpToDate,
}

impl UpdateOutcome {
    /// Skips count as success
    pub fn is_success(&self) -> bool {
        !matches!(self, UpdateOutcome::Failed(_))
    }
}

impl fmt::Display for UpdateOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateOutcome::Updated => write!(f, "updated"),
            UpdateOutcome::Failed(reason) => write!(f, "failed: {}", reason),
            UpdateOutcome::SkippedTest => write!(f, "testing data will not be updated"),
            UpdateOutcome::SkippedDependency => write!(f, "dependency not updated"),
            UpdateOutcome::SkippedUpToDate => write!(f, "already up to date"),
        }
    }
}

/// Progress report sent once per visited derivation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateEvent {
    pub name: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub outcome: UpdateOutcome,
}

/// Drives update runs over a registry
pub struct Updater {
    db: Database,
    registry: Registry,
    resolver: Box<dyn DependencyResolver>,
    calendar: Box<dyn TradingCalendar>,
    watermark_path: PathBuf,
    cutover_hour: u32,
    default_start: NaiveDate,
}

impl Updater {
    pub fn new(db: Database, registry: Registry, config: &UpdaterConfig) -> Self {
        let watermark_path = config.watermark_path(db.config());
        let default_start = db.config().data_start_date;
        Self {
            db,
            registry,
            resolver: Box::new(TopologicalOrder),
            calendar: Box::new(WeekdayCalendar::new()),
            watermark_path,
            cutover_hour: config.cutover_hour,
            default_start,
        }
    }

    /// Builder: replace the dependency resolver
    pub fn resolver(mut self, resolver: impl DependencyResolver + 'static) -> Self {
        self.resolver = Box::new(resolver);
        self
    }

    /// Builder: replace the trading calendar
    pub fn calendar(mut self, calendar: impl TradingCalendar + 'static) -> Self {
        self.calendar = Box::new(calendar);
        self
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Current watermarks as persisted
    pub fn watermarks(&self) -> UpdateResult<Watermarks> {
        Watermarks::load(&self.watermark_path)
    }

    /// Run up to the latest completed trading day as of `now`
    pub async fn update_latest(
        &mut self,
        now: NaiveDateTime,
        progress: Option<&UnboundedSender<UpdateEvent>>,
    ) -> UpdateResult<bool> {
        match resolve_end_date(now, self.cutover_hour, self.calendar.as_ref()) {
            Some(end) => self.update_all(end, progress).await,
            None => {
                tracing::warn!("No trading day found before {}, nothing to update", now);
                Ok(true)
            }
        }
    }

    /// Bring every derivation up to `end`
    ///
    /// Returns `Ok(false)` if any derivation failed. Errors are reserved for
    /// problems that make the whole run meaningless (bad registry, unreadable
    /// or unwritable watermark file).
    pub async fn update_all(
        &mut self,
        end: NaiveDate,
        progress: Option<&UnboundedSender<UpdateEvent>>,
    ) -> UpdateResult<bool> {
        let mut watermarks = Watermarks::load(&self.watermark_path)?;
        let order = self.resolver.order(&self.registry)?;
        tracing::info!("Updating {} datasets up to {}", order.len(), end);

        let mut result = true;
        for name in order {
            let derivation = self
                .registry
                .get(&name)
                .ok_or_else(|| UpdateError::UnknownDerivation(name.clone()))?;
            let start = watermarks.get(&name).unwrap_or(self.default_start);

            let outcome = if derivation.in_test() {
                UpdateOutcome::SkippedTest
            } else if derivation
                .dependencies()
                .iter()
                .any(|dep| watermarks.get(dep) != Some(end))
            {
                UpdateOutcome::SkippedDependency
            } else if start >= end {
                UpdateOutcome::SkippedUpToDate
            } else {
                match derivation.recompute(&self.db, start, end).await {
                    Err(source) => {
                        let err = UpdateError::RecomputeFailure {
                            name: name.clone(),
                            source,
                        };
                        tracing::error!("{}", err);
                        UpdateOutcome::Failed(err.to_string())
                    }
                    Ok(frame) => {
                        match self
                            .db
                            .insert(&frame, derivation.rel_path(), derivation.classification())
                        {
                            Err(source) => {
                                let err = UpdateError::PersistFailure {
                                    name: name.clone(),
                                    source,
                                };
                                tracing::error!("{}", err);
                                UpdateOutcome::Failed(err.to_string())
                            }
                            Ok(()) => {
                                watermarks.set(name.clone(), end);
                                watermarks.save(&self.watermark_path)?;
                                UpdateOutcome::Updated
                            }
                        }
                    }
                }
            };

            tracing::info!(
                name = %name,
                start = %start,
                end = %end,
                result = %outcome,
                "Dataset visited"
            );
            result &= outcome.is_success();

            if let Some(tx) = progress {
                let event = UpdateEvent {
                    name,
                    start,
                    end,
                    outcome,
                };
                if tx.send(event).is_err() {
                    tracing::debug!("Progress receiver dropped");
                }
            }
        }

        tracing::info!("Update run finished, success: {}", result);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::storage::Classification;
    use crate::updater::registry::test_util::Stub;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use tempfile::tempdir;
    use tokio::sync::mpsc;

    fn day(date: &str) -> NaiveDate {
        NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap()
    }

    fn updater(root: &std::path::Path, registry: Registry) -> Updater {
        let config = StoreConfig::new(root.join("db")).data_start_date(day("2018-01-01"));
        let db = Database::open(config).unwrap();
        Updater::new(db, registry, &UpdaterConfig::default())
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<UpdateEvent>) -> Vec<UpdateEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_dependencies_updated_in_order() {
        let dir = tempdir().unwrap();
        let mut registry = Registry::new();
        registry.register(Stub::new("b", &["a"])).unwrap();
        registry.register(Stub::new("a", &[])).unwrap();
        let mut updater = updater(dir.path(), registry);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let end = day("2018-04-27");
        assert!(updater.update_all(end, Some(&tx)).await.unwrap());

        let events = drain(&mut rx);
        let names: Vec<&str> = events.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(events.iter().all(|e| e.outcome == UpdateOutcome::Updated));
        assert_eq!(events[0].start, day("2018-01-01"));

        let marks = updater.watermarks().unwrap();
        assert_eq!(marks.get("a"), Some(end));
        assert_eq!(marks.get("b"), Some(end));

        let stored = updater
            .database()
            .query("b", Classification::char_time_series(), end, None)
            .unwrap();
        assert_eq!(stored.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_insert_skips_dependents() {
        let dir = tempdir().unwrap();
        let mut a = Stub::new("a", &[]);
        a.empty_result = true;
        let b = Stub::new("b", &["a"]);
        let b_calls = Arc::clone(&b.calls);

        let mut registry = Registry::new();
        registry.register(a).unwrap();
        registry.register(b).unwrap();
        let mut updater = updater(dir.path(), registry);

        let (tx, mut rx) = mpsc::unbounded_channel();
        assert!(!updater.update_all(day("2018-04-27"), Some(&tx)).await.unwrap());

        let events = drain(&mut rx);
        assert!(matches!(events[0].outcome, UpdateOutcome::Failed(_)));
        assert_eq!(events[1].outcome, UpdateOutcome::SkippedDependency);
        assert_eq!(b_calls.load(Ordering::SeqCst), 0);
        assert!(updater.watermarks().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_recompute_failure_does_not_stop_run() {
        let dir = tempdir().unwrap();
        let mut a = Stub::new("a", &[]);
        a.fail_recompute = true;

        let mut registry = Registry::new();
        registry.register(a).unwrap();
        registry.register(Stub::new("c", &[])).unwrap();
        let mut updater = updater(dir.path(), registry);

        let end = day("2018-04-27");
        assert!(!updater.update_all(end, None).await.unwrap());

        let marks = updater.watermarks().unwrap();
        assert_eq!(marks.get("a"), None);
        assert_eq!(marks.get("c"), Some(end));
    }

    #[tokio::test]
    async fn test_second_run_is_noop() {
        let dir = tempdir().unwrap();
        let a = Stub::new("a", &[]);
        let calls = Arc::clone(&a.calls);
        let mut registry = Registry::new();
        registry.register(a).unwrap();
        let mut updater = updater(dir.path(), registry);

        let end = day("2018-04-27");
        assert!(updater.update_all(end, None).await.unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let (tx, mut rx) = mpsc::unbounded_channel();
        assert!(updater.update_all(end, Some(&tx)).await.unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(drain(&mut rx)[0].outcome, UpdateOutcome::SkippedUpToDate);
    }

    #[tokio::test]
    async fn test_in_test_derivations_skipped() {
        let dir = tempdir().unwrap();
        let mut a = Stub::new("a", &[]);
        a.in_test = true;
        let calls = Arc::clone(&a.calls);
        let mut registry = Registry::new();
        registry.register(a).unwrap();
        let mut updater = updater(dir.path(), registry);

        assert!(updater.update_all(day("2018-04-27"), None).await.unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(updater.watermarks().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_latest_uses_calendar() {
        let dir = tempdir().unwrap();
        let mut registry = Registry::new();
        registry.register(Stub::new("a", &[])).unwrap();
        let mut updater = updater(dir.path(), registry);

        // Saturday evening resolves to Friday
        let now = day("2018-04-28").and_hms_opt(20, 0, 0).unwrap();
        assert!(updater.update_latest(now, None).await.unwrap());
        assert_eq!(updater.watermarks().unwrap().get("a"), Some(day("2018-04-27")));
    }

    #[tokio::test]
    async fn test_unwritable_watermarks_abort_run() {
        let dir = tempdir().unwrap();
        let config = StoreConfig::new(dir.path().join("db")).data_start_date(day("2018-01-01"));
        let db = Database::open(config).unwrap();
        // parent of the watermark file is a regular file
        std::fs::write(dir.path().join("db").join("blocked"), "").unwrap();
        let updater_config = UpdaterConfig {
            watermark_file: "blocked/update_time.json".to_string(),
            ..UpdaterConfig::default()
        };

        let second = Stub::new("b", &[]);
        let second_calls = Arc::clone(&second.calls);
        let mut registry = Registry::new();
        registry.register(Stub::new("a", &[])).unwrap();
        registry.register(second).unwrap();
        let mut updater = Updater::new(db, registry, &updater_config);

        let end = day("2018-04-27");
        assert!(matches!(
            updater.update_all(end, None).await,
            Err(UpdateError::Watermark(_))
        ));
        assert_eq!(second_calls.load(Ordering::SeqCst), 0);

        // the insert itself went through before the flush failed
        let stored = updater
            .database()
            .query("a", Classification::char_time_series(), end, None)
            .unwrap();
        assert_eq!(stored.len(), 1);
    }

    #[tokio::test]
    async fn test_cycle_aborts_run() {
        let dir = tempdir().unwrap();
        let mut registry = Registry::new();
        registry.register(Stub::new("a", &["b"])).unwrap();
        registry.register(Stub::new("b", &["a"])).unwrap();
        let mut updater = updater(dir.path(), registry);

        assert!(matches!(
            updater.update_all(day("2018-04-27"), None).await,
            Err(UpdateError::DependencyCycle(_))
        ));
    }
}
