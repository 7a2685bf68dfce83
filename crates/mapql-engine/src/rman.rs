//! The resource manager: named-set environment, cost budget, and the
//! per-query clock.

use std::time::{Duration, Instant};

use indexmap::IndexMap;
use log::debug;
use mapql_parser::stmt::{Bbox, Print, Script};

use crate::diagnostics::RuntimeError;
use crate::model::Area;
use crate::set::NamedSet;
use crate::storage::Storage;

/// Default wall-clock budget when the script header names none.
const DEFAULT_TIMEOUT_SECS: u64 = 180;

/// Engine-level configuration that is not part of any one script.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    /// Apply the script's global bbox to every query, not only to
    /// clauseless ones.
    pub implicit_global_bbox: bool,
}

/// Collects the areas built during an area-derivation run. Only the
/// writable area-build path gets one; regular queries never mutate
/// storage.
#[derive(Debug, Default)]
pub struct AreaUpdater {
    pending: Vec<Area>,
}

impl AreaUpdater {
    pub fn push(&mut self, area: Area) {
        self.pending.push(area);
    }

    pub fn pending(&self) -> &[Area] {
        &self.pending
    }

    pub(crate) fn take(&mut self) -> Vec<Area> {
        let mut areas = std::mem::take(&mut self.pending);
        areas.sort_by_key(|a| a.id);
        areas.dedup_by_key(|a| a.id);
        areas
    }
}

/// Owns everything one query evaluation may spend: the environment, the
/// storage handle, and the cost budget. Every evaluator goes through
/// [`ResourceManager::account`], which enforces the element limit and
/// polls the deadline.
pub struct ResourceManager<'a, S: Storage> {
    storage: &'a S,
    environment: IndexMap<String, NamedSet>,
    timeout: Duration,
    timeout_secs: u64,
    element_limit: Option<u64>,
    started: Instant,
    touched: u64,
    global_bbox: Option<Bbox>,
    diff_window: Option<(String, String)>,
    derived_serial: u64,
    settings: Settings,
    area_updater: Option<AreaUpdater>,
    print_log: Option<Vec<(Print, NamedSet)>>,
}

impl<'a, S: Storage> ResourceManager<'a, S> {
    pub fn new(storage: &'a S, script: &Script, settings: Settings) -> Self {
        let timeout_secs = script.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS);
        let diff_window = script.from.clone().map(|from| {
            let until = script
                .date
                .clone()
                .unwrap_or_else(|| storage.timestamp().to_string());
            (from, until)
        });
        Self {
            storage,
            environment: IndexMap::new(),
            timeout: Duration::from_secs(timeout_secs),
            timeout_secs,
            element_limit: script.element_limit,
            started: Instant::now(),
            touched: 0,
            global_bbox: script.bbox,
            diff_window,
            derived_serial: 0,
            settings,
            area_updater: None,
            print_log: None,
        }
    }

    /// Switches print statements into recording mode: instead of
    /// serializing, each `print` logs its options and set. The diff
    /// runner uses this to capture both evaluations before marking.
    pub(crate) fn record_prints(mut self) -> Self {
        self.print_log = Some(Vec::new());
        self
    }

    /// Logs one print when recording; returns whether it was captured.
    pub(crate) fn log_print(&mut self, print: &Print, set: &NamedSet) -> bool {
        match &mut self.print_log {
            Some(log) => {
                log.push((print.clone(), set.clone()));
                true
            }
            None => false,
        }
    }

    pub(crate) fn take_print_log(&mut self) -> Vec<(Print, NamedSet)> {
        self.print_log.take().unwrap_or_default()
    }

    /// Switches this manager into area-build mode; only then does
    /// [`ResourceManager::area_updater`] hand out the writable path.
    pub fn area_build(mut self) -> Self {
        self.area_updater = Some(AreaUpdater::default());
        self
    }

    /// The area write path, present only in area-build mode.
    pub fn area_updater(&mut self) -> Option<&mut AreaUpdater> {
        self.area_updater.as_mut()
    }

    pub fn storage(&self) -> &'a S {
        self.storage
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn global_bbox(&self) -> Option<Bbox> {
        self.global_bbox
    }

    /// The `[diff:]` window, when the script runs against a temporal
    /// difference.
    pub fn diff_window(&self) -> Option<&(String, String)> {
        self.diff_window.as_ref()
    }

    /// Borrow a named set; absent names read as empty.
    pub fn set_ref(&self, name: &str) -> Option<&NamedSet> {
        self.environment.get(name)
    }

    /// Clone a named set for iteration while the environment mutates.
    pub fn set_clone(&self, name: &str) -> NamedSet {
        self.environment.get(name).cloned().unwrap_or_default()
    }

    /// Replaces a named set, returning the previous value.
    pub fn swap_set(&mut self, name: &str, set: NamedSet) -> NamedSet {
        self.environment
            .insert(name.to_string(), set)
            .unwrap_or_default()
    }

    /// Unions `set` into the named set.
    pub fn union_into(&mut self, name: &str, set: &NamedSet) {
        self.environment
            .entry(name.to_string())
            .or_default()
            .union_with(set);
    }

    /// Fresh id for a derived element.
    pub fn next_derived_id(&mut self) -> u64 {
        self.derived_serial += 1;
        self.derived_serial
    }

    /// Charges `cost` touched elements against the budget and polls the
    /// deadline.
    pub fn account(&mut self, cost: u64) -> Result<(), RuntimeError> {
        self.touched += cost;
        if let Some(limit) = self.element_limit {
            if self.touched > limit {
                return Err(RuntimeError::ElementLimit(limit));
            }
        }
        if self.started.elapsed() > self.timeout {
            return Err(RuntimeError::Timeout(self.timeout_secs));
        }
        Ok(())
    }

    /// Runs one statement body under a stopwatch, logged at debug level.
    pub fn timed<T>(
        &mut self,
        name: &str,
        body: impl FnOnce(&mut Self) -> Result<T, RuntimeError>,
    ) -> Result<T, RuntimeError> {
        let started = Instant::now();
        let result = body(self);
        debug!(
            "stopwatch {name} {:.3}",
            started.elapsed().as_secs_f64()
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemStorageBuilder;

    #[test]
    fn account_enforces_the_element_limit() {
        let storage = MemStorageBuilder::new().finish();
        let script = Script {
            element_limit: Some(10),
            ..Script::default()
        };
        let mut rman = ResourceManager::new(&storage, &script, Settings::default());
        assert!(rman.account(10).is_ok());
        assert_eq!(
            rman.account(1),
            Err(RuntimeError::ElementLimit(10))
        );
    }

    #[test]
    fn account_polls_the_deadline() {
        let storage = MemStorageBuilder::new().finish();
        let script = Script {
            timeout: Some(0),
            ..Script::default()
        };
        let mut rman = ResourceManager::new(&storage, &script, Settings::default());
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(rman.account(1), Err(RuntimeError::Timeout(0)));
    }

    #[test]
    fn swap_set_returns_the_previous_value() {
        let storage = MemStorageBuilder::new().finish();
        let mut rman =
            ResourceManager::new(&storage, &Script::default(), Settings::default());
        let old = rman.swap_set("a", NamedSet::new());
        assert!(old.is_empty());
    }
}
