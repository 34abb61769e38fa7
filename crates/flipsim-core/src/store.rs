//! Versioned result store.
//!
//! Results are keyed by a [`ResultLabel`] whose display string is
//! `"{wager} - {flips} flips - {sims} sims"`. Repeating the same
//! `(flips, sims, wager)` triple appends ` v2`, ` v3`, ... so a label is never
//! reused or overwritten. Counters reset only through [`ResultStore::reset`].

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::stats::StatisticsRecord;

/// Parameters that share one version counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RunKey {
    pub flips: usize,
    pub simulations: usize,
    pub wager: i64,
}

/// Identity of a stored result.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResultLabel {
    pub key: RunKey,
    /// 1 for the first result of a key.
    pub version: u32,
    pub partial: bool,
}

impl fmt::Display for ResultLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {} flips - {} sims",
            self.key.wager, self.key.flips, self.key.simulations
        )?;
        if self.version > 1 {
            write!(f, " v{}", self.version)?;
        }
        if self.partial {
            write!(f, " (partial)")?;
        }
        Ok(())
    }
}

/// One labelled entry.
#[derive(Debug, Clone)]
pub struct StoredResult {
    pub label: ResultLabel,
    pub record: Arc<StatisticsRecord>,
}

impl StoredResult {
    pub fn name(&self) -> String {
        self.label.to_string()
    }
}

#[derive(Debug, Default)]
struct StoreInner {
    entries: Vec<StoredResult>,
    by_label: HashMap<String, usize>,
    versions: HashMap<RunKey, u32>,
    generation: u64,
}

impl StoreInner {
    fn insert(&mut self, key: RunKey, record: StatisticsRecord) -> StoredResult {
        let version = self.versions.entry(key).or_insert(0);
        *version += 1;
        let label = ResultLabel {
            key,
            version: *version,
            partial: record.partial,
        };
        let stored = StoredResult {
            label,
            record: Arc::new(record),
        };
        self.by_label.insert(stored.name(), self.entries.len());
        self.entries.push(stored.clone());
        stored
    }
}

/// Insertion-ordered map from result label to statistics record.
///
/// Shared between the run thread and query callers behind an `Arc`.
#[derive(Debug, Default)]
pub struct ResultStore {
    inner: Mutex<StoreInner>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store one record under the next version of its key.
    pub fn put(
        &self,
        flips: usize,
        simulations: usize,
        wager: i64,
        record: StatisticsRecord,
    ) -> StoredResult {
        let key = RunKey {
            flips,
            simulations,
            wager,
        };
        self.lock().insert(key, record)
    }

    /// Current generation; bumped by every [`reset`](Self::reset).
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Store every record of one run under a single lock.
    ///
    /// Concurrent readers see either none or all of the run's labels. Records
    /// are inserted in the given order, so duplicate wagers get consecutive
    /// versions. Returns `None` without storing anything when the store was
    /// reset after `generation` was read.
    pub fn put_run(
        &self,
        generation: u64,
        flips: usize,
        simulations: usize,
        records: Vec<(i64, StatisticsRecord)>,
    ) -> Option<Vec<StoredResult>> {
        let mut inner = self.lock();
        if inner.generation != generation {
            return None;
        }
        let stored = records
            .into_iter()
            .map(|(wager, record)| {
                let key = RunKey {
                    flips,
                    simulations,
                    wager,
                };
                inner.insert(key, record)
            })
            .collect();
        Some(stored)
    }

    pub fn get(&self, label: &str) -> Option<Arc<StatisticsRecord>> {
        let inner = self.lock();
        inner
            .by_label
            .get(label)
            .map(|&i| Arc::clone(&inner.entries[i].record))
    }

    /// Display labels in insertion order.
    pub fn labels(&self) -> Vec<String> {
        self.lock().entries.iter().map(StoredResult::name).collect()
    }

    pub fn entries(&self) -> Vec<StoredResult> {
        self.lock().entries.clone()
    }

    /// Most recently inserted entry: the default selection for queries.
    pub fn latest(&self) -> Option<StoredResult> {
        self.lock().entries.last().cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Drop all entries and version counters, and start a new generation.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.generation += 1;
        inner.entries.clear();
        inner.by_label.clear();
        inner.versions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(value: f64) -> StatisticsRecord {
        StatisticsRecord {
            mean: value,
            min: value,
            max: value,
            lowest_5pct: value,
            q1: value,
            median: value,
            q3: value,
            mean_ci: crate::stats::ConfidenceInterval {
                lower: value,
                upper: value,
            },
            median_ci: crate::stats::ConfidenceInterval {
                lower: value,
                upper: value,
            },
            simulations: 1,
            partial: false,
            data: vec![value],
        }
    }

    // -----------------------------------------------------------------------
    // Labels
    // -----------------------------------------------------------------------

    #[test]
    fn test_versioned_labels() {
        let store = ResultStore::new();
        for v in 0..3 {
            store.put(10, 100, 1, record(v as f64));
        }
        assert_eq!(
            store.labels(),
            vec![
                "1 - 10 flips - 100 sims",
                "1 - 10 flips - 100 sims v2",
                "1 - 10 flips - 100 sims v3",
            ]
        );
        assert_eq!(store.get("1 - 10 flips - 100 sims v2").unwrap().mean, 1.0);
    }

    #[test]
    fn test_counters_are_per_key() {
        let store = ResultStore::new();
        store.put(10, 100, 1, record(0.0));
        store.put(10, 100, 2, record(0.0));
        store.put(20, 100, 1, record(0.0));
        store.put(10, 100, 1, record(0.0));
        assert_eq!(
            store.labels(),
            vec![
                "1 - 10 flips - 100 sims",
                "2 - 10 flips - 100 sims",
                "1 - 20 flips - 100 sims",
                "1 - 10 flips - 100 sims v2",
            ]
        );
    }

    #[test]
    fn test_negative_wager_label() {
        let store = ResultStore::new();
        let stored = store.put(5, 7, -3, record(0.0));
        assert_eq!(stored.name(), "-3 - 5 flips - 7 sims");
    }

    #[test]
    fn test_partial_label_suffix() {
        let store = ResultStore::new();
        store.put(10, 100, 1, record(0.0));
        let mut partial = record(0.0);
        partial.partial = true;
        let stored = store.put(10, 100, 1, partial);
        assert_eq!(stored.name(), "1 - 10 flips - 100 sims v2 (partial)");
        assert!(store.get("1 - 10 flips - 100 sims v2 (partial)").is_some());
        assert!(store.get("1 - 10 flips - 100 sims v2").is_none());
    }

    // -----------------------------------------------------------------------
    // Store operations
    // -----------------------------------------------------------------------

    #[test]
    fn test_put_run_duplicate_wagers() {
        let store = ResultStore::new();
        let stored = store
            .put_run(
                store.generation(),
                100,
                200,
                vec![(1, record(1.0)), (1, record(2.0)), (2, record(3.0))],
            )
            .unwrap();
        let names: Vec<String> = stored.iter().map(StoredResult::name).collect();
        assert_eq!(
            names,
            vec![
                "1 - 100 flips - 200 sims",
                "1 - 100 flips - 200 sims v2",
                "2 - 100 flips - 200 sims",
            ]
        );
        assert_eq!(store.len(), 3);
        assert_eq!(store.latest().unwrap().name(), "2 - 100 flips - 200 sims");
    }

    #[test]
    fn test_get_missing_label() {
        let store = ResultStore::new();
        assert!(store.get("nope").is_none());
        assert!(store.latest().is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_reset_clears_counters() {
        let store = ResultStore::new();
        store.put(10, 100, 1, record(0.0));
        store.put(10, 100, 1, record(0.0));
        store.reset();
        assert!(store.is_empty());
        let stored = store.put(10, 100, 1, record(0.0));
        assert_eq!(stored.name(), "1 - 10 flips - 100 sims");
    }

    #[test]
    fn test_put_run_after_reset_is_dropped() {
        let store = ResultStore::new();
        let before = store.generation();
        store.put(10, 100, 1, record(0.0));
        store.reset();
        assert_ne!(store.generation(), before);

        assert!(store.put_run(before, 10, 100, vec![(1, record(1.0))]).is_none());
        assert!(store.is_empty());

        let current = store.generation();
        let stored = store
            .put_run(current, 10, 100, vec![(1, record(1.0))])
            .unwrap();
        assert_eq!(stored[0].name(), "1 - 10 flips - 100 sims");
    }

    #[test]
    fn test_concurrent_puts_get_distinct_versions() {
        let store = Arc::new(ResultStore::new());
        std::thread::scope(|s| {
            for _ in 0..8 {
                let store = Arc::clone(&store);
                s.spawn(move || {
                    store.put(10, 100, 1, record(0.0));
                });
            }
        });
        let mut labels = store.labels();
        labels.sort();
        labels.dedup();
        assert_eq!(labels.len(), 8);
    }
}
