use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use common::{read_gz_json, write_gz_json, Fingerprint};
use engine::{LeafEvaluator, PositionKey};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use tree::PositionTree;

use super::{CacheOptions, RepertoireOptions, Role, SuperBook};

#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub struct CacheKey {
    pub position: PositionKey,
    pub budget: usize,
    pub role: Role,
    /// Bit pattern of the optimism the book was computed with.
    optimism: u64,
}

impl CacheKey {
    pub fn new(position: PositionKey, budget: usize, role: Role, optimism: f64) -> Self {
        Self {
            position,
            budget,
            role,
            // Adding zero folds -0.0 into 0.0.
            optimism: (optimism + 0.0).to_bits(),
        }
    }

    pub fn optimism(&self) -> f64 {
        f64::from_bits(self.optimism)
    }
}

/// Digest of every input a cached superbook depends on besides its key: the tree with
/// its move probabilities, the evaluator's table and settings, and the options that
/// shape leaf and aggregate books.
pub fn cache_fingerprint<E: LeafEvaluator>(
    options: &RepertoireOptions,
    tree: &PositionTree,
    evaluator: &E,
) -> Result<String> {
    let mut fingerprint = Fingerprint::new();
    fingerprint
        .add(&options.include_placeholders)?
        .add(&options.prep_value)?
        .add(&options.estimate)?;
    tree.fingerprint(&mut fingerprint)?;
    evaluator.fingerprint(&mut fingerprint)?;

    Ok(fingerprint.finish())
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct CacheEntry {
    key: CacheKey,
    book: Arc<SuperBook>,
    observations: u64,
    hits: u64,
    last_seen: u64,
}

impl CacheEntry {
    fn score(&self, now: u64) -> f64 {
        let age = now.saturating_sub(self.last_seen) as f64;
        let frequency = self.hits as f64 / (now as f64 + 1.0);

        self.observations as f64 * (1.0 / (2.0 + age).ln()) * frequency
    }
}

#[derive(Serialize, Deserialize)]
struct CacheFile {
    clock: u64,
    #[serde(default)]
    fingerprint: String,
    entries: Vec<CacheEntry>,
}

/// Finished superbooks keyed by position, budget and role, bounded by the total
/// number of moves the stored books may hold.
///
/// Recency is measured in evaluated leaves. `now` values passed in are offsets
/// from the cache's clock, which advances across runs.
///
/// A persisted cache carries the fingerprint of the inputs its books were computed
/// from and is only reused under the same fingerprint.
#[derive(Debug)]
pub struct SuperBookCache {
    entries: HashMap<CacheKey, CacheEntry>,
    options: CacheOptions,
    clock: u64,
    stored_moves: usize,
    fingerprint: String,
    path: Option<PathBuf>,
}

impl SuperBookCache {
    pub fn new(options: CacheOptions) -> Self {
        Self {
            entries: HashMap::new(),
            options,
            clock: 0,
            stored_moves: 0,
            fingerprint: String::new(),
            path: None,
        }
    }

    /// Opens a cache persisted at `path` for inputs with the given fingerprint. A missing
    /// file starts an empty cache; an unreadable one, or one computed from other inputs,
    /// is reported and replaced on the next save.
    pub fn open(path: &Path, options: CacheOptions, fingerprint: String) -> Self {
        let mut cache = Self::new(options);
        cache.path = Some(path.to_path_buf());
        cache.fingerprint = fingerprint;

        if !path.exists() {
            info!("Starting an empty superbook cache at {:?}", path);
            return cache;
        }

        match read_gz_json::<CacheFile>(path) {
            Ok(file) if file.fingerprint != cache.fingerprint => {
                cache.clock = file.clock;
                warn!(
                    "Discarding {} cached superbooks in {:?}, they were computed from different inputs",
                    file.entries.len(),
                    path
                );
            }
            Ok(file) => {
                cache.clock = file.clock;
                for entry in file.entries {
                    cache.insert(entry);
                }

                info!(
                    "Loaded {} cached superbooks from {:?}",
                    cache.entries.len(),
                    path
                );
            }
            Err(err) => {
                warn!("Ignoring unreadable superbook cache {:?}: {:#}", path, err);
            }
        }

        cache
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of the budgets of every stored book.
    pub fn stored_moves(&self) -> usize {
        self.stored_moves
    }

    pub fn clock(&self) -> u64 {
        self.clock
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Re-labels the stored books after the inputs grew during a run. Only valid when
    /// no input a stored book was computed from has changed, such as when the
    /// evaluator only learned positions it had not evaluated before.
    pub fn set_fingerprint(&mut self, fingerprint: String) {
        self.fingerprint = fingerprint;
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Whether a position observed this often is worth caching at all.
    pub fn is_cacheable(&self, observations: u64) -> bool {
        observations > self.options.threshold
    }

    pub fn get(&mut self, key: &CacheKey, now: u64) -> Option<Arc<SuperBook>> {
        let now = self.clock + now;
        let entry = self.entries.get_mut(key)?;
        entry.hits += 1;
        entry.last_seen = now;

        Some(entry.book.clone())
    }

    /// Stores a book, replacing any previous one for the key. Returns the number of
    /// entries evicted as a result.
    pub fn put(&mut self, key: CacheKey, book: Arc<SuperBook>, observations: u64, now: u64) -> usize {
        if !self.is_cacheable(observations) {
            return 0;
        }

        let now = self.clock + now;
        match self.entries.get_mut(&key) {
            Some(entry) => {
                entry.book = book;
                entry.observations = observations;
                entry.hits += 1;
                entry.last_seen = now;
            }
            None => self.insert(CacheEntry {
                key,
                book,
                observations,
                hits: 1,
                last_seen: now,
            }),
        }

        if self.stored_moves > self.options.max_cached_moves {
            self.evict(now)
        } else {
            0
        }
    }

    /// Ends a run that evaluated `leaves` leaves.
    pub fn advance_clock(&mut self, leaves: u64) {
        self.clock += leaves;
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.stored_moves = 0;
    }

    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let mut entries = self.entries.values().cloned().collect::<Vec<_>>();
        entries.sort_by(|a, b| a.key.cmp(&b.key));

        write_gz_json(
            path,
            &CacheFile {
                clock: self.clock,
                fingerprint: self.fingerprint.clone(),
                entries,
            },
        )?;

        info!("Saved {} cached superbooks to {:?}", self.entries.len(), path);

        Ok(())
    }

    fn insert(&mut self, entry: CacheEntry) {
        self.stored_moves += entry.key.budget;
        if let Some(previous) = self.entries.insert(entry.key.clone(), entry) {
            self.stored_moves -= previous.key.budget;
        }
    }

    /// Drops the lowest scoring share of entries, always at least one.
    fn evict(&mut self, now: u64) -> usize {
        let mut scored = self
            .entries
            .values()
            .map(|e| (e.score(now), e.key.clone()))
            .collect::<Vec<_>>();
        scored.sort_by(|(a, a_key), (b, b_key)| {
            b.partial_cmp(a)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a_key.cmp(b_key))
        });

        let count = scored.len();
        let keep = (((1.0 - self.options.eviction_fraction) * count as f64).round() as usize)
            .min(count.saturating_sub(1));

        for (_, key) in scored.drain(keep..) {
            if let Some(entry) = self.entries.remove(&key) {
                self.stored_moves -= entry.key.budget;
            }
        }

        let evicted = count - keep;
        info!(
            "Evicted {} cached superbooks, {} remain holding {} moves",
            evicted,
            self.entries.len(),
            self.stored_moves
        );

        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn key(name: &str, budget: usize) -> CacheKey {
        CacheKey::new(
            PositionKey::normalize(&format!("{} w - - 0 1", name)),
            budget,
            Role::Mover,
            0.0,
        )
    }

    fn book(value: f64) -> Arc<SuperBook> {
        Arc::new(SuperBook::new(value))
    }

    fn options(max_cached_moves: usize) -> CacheOptions {
        CacheOptions {
            threshold: 20,
            max_cached_moves,
            eviction_fraction: 0.1,
        }
    }

    #[test]
    fn test_threshold_must_be_exceeded() {
        let mut cache = SuperBookCache::new(options(1000));

        cache.put(key("a", 10), book(0.5), 20, 0);
        assert!(cache.is_empty());

        cache.put(key("a", 10), book(0.5), 21, 0);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stored_moves(), 10);
    }

    #[test]
    fn test_put_replaces() {
        let mut cache = SuperBookCache::new(options(1000));

        cache.put(key("a", 10), book(0.5), 21, 0);
        cache.put(key("a", 10), book(0.6), 21, 1);

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stored_moves(), 10);
        assert_approx_eq!(cache.get(&key("a", 10), 2).unwrap().starting_value(), 0.6);
    }

    #[test]
    fn test_keys_differ_by_budget_role_and_optimism() {
        let mut cache = SuperBookCache::new(options(1000));
        cache.put(key("a", 10), book(0.5), 21, 0);

        let position = key("a", 10).position;
        assert!(cache.get(&key("a", 11), 0).is_none());
        assert!(cache
            .get(&CacheKey::new(position.clone(), 10, Role::Opponent, 0.0), 0)
            .is_none());
        assert!(cache
            .get(&CacheKey::new(position.clone(), 10, Role::Mover, 0.5), 0)
            .is_none());
        assert!(cache
            .get(&CacheKey::new(position, 10, Role::Mover, -0.0), 0)
            .is_some());
    }

    #[test]
    fn test_evicts_lowest_combined_scores_past_ceiling() {
        let mut cache = SuperBookCache::new(options(200));

        // Common but untouched since the start of the run.
        cache.put(key("popular_stale", 10), book(0.5), 150, 0);
        cache.put(key("rare_stale", 10), book(0.5), 40, 0);
        // Rare, but seen just before the ceiling is crossed.
        cache.put(key("rare_recent", 10), book(0.5), 40, 999);
        // Rare and old, but hit repeatedly.
        cache.put(key("rare_hit", 10), book(0.5), 40, 0);
        for _ in 0..4 {
            assert!(cache.get(&key("rare_hit", 10), 0).is_some());
        }
        for i in 0..16 {
            cache.put(key(&format!("p{:02}", i), 10), book(0.5), 100, 990);
        }
        assert_eq!(cache.len(), 20);
        assert_eq!(cache.stored_moves(), 200);

        let evicted = cache.put(key("last", 10), book(0.5), 100, 1000);

        assert_eq!(evicted, 2);
        assert_eq!(cache.len(), 19);
        assert_eq!(cache.stored_moves(), 190);
        assert!(!cache.contains(&key("rare_stale", 10)));
        assert!(!cache.contains(&key("popular_stale", 10)));
        assert!(cache.contains(&key("rare_recent", 10)));
        assert!(cache.contains(&key("rare_hit", 10)));
        assert!(cache.contains(&key("p00", 10)));
        assert!(cache.contains(&key("last", 10)));
    }

    #[test]
    fn test_stale_entries_score_lower() {
        let stale = CacheEntry {
            key: key("a", 10),
            book: book(0.5),
            observations: 100,
            hits: 1,
            last_seen: 0,
        };
        let fresh = CacheEntry {
            last_seen: 900,
            ..stale.clone()
        };

        assert!(fresh.score(1000) > stale.score(1000));
    }

    #[test]
    fn test_save_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("superbooks.json.gz");

        let mut cache = SuperBookCache::open(&path, options(1000), "inputs".to_string());
        assert!(cache.is_empty());
        cache.put(key("a", 10), book(0.5), 21, 3);
        cache.advance_clock(7);
        cache.save().unwrap();

        let mut reopened = SuperBookCache::open(&path, options(1000), "inputs".to_string());
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.clock(), 7);
        assert_eq!(reopened.stored_moves(), 10);
        assert_eq!(reopened.get(&key("a", 10), 0), Some(book(0.5)));
    }

    #[test]
    fn test_other_inputs_start_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("superbooks.json.gz");

        let mut cache = SuperBookCache::open(&path, options(1000), "before".to_string());
        cache.put(key("a", 10), book(0.5), 21, 0);
        cache.advance_clock(5);
        cache.save().unwrap();

        let changed = SuperBookCache::open(&path, options(1000), "after".to_string());
        assert!(changed.is_empty());
        assert_eq!(changed.stored_moves(), 0);
        assert_eq!(changed.clock(), 5);

        cache.set_fingerprint("after".to_string());
        cache.save().unwrap();

        let relabelled = SuperBookCache::open(&path, options(1000), "after".to_string());
        assert_eq!(relabelled.len(), 1);
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("superbooks.json.gz");
        std::fs::write(&path, b"not a cache").unwrap();

        let cache = SuperBookCache::open(&path, options(1000), String::new());

        assert!(cache.is_empty());
    }
}
