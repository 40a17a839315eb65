//! Content-addressed cache with single-flight computation.
//!
//! [`ContentCache`] maps a [`ContentHash`] to an immutable [`CacheEntry`].
//! Concurrent callers asking for the same missing hash share one computation:
//! the first caller runs it while the others block until it commits. A failed
//! or panicking computation commits nothing and wakes the waiters, and one of
//! them runs the computation again. Lookups for different hashes never wait
//! on each other's computations.
//!
//! The cache is unbounded unless created with a maximum entry count, in which
//! case the least recently used entry is evicted on insert.

use std::{
    collections::HashMap,
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::SystemTime,
};

use log::{debug, trace};
use parking_lot::{Condvar, Mutex};

use blue_core::ContentHash;

/// An immutable cached value.
#[derive(Debug)]
pub struct CacheEntry<V> {
    hash: ContentHash,
    value: V,
    timestamp: SystemTime,
}

impl<V> CacheEntry<V> {
    pub fn hash(&self) -> ContentHash {
        self.hash
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    /// When the value was committed.
    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }
}

/// Counters describing cache traffic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered by a committed entry without waiting.
    pub hits: u64,
    /// Lookups that found no committed entry.
    pub misses: u64,
    /// Computations started.
    pub computations: u64,
    /// Entries dropped by the size bound.
    pub evictions: u64,
}

enum Slot<V> {
    Ready {
        entry: Arc<CacheEntry<V>>,
        last_used: u64,
    },
    InFlight,
}

struct State<V> {
    slots: HashMap<ContentHash, Slot<V>>,
    ready: usize,
    clock: u64,
}

impl<V> State<V> {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }
}

/// A content-addressed, single-flight cache.
pub struct ContentCache<V> {
    state: Mutex<State<V>>,
    committed: Condvar,
    max_entries: Option<usize>,
    hits: AtomicU64,
    misses: AtomicU64,
    computations: AtomicU64,
    evictions: AtomicU64,
}

impl<V> Default for ContentCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> fmt::Debug for ContentCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentCache")
            .field("len", &self.len())
            .field("max_entries", &self.max_entries)
            .field("stats", &self.stats())
            .finish()
    }
}

impl<V> ContentCache<V> {
    /// An unbounded cache.
    pub fn new() -> Self {
        Self::with_max_entries(None)
    }

    /// A cache holding at most `max_entries` committed entries when `Some`.
    pub fn with_max_entries(max_entries: Option<usize>) -> Self {
        Self {
            state: Mutex::new(State {
                slots: HashMap::new(),
                ready: 0,
                clock: 0,
            }),
            committed: Condvar::new(),
            max_entries: max_entries.map(|max| max.max(1)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            computations: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn max_entries(&self) -> Option<usize> {
        self.max_entries
    }

    /// Return the entry for `hash`, computing it at most once across all
    /// concurrent callers.
    ///
    /// # Errors
    ///
    /// Returns the computation's error. Nothing is committed in that case,
    /// so a later call computes again.
    ///
    /// # Examples
    ///
    /// ```
    /// use blue::cache::ContentCache;
    /// use blue_core::ContentHash;
    ///
    /// let cache: ContentCache<usize> = ContentCache::new();
    /// let hash = ContentHash::of(b"abc");
    /// let entry = cache.get_or_compute(hash, || Ok::<_, ()>(3)).unwrap();
    /// assert_eq!(*entry.value(), 3);
    /// assert_eq!(cache.stats().computations, 1);
    /// ```
    pub fn get_or_compute<E>(
        &self,
        hash: ContentHash,
        compute: impl FnOnce() -> Result<V, E>,
    ) -> Result<Arc<CacheEntry<V>>, E> {
        let mut counted = false;
        {
            let mut state = self.state.lock();
            loop {
                let now = state.tick();
                match state.slots.get_mut(&hash) {
                    Some(Slot::Ready { entry, last_used }) => {
                        *last_used = now;
                        if !counted {
                            self.hits.fetch_add(1, Ordering::Relaxed);
                        }
                        return Ok(Arc::clone(entry));
                    }
                    Some(Slot::InFlight) => {
                        if !counted {
                            self.misses.fetch_add(1, Ordering::Relaxed);
                            counted = true;
                        }
                        trace!(hash = hash.short(); "Waiting for in-flight computation");
                        self.committed.wait(&mut state);
                    }
                    None => {
                        if !counted {
                            self.misses.fetch_add(1, Ordering::Relaxed);
                        }
                        state.slots.insert(hash, Slot::InFlight);
                        break;
                    }
                }
            }
        }

        let mut guard = InFlight {
            cache: self,
            hash,
            armed: true,
        };
        self.computations.fetch_add(1, Ordering::Relaxed);
        trace!(hash = hash.short(); "Computing cache entry");
        let value = compute()?;

        let entry = Arc::new(CacheEntry {
            hash,
            value,
            timestamp: SystemTime::now(),
        });
        {
            let mut state = self.state.lock();
            let now = state.tick();
            state.slots.insert(
                hash,
                Slot::Ready {
                    entry: Arc::clone(&entry),
                    last_used: now,
                },
            );
            state.ready += 1;
            self.evict(&mut state, hash);
            guard.armed = false;
        }
        self.committed.notify_all();
        Ok(entry)
    }

    /// The committed entry for `hash`, without computing.
    pub fn get(&self, hash: &ContentHash) -> Option<Arc<CacheEntry<V>>> {
        let mut state = self.state.lock();
        let now = state.tick();
        match state.slots.get_mut(hash) {
            Some(Slot::Ready { entry, last_used }) => {
                *last_used = now;
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(Arc::clone(entry))
            }
            _ => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Whether a committed entry exists for `hash`.
    pub fn contains(&self, hash: &ContentHash) -> bool {
        matches!(self.state.lock().slots.get(hash), Some(Slot::Ready { .. }))
    }

    /// Number of committed entries.
    pub fn len(&self) -> usize {
        self.state.lock().ready
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every committed entry. In-flight computations are unaffected and
    /// still commit when they finish.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state
            .slots
            .retain(|_, slot| matches!(slot, Slot::InFlight));
        state.ready = 0;
        debug!("Cleared cache");
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            computations: self.computations.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    fn evict(&self, state: &mut State<V>, keep: ContentHash) {
        let Some(max) = self.max_entries else {
            return;
        };
        while state.ready > max {
            let oldest = state
                .slots
                .iter()
                .filter_map(|(hash, slot)| match slot {
                    Slot::Ready { last_used, .. } if *hash != keep => Some((*last_used, *hash)),
                    _ => None,
                })
                .min();
            let Some((_, hash)) = oldest else {
                return;
            };
            state.slots.remove(&hash);
            state.ready -= 1;
            self.evictions.fetch_add(1, Ordering::Relaxed);
            trace!(hash = hash.short(); "Evicted cache entry");
        }
    }
}

/// Releases the in-flight marker when a computation fails or panics.
struct InFlight<'a, V> {
    cache: &'a ContentCache<V>,
    hash: ContentHash,
    armed: bool,
}

impl<V> Drop for InFlight<'_, V> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        {
            let mut state = self.cache.state.lock();
            if matches!(state.slots.get(&self.hash), Some(Slot::InFlight)) {
                state.slots.remove(&self.hash);
            }
        }
        debug!(hash = self.hash.short(); "Cache computation failed, waking waiters");
        self.cache.committed.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use std::{
        panic::{AssertUnwindSafe, catch_unwind},
        sync::{Barrier, atomic::AtomicUsize},
        thread,
        time::Duration,
    };

    use super::*;

    fn hash(n: u8) -> ContentHash {
        ContentHash::of(&[n])
    }

    #[test]
    fn test_second_lookup_hits() {
        let cache = ContentCache::new();
        let first = cache.get_or_compute(hash(1), || Ok::<_, ()>("one")).unwrap();
        let second = cache
            .get_or_compute(hash(1), || -> Result<&str, ()> { panic!("recomputed") })
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.hash(), hash(1));
        assert_eq!(
            cache.stats(),
            CacheStats {
                hits: 1,
                misses: 1,
                computations: 1,
                evictions: 0
            }
        );
    }

    #[test]
    fn test_single_flight() {
        const THREADS: usize = 8;
        let cache: ContentCache<u32> = ContentCache::new();
        let counter = AtomicUsize::new(0);
        let barrier = Barrier::new(THREADS);

        thread::scope(|scope| {
            for _ in 0..THREADS {
                scope.spawn(|| {
                    barrier.wait();
                    let entry = cache
                        .get_or_compute(hash(7), || {
                            counter.fetch_add(1, Ordering::SeqCst);
                            thread::sleep(Duration::from_millis(50));
                            Ok::<_, ()>(42)
                        })
                        .unwrap();
                    assert_eq!(*entry.value(), 42);
                });
            }
        });

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        let stats = cache.stats();
        assert_eq!(stats.computations, 1);
        assert_eq!(stats.hits + stats.misses, THREADS as u64);
    }

    #[test]
    fn test_failure_commits_nothing() {
        let cache: ContentCache<u32> = ContentCache::new();
        let err = cache.get_or_compute(hash(1), || Err("boom")).unwrap_err();
        assert_eq!(err, "boom");
        assert!(!cache.contains(&hash(1)));
        assert!(cache.is_empty());

        let entry = cache.get_or_compute(hash(1), || Ok::<_, &str>(5)).unwrap();
        assert_eq!(*entry.value(), 5);
        assert_eq!(cache.stats().computations, 2);
    }

    #[test]
    fn test_panic_releases_waiters() {
        let cache: ContentCache<u32> = ContentCache::new();
        let started = Barrier::new(2);

        thread::scope(|scope| {
            scope.spawn(|| {
                let result = catch_unwind(AssertUnwindSafe(|| {
                    cache.get_or_compute(hash(3), || -> Result<u32, ()> {
                        started.wait();
                        thread::sleep(Duration::from_millis(50));
                        panic!("computation panicked")
                    })
                }));
                assert!(result.is_err());
            });

            started.wait();
            let entry = cache.get_or_compute(hash(3), || Ok::<_, ()>(9)).unwrap();
            assert_eq!(*entry.value(), 9);
        });

        assert!(cache.contains(&hash(3)));
    }

    #[test]
    fn test_unrelated_hashes_do_not_wait() {
        let cache: ContentCache<u32> = ContentCache::new();
        let inner = cache
            .get_or_compute(hash(1), || {
                // A nested lookup for another hash runs while the first is in flight.
                let nested = cache.get_or_compute(hash(2), || Ok::<_, ()>(2))?;
                Ok::<_, ()>(*nested.value() + 1)
            })
            .unwrap();
        assert_eq!(*inner.value(), 3);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_lru_eviction() {
        let cache: ContentCache<u8> = ContentCache::with_max_entries(Some(2));
        for n in 1..=2 {
            cache.get_or_compute(hash(n), || Ok::<_, ()>(n)).unwrap();
        }
        // Touch 1 so that 2 is the least recently used.
        assert!(cache.get(&hash(1)).is_some());
        cache.get_or_compute(hash(3), || Ok::<_, ()>(3)).unwrap();

        assert_eq!(cache.len(), 2);
        assert!(cache.contains(&hash(1)));
        assert!(!cache.contains(&hash(2)));
        assert!(cache.contains(&hash(3)));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_clear() {
        let cache: ContentCache<u8> = ContentCache::new();
        cache.get_or_compute(hash(1), || Ok::<_, ()>(1)).unwrap();
        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.get(&hash(1)).is_none());
    }
}
