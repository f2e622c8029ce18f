//! Single-flight LRU cache for tile results.
//!
//! Every tile request, including the sub-tile requests issued while
//! synthesizing a missing level, goes through [`TileCache::get_or_compute`].
//! Concurrent requests for one key share a single computation: the first
//! caller (the leader) runs it while later callers wait for its outcome.
//!
//! # Cache Key
//!
//! Tiles are cached by a composite key including:
//! - Source identifier (unique per opened file)
//! - Zoom level
//! - Tile X coordinate
//! - Tile Y coordinate
//! - Output options (format, quality, edge fill)
//!
//! # Eviction
//!
//! Strict LRU, bounded by an entry count and by the total
//! [`TileResult::byte_size`] of stored results. Failures are never stored.
//!
//! # Locking
//!
//! The index is a synchronous mutex that is never held across an `.await`,
//! so a computation may itself call `get_or_compute` for other keys.

use std::collections::HashMap;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Notify;
use tracing::debug;

use crate::error::TileSourceError;

use super::request::TileOptions;
use super::result::TileResult;

/// Default cache capacity: 100MB
pub const DEFAULT_TILE_CACHE_CAPACITY: usize = 100 * 1024 * 1024;

/// Default maximum number of entries (to bound LRU overhead)
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

type Outcome = Result<TileResult, TileSourceError>;

// =============================================================================
// Cache Key
// =============================================================================

static NEXT_SOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of an opened tile source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(u64);

impl SourceId {
    /// Allocate an id no other source in this process holds.
    pub fn allocate() -> Self {
        Self(NEXT_SOURCE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

/// Cache key for tile results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileKey {
    pub source: SourceId,
    pub level: u32,
    pub x: u32,
    pub y: u32,
    pub options: TileOptions,
}

impl TileKey {
    pub fn new(source: SourceId, level: u32, x: u32, y: u32, options: TileOptions) -> Self {
        Self {
            source,
            level,
            x,
            y,
            options,
        }
    }
}

// =============================================================================
// In-flight state
// =============================================================================

enum FlightOutcome {
    Pending,
    Done(Outcome),
    /// The leader was dropped before finishing
    Abandoned,
}

/// State for one in-flight computation.
struct InFlight {
    notify: Notify,
    outcome: Mutex<FlightOutcome>,
}

impl InFlight {
    fn new() -> Self {
        Self {
            notify: Notify::new(),
            outcome: Mutex::new(FlightOutcome::Pending),
        }
    }

    /// Wait for the leader. `None` means it was abandoned.
    async fn wait(&self) -> Option<Outcome> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking, so a completion in between is not missed
            notified.as_mut().enable();

            {
                let state = self.outcome.lock();
                match &*state {
                    FlightOutcome::Pending => {}
                    FlightOutcome::Done(outcome) => return Some(outcome.clone()),
                    FlightOutcome::Abandoned => return None,
                }
            }

            notified.await;
        }
    }
}

/// Clears the leader's in-flight marker however its computation ends.
struct FlightGuard<'a> {
    cache: &'a TileCache,
    key: TileKey,
    flight: Arc<InFlight>,
    finished: bool,
}

impl FlightGuard<'_> {
    fn finish(mut self, outcome: &Outcome) {
        self.finished = true;
        {
            let mut state = self.cache.state.lock();
            if let Ok(result) = outcome {
                self.cache.insert_locked(&mut state, self.key, result.clone());
            }
            state.remove_flight(&self.key, &self.flight);
        }
        *self.flight.outcome.lock() = FlightOutcome::Done(outcome.clone());
        self.flight.notify.notify_waiters();
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        debug!(
            level = self.key.level,
            x = self.key.x,
            y = self.key.y,
            "Tile computation abandoned"
        );
        self.cache.state.lock().remove_flight(&self.key, &self.flight);
        *self.flight.outcome.lock() = FlightOutcome::Abandoned;
        self.flight.notify.notify_waiters();
    }
}

// =============================================================================
// Tile Cache
// =============================================================================

/// Counters describing cache effectiveness.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub size: usize,
    pub capacity: usize,
    /// Requests answered from a stored result
    pub hits: u64,
    /// Requests that ran a computation
    pub misses: u64,
    /// Requests that waited on another request's computation
    pub coalesced: u64,
}

struct CacheState {
    entries: LruCache<TileKey, TileResult>,
    current_size: usize,
    in_flight: HashMap<TileKey, Arc<InFlight>>,
}

impl CacheState {
    fn remove_flight(&mut self, key: &TileKey, flight: &Arc<InFlight>) {
        if self
            .in_flight
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, flight))
        {
            self.in_flight.remove(key);
        }
    }
}

/// LRU cache of tile results with single-flight computation.
///
/// # Thread Safety
///
/// The cache is thread-safe and is shared between sources via `Arc`.
pub struct TileCache {
    state: Mutex<CacheState>,

    /// Maximum total size in bytes
    max_size: usize,

    hits: AtomicU64,
    misses: AtomicU64,
    coalesced: AtomicU64,
}

impl TileCache {
    /// Create a new tile cache with default capacity (100MB).
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_TILE_CACHE_CAPACITY)
    }

    /// Create a new tile cache with the specified capacity in bytes.
    pub fn with_capacity(max_size: usize) -> Self {
        Self::with_capacity_and_entries(max_size, DEFAULT_MAX_ENTRIES)
    }

    /// Create a new tile cache with specified capacity and maximum entries.
    ///
    /// A zero entry count is treated as one.
    pub fn with_capacity_and_entries(max_size: usize, max_entries: usize) -> Self {
        let max_entries = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            state: Mutex::new(CacheState {
                entries: LruCache::new(max_entries),
                current_size: 0,
                in_flight: HashMap::new(),
            }),
            max_size,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            coalesced: AtomicU64::new(0),
        }
    }

    /// Return the stored result for `key`, or compute it.
    ///
    /// At most one computation per key runs at a time; concurrent callers
    /// receive the leader's outcome, error or not. Successful results are
    /// stored; errors are not. If the leader is dropped mid-computation, one
    /// waiter takes over.
    pub async fn get_or_compute<F, Fut>(&self, key: TileKey, compute: F) -> Outcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Outcome>,
    {
        let flight = loop {
            let waiting = {
                let mut state = self.state.lock();
                if let Some(result) = state.entries.get(&key) {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(result.clone());
                }
                match state.in_flight.get(&key) {
                    Some(flight) => Arc::clone(flight),
                    None => {
                        let flight = Arc::new(InFlight::new());
                        state.in_flight.insert(key, Arc::clone(&flight));
                        break flight;
                    }
                }
            };

            self.coalesced.fetch_add(1, Ordering::Relaxed);
            if let Some(outcome) = waiting.wait().await {
                return outcome;
            }
        };

        self.misses.fetch_add(1, Ordering::Relaxed);
        let guard = FlightGuard {
            cache: self,
            key,
            flight,
            finished: false,
        };
        let outcome = compute().await;
        guard.finish(&outcome);
        outcome
    }

    /// Get a stored result, marking it recently used.
    pub fn get(&self, key: &TileKey) -> Option<TileResult> {
        let result = self.state.lock().entries.get(key).cloned();
        if result.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    /// Check if a result is stored without updating LRU order.
    pub fn contains(&self, key: &TileKey) -> bool {
        self.state.lock().entries.contains(key)
    }

    fn insert_locked(&self, state: &mut CacheState, key: TileKey, result: TileResult) {
        let size = result.byte_size();
        if size > self.max_size {
            debug!(size, capacity = self.max_size, "Tile larger than cache; not stored");
            return;
        }

        // `push` hands back either the replaced value or the evicted LRU entry
        if let Some((_, displaced)) = state.entries.push(key, result) {
            state.current_size = state.current_size.saturating_sub(displaced.byte_size());
        }
        state.current_size += size;

        while state.current_size > self.max_size {
            match state.entries.pop_lru() {
                Some((_, evicted)) => {
                    state.current_size = state.current_size.saturating_sub(evicted.byte_size());
                }
                None => break,
            }
        }
    }

    /// Remove every stored result belonging to `source`.
    ///
    /// Returns the number of entries removed.
    pub fn invalidate_source(&self, source: SourceId) -> usize {
        let mut state = self.state.lock();
        let keys: Vec<TileKey> = state
            .entries
            .iter()
            .filter(|(key, _)| key.source == source)
            .map(|(key, _)| *key)
            .collect();

        for key in &keys {
            if let Some(result) = state.entries.pop(key) {
                state.current_size = state.current_size.saturating_sub(result.byte_size());
            }
        }
        keys.len()
    }

    /// Clear all stored results. In-flight computations are unaffected.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.current_size = 0;
    }

    /// Get the current number of stored results.
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the current total size of stored results in bytes.
    pub fn size(&self) -> usize {
        self.state.lock().current_size
    }

    /// Get the maximum capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.max_size
    }

    pub fn stats(&self) -> CacheStats {
        let (entries, size) = {
            let state = self.state.lock();
            (state.entries.len(), state.current_size)
        };
        CacheStats {
            entries,
            size,
            capacity: self.max_size,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
        }
    }
}

impl Default for TileCache {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
