//! Engine-level cache of decoded images.
//!
//! Decoding is the most expensive step of a request, and the same source is
//! often requested at several sizes in a row. This cache lets the engine hand
//! back an already-decoded buffer instead of decoding again.
//!
//! # Design
//!
//! The cache is **content-addressed**: keys are the SHA-256 of the encoded
//! input bytes plus the format and shrink-on-load factor, so two requests for
//! the same bytes hit regardless of where the bytes came from.
//!
//! Values are shared (`Arc`). A request that got a cached buffer must call
//! the engine's `copy_memory` before mutating it; the engine's own transforms
//! always allocate fresh buffers, so the cached copy is never written.
//!
//! ## Budgets
//!
//! Two limits bound the cache: total decoded bytes and number of entries.
//! When either would be exceeded by an insert, the oldest entries are evicted
//! first. A single value larger than the whole memory budget is not cached.
//!
//! The cache is safe for concurrent use; all state sits behind one mutex and
//! no lock is held while decoding.

use crate::options::ImageFormat;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace};

/// SHA-256 key for an encoded input at a given decode shrink.
pub fn cache_key(data: &[u8], format: ImageFormat, shrink: u32) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.update(b"\0");
    hasher.update(format.to_string().as_bytes());
    hasher.update(shrink.to_le_bytes());
    format!("{:x}", hasher.finalize())
}

/// Summary of cache behaviour since startup.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheStats {
    pub fn total(&self) -> u64 {
        self.hits + self.misses
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.evictions > 0 {
            write!(
                f,
                "{} hits, {} misses, {} evicted ({} lookups)",
                self.hits,
                self.misses,
                self.evictions,
                self.total()
            )
        } else {
            write!(
                f,
                "{} hits, {} misses ({} lookups)",
                self.hits,
                self.misses,
                self.total()
            )
        }
    }
}

struct Entry<V> {
    value: Arc<V>,
    size: usize,
}

struct CacheState<V> {
    entries: HashMap<String, Entry<V>>,
    /// Insertion order, oldest first.
    order: VecDeque<String>,
    mem: usize,
    stats: CacheStats,
}

/// Bounded, shared cache of decoded values.
pub struct DecodeCache<V> {
    max_mem: usize,
    max_entries: usize,
    state: Mutex<CacheState<V>>,
}

impl<V> DecodeCache<V> {
    pub fn new(max_mem: usize, max_entries: usize) -> Self {
        Self {
            max_mem,
            max_entries,
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                order: VecDeque::new(),
                mem: 0,
                stats: CacheStats::default(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState<V>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up a key, counting the hit or miss.
    pub fn get(&self, key: &str) -> Option<Arc<V>> {
        let mut state = self.lock();
        let found = state.entries.get(key).map(|e| Arc::clone(&e.value));
        if found.is_some() {
            state.stats.hits += 1;
        } else {
            state.stats.misses += 1;
        }
        found
    }

    /// Store `value` of `size` bytes, evicting oldest entries as needed.
    pub fn insert(&self, key: String, value: Arc<V>, size: usize) {
        if size > self.max_mem || self.max_entries == 0 {
            debug!(size, max_mem = self.max_mem, "decoded image too large to cache");
            return;
        }

        let mut state = self.lock();
        if let Some(old) = state.entries.remove(&key) {
            state.mem -= old.size;
            state.order.retain(|k| *k != key);
        }

        while state.mem + size > self.max_mem || state.entries.len() >= self.max_entries {
            let Some(oldest) = state.order.pop_front() else {
                break;
            };
            if let Some(evicted) = state.entries.remove(&oldest) {
                state.mem -= evicted.size;
                state.stats.evictions += 1;
                trace!(key = %oldest, size = evicted.size, "evicted decoded image");
            }
        }

        state.mem += size;
        state.order.push_back(key.clone());
        state.entries.insert(key, Entry { value, size });
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes currently held.
    pub fn memory(&self) -> usize {
        self.lock().mem
    }

    pub fn stats(&self) -> CacheStats {
        self.lock().stats
    }

    /// Drop every entry. Statistics are kept.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.order.clear();
        state.mem = 0;
    }
}
