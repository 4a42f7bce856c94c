//! Process-local cache tier
//!
//! A bounded sharded map with per-entry TTL and LRU eviction by last access.
//! Serves as the fast path ahead of the shared tier and as the only tier
//! when the shared store is unreachable.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use docqa_config::constants::cache::LOCAL_SHARDS;

struct Entry<V> {
    value: V,
    expires_at: Instant,
    last_access: u64,
}

struct Shard<V> {
    map: HashMap<String, Entry<V>>,
    capacity: usize,
}

impl<V: Clone> Shard<V> {
    fn get(&mut self, key: &str, now: Instant, tick: u64) -> Option<V> {
        match self.map.get_mut(key) {
            Some(entry) if entry.expires_at > now => {
                entry.last_access = tick;
                Some(entry.value.clone())
            }
            Some(_) => {
                self.map.remove(key);
                None
            }
            None => None,
        }
    }

    fn put(&mut self, key: String, value: V, expires_at: Instant, tick: u64) {
        self.map.insert(
            key,
            Entry {
                value,
                expires_at,
                last_access: tick,
            },
        );
        if self.map.len() > self.capacity {
            self.evict_lru();
        }
    }

    fn evict_lru(&mut self) {
        // Capacity per shard is small (cap / 16); a scan is cheaper than
        // maintaining an ordered structure under the shard lock.
        if let Some(victim) = self
            .map
            .iter()
            .min_by_key(|(_, e)| e.last_access)
            .map(|(k, _)| k.clone())
        {
            self.map.remove(&victim);
        }
    }
}

/// Sharded LRU cache with per-entry TTL.
pub struct LocalCache<V> {
    shards: Vec<Mutex<Shard<V>>>,
    /// Logical clock ordering accesses across shards
    tick: AtomicU64,
}

impl<V: Clone> LocalCache<V> {
    /// Create a cache holding at most `capacity` entries across
    /// [`LOCAL_SHARDS`] shards.
    pub fn new(capacity: usize) -> Self {
        let per_shard = capacity.div_ceil(LOCAL_SHARDS).max(1);
        let shards = (0..LOCAL_SHARDS)
            .map(|_| {
                Mutex::new(Shard {
                    map: HashMap::new(),
                    capacity: per_shard,
                })
            })
            .collect();
        Self {
            shards,
            tick: AtomicU64::new(0),
        }
    }

    fn shard(&self, key: &str) -> &Mutex<Shard<V>> {
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in key.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        &self.shards[(hash as usize) % self.shards.len()]
    }

    /// Get a live entry, refreshing its LRU position. Expired entries are
    /// dropped on the way out.
    pub fn get(&self, key: &str) -> Option<V> {
        let tick = self.tick.fetch_add(1, Ordering::Relaxed);
        self.shard(key).lock().get(key, Instant::now(), tick)
    }

    /// Insert an entry with the given TTL. A zero TTL makes the entry
    /// immediately invisible.
    pub fn put(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let tick = self.tick.fetch_add(1, Ordering::Relaxed);
        let expires_at = Instant::now() + ttl;
        self.shard_put(key.into(), value, expires_at, tick);
    }

    fn shard_put(&self, key: String, value: V, expires_at: Instant, tick: u64) {
        self.shard(&key).lock().put(key, value, expires_at, tick);
    }

    /// Drop every entry.
    pub fn clear(&self) {
        for shard in &self.shards {
            shard.lock().map.clear();
        }
    }

    /// Live entry count (expired entries still waiting for sweep included).
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.lock().map.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    #[test]
    fn test_put_then_get() {
        let cache: LocalCache<String> = LocalCache::new(16);
        cache.put("k", "v".to_string(), TTL);
        assert_eq!(cache.get("k"), Some("v".to_string()));
    }

    #[test]
    fn test_zero_ttl_absent_immediately() {
        let cache: LocalCache<String> = LocalCache::new(16);
        cache.put("k", "v".to_string(), Duration::ZERO);
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn test_overwrite_replaces_value() {
        let cache: LocalCache<u32> = LocalCache::new(16);
        cache.put("k", 1, TTL);
        cache.put("k", 2, TTL);
        assert_eq!(cache.get("k"), Some(2));
    }

    #[test]
    fn test_eviction_keeps_most_recent_entry() {
        // Per-shard capacity of 1: every insert into an occupied shard
        // evicts its older entry, so the newest key always survives.
        let cache: LocalCache<u32> = LocalCache::new(1);
        let mut last = String::new();
        for i in 0..100 {
            last = format!("key-{}", i);
            cache.put(last.clone(), i, TTL);
        }
        assert_eq!(cache.get(&last), Some(99));
        assert!(cache.len() <= LOCAL_SHARDS);
    }

    #[test]
    fn test_capacity_bounds_total_size() {
        let cache: LocalCache<u32> = LocalCache::new(64);
        for i in 0..1000 {
            cache.put(format!("key-{}", i), i, TTL);
        }
        // Per-shard caps bound the total to capacity + shard rounding
        assert!(cache.len() <= 64 + LOCAL_SHARDS);
    }
}
