//! Bounded LRU cache with per-entry absolute expiry (spec.md §4.2).
//!
//! Used on the hot path for API-key and model-metadata cache-aside lookups.
//! The whole structure lives behind one [`std::sync::Mutex`] — contention is
//! bounded by cache size, not request volume, and every operation here is a
//! handful of hash-map touches plus pointer fixups, so the critical section
//! is short (the teacher's `ArcSwap`-guarded snapshots don't fit here because
//! `Get` itself must mutate recency order).

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

struct Node<K, V> {
    value: V,
    expires_at: Instant,
    prev: Option<K>,
    next: Option<K>,
}

struct Inner<K, V> {
    map: HashMap<K, Node<K, V>>,
    head: Option<K>, // most-recently-used
    tail: Option<K>, // least-recently-used
    capacity: usize,
}

impl<K: Clone + Eq + Hash, V> Inner<K, V> {
    fn new(capacity: usize) -> Self {
        Self {
            map: HashMap::new(),
            head: None,
            tail: None,
            capacity,
        }
    }

    fn detach(&mut self, key: &K) {
        let (prev, next) = match self.map.get(key) {
            Some(node) => (node.prev.clone(), node.next.clone()),
            None => return,
        };
        match &prev {
            Some(p) => self.map.get_mut(p).unwrap().next = next.clone(),
            None => self.head = next.clone(),
        }
        match &next {
            Some(n) => self.map.get_mut(n).unwrap().prev = prev.clone(),
            None => self.tail = prev.clone(),
        }
    }

    fn push_front(&mut self, key: K) {
        let old_head = self.head.clone();
        if let Some(node) = self.map.get_mut(&key) {
            node.prev = None;
            node.next = old_head.clone();
        }
        if let Some(old_head) = &old_head {
            self.map.get_mut(old_head).unwrap().prev = Some(key.clone());
        }
        self.head = Some(key.clone());
        if self.tail.is_none() {
            self.tail = Some(key);
        }
    }

    fn touch(&mut self, key: &K) {
        if self.head.as_ref() == Some(key) {
            return;
        }
        self.detach(key);
        self.push_front(key.clone());
    }

    fn evict_lru(&mut self) -> Option<K> {
        let lru = self.tail.clone()?;
        self.detach(&lru);
        self.map.remove(&lru);
        Some(lru)
    }
}

/// Hit/miss/eviction counters (spec.md §4.2: "Hit rate is a health signal").
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl CacheStats {
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    pub fn expirations(&self) -> u64 {
        self.expirations.load(Ordering::Relaxed)
    }

    /// Ratio in `[0, 1]`; `1.0` when there have been no lookups at all.
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits() as f64;
        let total = hits + self.misses() as f64;
        if total == 0.0 { 1.0 } else { hits / total }
    }
}

/// A bounded mapping with insertion/access-order LRU eviction and absolute
/// per-entry expiry, matching spec.md §4.2's contract exactly.
pub struct LruTtlCache<K, V> {
    inner: Mutex<Inner<K, V>>,
    ttl: Duration,
    stats: CacheStats,
}

impl<K: Clone + Eq + Hash, V: Clone> LruTtlCache<K, V> {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner::new(capacity.max(1))),
            ttl,
            stats: CacheStats::default(),
        }
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `Some(value)` if present and not expired; expired entries are
    /// removed as a side effect (spec.md §4.2: "removes the expired entry").
    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let mut inner = self.inner.lock().unwrap();

        let expired = match inner.map.get(key) {
            Some(node) => node.expires_at <= now,
            None => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        if expired {
            inner.detach(key);
            inner.map.remove(key);
            self.stats.expirations.fetch_add(1, Ordering::Relaxed);
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        inner.touch(key);
        self.stats.hits.fetch_add(1, Ordering::Relaxed);
        inner.map.get(key).map(|node| node.value.clone())
    }

    /// Upserts `key`, evicting the least-recently-used entry if the cache is
    /// now over capacity (spec.md §4.2).
    pub fn set(&self, key: K, value: V) {
        let expires_at = Instant::now() + self.ttl;
        let mut inner = self.inner.lock().unwrap();

        let is_new = !inner.map.contains_key(&key);
        inner.map.insert(
            key.clone(),
            Node {
                value,
                expires_at,
                prev: None,
                next: None,
            },
        );
        inner.touch(&key);

        if is_new && inner.map.len() > inner.capacity {
            if let Some(evicted) = inner.evict_lru() {
                debug_assert_ne!(evicted, key, "just-inserted entry should never be its own LRU");
                self.stats.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Explicit invalidation, called on any admin mutation of the underlying
    /// record (spec.md §4.2, §4.5 "any admin mutation MUST invalidate
    /// affected cache entries").
    pub fn delete(&self, key: &K) {
        let mut inner = self.inner.lock().unwrap();
        inner.detach(key);
        inner.map.remove(key);
    }

    /// Removes every currently-expired entry. Intended to be driven by a
    /// background sweeper on an interval (spec.md §4.2: "Periodic background
    /// sweep removes expired entries").
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.lock().unwrap();
        let expired: Vec<K> = inner
            .map
            .iter()
            .filter(|(_, node)| node.expires_at <= now)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            inner.detach(key);
            inner.map.remove(key);
        }
        self.stats
            .expirations
            .fetch_add(expired.len() as u64, Ordering::Relaxed);
        expired.len()
    }
}

/// Background task that periodically calls [`LruTtlCache::sweep_expired`].
/// Holds a `tokio::task::JoinHandle` obtained from [`spawn_sweeper`]; dropping
/// that handle does not stop the task — call `.abort()` on shutdown.
pub fn spawn_sweeper<K, V>(
    cache: std::sync::Arc<LruTtlCache<K, V>>,
    interval: Duration,
) -> tokio::task::JoinHandle<()>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let removed = cache.sweep_expired();
            if removed > 0 {
                tracing::debug!(event = "cache_sweep", removed, "expired cache entries removed");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_least_recently_used_when_over_capacity() {
        let cache: LruTtlCache<&str, i32> = LruTtlCache::new(2, Duration::from_secs(60));
        cache.set("a", 1);
        cache.set("b", 2);
        assert_eq!(cache.get("a"), Some(1)); // touch "a", "b" becomes LRU
        cache.set("c", 3);
        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.get("c"), Some(3));
        assert_eq!(cache.stats().evictions(), 1);
    }

    #[test]
    fn expired_entries_are_removed_on_get() {
        let cache: LruTtlCache<&str, i32> = LruTtlCache::new(10, Duration::from_millis(1));
        cache.set("a", 1);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.stats().expirations(), 1);
    }

    #[test]
    fn delete_invalidates_explicitly() {
        let cache: LruTtlCache<&str, i32> = LruTtlCache::new(10, Duration::from_secs(60));
        cache.set("a", 1);
        cache.delete(&"a");
        assert_eq!(cache.get("a"), None);
    }

    #[test]
    fn hit_rate_reflects_hits_and_misses() {
        let cache: LruTtlCache<&str, i32> = LruTtlCache::new(10, Duration::from_secs(60));
        cache.set("a", 1);
        cache.get("a");
        cache.get("missing");
        assert!((cache.stats().hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn sweep_removes_only_expired_entries() {
        let cache: LruTtlCache<&str, i32> = LruTtlCache::new(10, Duration::from_millis(5));
        cache.set("a", 1);
        std::thread::sleep(Duration::from_millis(20));
        cache.set("b", 2);
        let removed = cache.sweep_expired();
        assert_eq!(removed, 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("b"), Some(2));
    }
}
